//! Flow-pipeline synthesis for group-based policy.
//!
//! Consumes a resolved policy snapshot ([`gbp_policy::ResolvedPolicy`]),
//! live endpoint/switch state and the tenant index, and emits ordered
//! match/action flows for two pipeline stages:
//!
//! - **Port security** (table 0): ingress validation of source addresses,
//!   tunnel and external ports
//! - **Policy enforcement** (table 4): contract-rule matching over
//!   register-encoded endpoint identities
//!
//! Flows carry deterministic ids derived from their match content, so
//! re-running synthesis with unchanged inputs reproduces byte-identical
//! flows and the [`FlowWriter`]'s replace-on-id semantics make the repeat
//! a no-op. All reads are against immutable, already-published snapshots;
//! the engine holds no locks and performs no I/O of its own.

mod context;
mod enforcer;
mod flow;
mod ordinal;
mod port_security;
mod renderer;
mod writer;

pub mod tables;

pub use context::{Endpoint, EndpointLocation, NodeConfig, RendererContext, TunnelKind, TunnelPort};
pub use enforcer::PolicyEnforcer;
pub use flow::{Flow, FlowBuilder, FlowId, FlowMatch, Instruction, VlanMatch};
pub use ordinal::PolicyOrdinals;
pub use port_security::PortSecurity;
pub use renderer::{EndpointSyncState, PolicyRenderer};
pub use writer::FlowWriter;
