//! Top-level synthesis driver tying the stages together.

use log::{debug, info, warn};

use crate::context::{Endpoint, RendererContext};
use crate::enforcer::PolicyEnforcer;
use crate::port_security::PortSecurity;
use crate::writer::FlowWriter;

/// Outcome of synthesizing one endpoint, reported to the caller for
/// observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointSyncState {
    /// The endpoint has no resolved switch attachment yet; nothing was
    /// written.
    NotLocated,
    /// Port-security flows were written but the endpoint takes part in no
    /// policy pair on its switch.
    PortSecuritySynthesized,
    /// Port-security and policy-enforcement flows were written.
    PolicyEnforcementSynthesized,
}

/// Drives per-switch and per-endpoint flow synthesis over a snapshot.
///
/// Stateless apart from its stage configuration; all inputs come from the
/// [`RendererContext`] and all outputs go to the [`FlowWriter`], so one
/// renderer can serve any number of synthesis passes.
#[derive(Debug, Clone, Default)]
pub struct PolicyRenderer {
    port_security: PortSecurity,
    enforcer: PolicyEnforcer,
}

impl PolicyRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synthesizes the switch-scoped flows for one node: baseline drops,
    /// tunnel allows and external-port handling.
    pub fn sync_node(
        &self,
        ctx: &RendererContext,
        node: &gbp_types::NodeId,
        writer: &mut FlowWriter,
    ) {
        self.port_security.sync_node(ctx, node, writer);
    }

    /// Synthesizes everything one endpoint contributes: its port-security
    /// allows plus policy-enforcement flows against every peer co-located
    /// on its switch, in both directions.
    pub fn sync_endpoint(
        &self,
        ctx: &RendererContext,
        endpoint: &Endpoint,
        writer: &mut FlowWriter,
    ) -> EndpointSyncState {
        let Some(location) = &endpoint.location else {
            warn!("endpoint {}: not located, skipping synthesis", endpoint.mac);
            return EndpointSyncState::NotLocated;
        };
        let node = location.node.clone();

        self.port_security.sync_endpoint(ctx, endpoint, writer);

        let mut paired = false;
        for peer in ctx.endpoints_on(&node) {
            if peer.mac == endpoint.mac {
                continue;
            }
            self.enforcer.sync_pair(ctx, endpoint, peer, writer);
            self.enforcer.sync_pair(ctx, peer, endpoint, writer);
            paired = true;
        }
        if !paired {
            debug!("endpoint {}: no co-located peers on {}", endpoint.mac, node);
            return EndpointSyncState::PortSecuritySynthesized;
        }
        EndpointSyncState::PolicyEnforcementSynthesized
    }

    /// Full pass over the snapshot: every known node, then every endpoint.
    ///
    /// With deterministic flow ids and the accumulator's replace-on-id
    /// semantics, running this twice over the same snapshot leaves the
    /// accumulated flow set unchanged.
    pub fn sync_all(&self, ctx: &RendererContext, writer: &mut FlowWriter) {
        for node in ctx.nodes() {
            self.sync_node(ctx, node, writer);
        }
        for endpoint in ctx.endpoints() {
            self.sync_endpoint(ctx, endpoint, writer);
        }
        info!("synthesis pass complete, {} flows", writer.total_flow_count());
    }
}
