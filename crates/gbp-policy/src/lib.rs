//! Group-based policy model and resolution.
//!
//! A tenant declares endpoint groups, contracts (subjects/rules/clauses),
//! classifier and action instances, and a hierarchy of forwarding domains.
//! This crate turns such a declarative snapshot into the concrete artifacts
//! the renderer consumes:
//!
//! - [`TenantIndex`]: O(1) lookups over a tenant snapshot plus hierarchical
//!   forwarding-domain resolution with cycle protection
//! - [`ConditionSet`] / [`ConditionGroup`] / [`EndpointConstraint`]: the
//!   condition-matching model used to select among contract clauses
//! - [`Policy`] / [`ResolvedPolicy`]: the immutable constraint-indexed rule
//!   table produced by [`PolicyResolver`]
//!
//! Resolution misses (dangling references, malformed topology) degrade to
//! `None`/empty results; only malformed classifier or action parameters are
//! surfaced as [`PolicyValidationError`], since they indicate an
//! unsatisfiable contract rather than a transient state.

mod classifier;
mod condition;
mod index;
mod policy;
mod resolver;
mod tenant;

pub use classifier::{
    ActionInstance, ActionKind, ClassifierInstance, ClassifierKind, ClassifierSpec, Direction,
    PortMatch, params,
};
pub use condition::{ConditionGroup, ConditionSet, EndpointConstraint, PrefixConstraint};
pub use index::TenantIndex;
pub use policy::{Policy, ResolvedPolicy, ResolvedRule, RuleClassifier, RuleGroup};
pub use resolver::PolicyResolver;
pub use tenant::{
    ClassifierRef, Clause, ConditionMatcher, Contract, DomainKind, EndpointGroup,
    ForwardingDomain, IntraGroupPolicy, MatchType, Rule, Subject, Tenant,
};

/// Error raised while resolving tenant policy into the rule table.
///
/// Everything here is a policy-authoring mistake: the contract referencing
/// the offending object cannot be satisfied, so resolution fails loudly
/// instead of silently dropping rules.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyValidationError {
    #[error("classifier {classifier}: missing required parameter {param}")]
    MissingParameter {
        classifier: gbp_types::ClassifierName,
        param: &'static str,
    },

    #[error("classifier {classifier}: parameters {first} and {second} are mutually exclusive")]
    ConflictingParameters {
        classifier: gbp_types::ClassifierName,
        first: &'static str,
        second: &'static str,
    },

    #[error("classifier {classifier}: invalid port range {low}-{high}")]
    InvalidPortRange {
        classifier: gbp_types::ClassifierName,
        low: i64,
        high: i64,
    },

    #[error("classifier {classifier}: parameter {param} value {value} is out of range")]
    ParameterOutOfRange {
        classifier: gbp_types::ClassifierName,
        param: &'static str,
        value: i64,
    },

    #[error("classifier {classifier}: unsupported ether type {value:#06x}")]
    UnsupportedEtherType {
        classifier: gbp_types::ClassifierName,
        value: u16,
    },
}
