//! The tenant snapshot: the declarative objects policy is resolved from.
//!
//! A tenant is replaced wholesale on every policy update and treated as an
//! immutable snapshot afterwards; the [`crate::TenantIndex`] is rebuilt from
//! it. Nothing here holds runtime state.

use gbp_types::{
    ActionName, ClassifierName, ConditionName, ContractId, EndpointGroupId, IpPrefix,
    NetworkDomainId, SubjectName, TenantId, VlanId,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

use crate::classifier::{ActionInstance, ClassifierInstance, Direction};

/// Root declarative object owned by one tenant.
///
/// `version` is a snapshot generation assigned by the publishing context;
/// together with the tenant id it identifies a snapshot for cache-key use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub version: u64,
    pub endpoint_groups: Vec<EndpointGroup>,
    pub contracts: Vec<Contract>,
    pub classifiers: Vec<ClassifierInstance>,
    pub actions: Vec<ActionInstance>,
    pub forwarding_domains: Vec<ForwardingDomain>,
    /// Groups whose members live outside the overlay; their endpoints get
    /// no per-endpoint port-security allows.
    pub external_implicit_groups: BTreeSet<EndpointGroupId>,
}

impl Tenant {
    /// Creates an empty tenant snapshot.
    pub fn new(id: impl Into<TenantId>, version: u64) -> Self {
        Self {
            id: id.into(),
            version,
            endpoint_groups: Vec::new(),
            contracts: Vec::new(),
            classifiers: Vec::new(),
            actions: Vec::new(),
            forwarding_domains: Vec::new(),
            external_implicit_groups: BTreeSet::new(),
        }
    }
}

/// Policy applied between members of the same endpoint group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntraGroupPolicy {
    /// Members may talk to each other unconditionally.
    #[default]
    Allow,
    /// Intra-group traffic is subject to contract evaluation like any
    /// other pair.
    RequireContract,
}

/// Named set of endpoints sharing policy treatment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointGroup {
    pub id: EndpointGroupId,
    pub intra_group_policy: IntraGroupPolicy,
    /// Forwarding domain the group's endpoints attach to (usually a
    /// subnet or flood domain).
    pub network_domain: Option<NetworkDomainId>,
    pub provided_contracts: BTreeSet<ContractId>,
    pub consumed_contracts: BTreeSet<ContractId>,
}

impl EndpointGroup {
    pub fn new(id: impl Into<EndpointGroupId>) -> Self {
        Self {
            id: id.into(),
            intra_group_policy: IntraGroupPolicy::default(),
            network_domain: None,
            provided_contracts: BTreeSet::new(),
            consumed_contracts: BTreeSet::new(),
        }
    }

    pub fn with_network_domain(mut self, domain: impl Into<NetworkDomainId>) -> Self {
        self.network_domain = Some(domain.into());
        self
    }

    pub fn with_intra_group_policy(mut self, policy: IntraGroupPolicy) -> Self {
        self.intra_group_policy = policy;
        self
    }

    pub fn provides(mut self, contract: impl Into<ContractId>) -> Self {
        self.provided_contracts.insert(contract.into());
        self
    }

    pub fn consumes(mut self, contract: impl Into<ContractId>) -> Self {
        self.consumed_contracts.insert(contract.into());
        self
    }
}

/// Named set of subjects and clauses governing traffic between a consumer
/// and a provider group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contract {
    pub id: ContractId,
    pub subjects: Vec<Subject>,
    pub clauses: Vec<Clause>,
}

impl Contract {
    pub fn new(id: impl Into<ContractId>) -> Self {
        Self {
            id: id.into(),
            subjects: Vec::new(),
            clauses: Vec::new(),
        }
    }

    pub fn with_subject(mut self, subject: Subject) -> Self {
        self.subjects.push(subject);
        self
    }

    pub fn with_clause(mut self, clause: Clause) -> Self {
        self.clauses.push(clause);
        self
    }
}

/// Ordered group of rules within a contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub name: SubjectName,
    /// Declaration order; lower sorts first, absent sorts last.
    pub order: Option<u32>,
    pub rules: Vec<Rule>,
}

impl Subject {
    pub fn new(name: impl Into<SubjectName>) -> Self {
        Self {
            name: name.into(),
            order: None,
            rules: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Reference from a rule to a classifier instance, with the traffic
/// direction the classifier applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierRef {
    pub name: ClassifierName,
    pub direction: Direction,
}

/// A single rule: classifier references plus action references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub name: gbp_types::RuleName,
    pub order: Option<u32>,
    pub classifier_refs: Vec<ClassifierRef>,
    pub action_refs: Vec<ActionName>,
}

impl Rule {
    pub fn new(name: impl Into<gbp_types::RuleName>) -> Self {
        Self {
            name: name.into(),
            order: None,
            classifier_refs: Vec::new(),
            action_refs: Vec::new(),
        }
    }

    pub fn with_order(mut self, order: u32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_classifier(mut self, name: impl Into<ClassifierName>, direction: Direction) -> Self {
        self.classifier_refs.push(ClassifierRef {
            name: name.into(),
            direction,
        });
        self
    }

    pub fn with_action(mut self, name: impl Into<ActionName>) -> Self {
        self.action_refs.push(name.into());
        self
    }
}

/// How a condition matcher combines its named conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    /// Every named condition must be asserted on the endpoint.
    All,
    /// At least one named condition must be asserted.
    Any,
    /// None of the named conditions may be asserted.
    None,
}

/// A named matcher over endpoint conditions, attached to a clause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConditionMatcher {
    pub name: String,
    pub match_type: MatchType,
    pub conditions: BTreeSet<ConditionName>,
}

impl ConditionMatcher {
    pub fn new(
        name: impl Into<String>,
        match_type: MatchType,
        conditions: impl IntoIterator<Item = ConditionName>,
    ) -> Self {
        Self {
            name: name.into(),
            match_type,
            conditions: conditions.into_iter().collect(),
        }
    }
}

/// Selects which subjects of a contract apply, under which endpoint
/// conditions and L3 prefixes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clause {
    pub name: String,
    /// Subjects this clause activates. Empty means every subject of the
    /// owning contract.
    pub subject_refs: Vec<SubjectName>,
    pub consumer_matchers: Vec<ConditionMatcher>,
    pub provider_matchers: Vec<ConditionMatcher>,
    pub consumer_prefixes: BTreeSet<IpPrefix>,
    pub provider_prefixes: BTreeSet<IpPrefix>,
}

impl Clause {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            subject_refs: Vec::new(),
            consumer_matchers: Vec::new(),
            provider_matchers: Vec::new(),
            consumer_prefixes: BTreeSet::new(),
            provider_prefixes: BTreeSet::new(),
        }
    }

    pub fn with_subject_ref(mut self, subject: impl Into<SubjectName>) -> Self {
        self.subject_refs.push(subject.into());
        self
    }

    pub fn with_consumer_matcher(mut self, matcher: ConditionMatcher) -> Self {
        self.consumer_matchers.push(matcher);
        self
    }

    pub fn with_provider_matcher(mut self, matcher: ConditionMatcher) -> Self {
        self.provider_matchers.push(matcher);
        self
    }
}

/// Kind tag for a forwarding domain, used by the hierarchical resolvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainKind {
    Subnet,
    L2FloodDomain,
    L2BridgeDomain,
    L3Context,
}

/// A node in the tenant's forwarding hierarchy.
///
/// Domains form a parent-linked chain (subnet -> flood domain -> bridge
/// domain -> L3 context). The chain is tenant-authored and may be malformed
/// (dangling parents, cycles); resolution must tolerate that, so the
/// runtime representation carries plain parent ids, never back-references.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ForwardingDomain {
    Subnet {
        id: NetworkDomainId,
        parent: Option<NetworkDomainId>,
        prefix: IpPrefix,
        /// Gateway address answered on behalf of the subnet.
        virtual_router_ip: Option<IpAddr>,
    },
    L2FloodDomain {
        id: NetworkDomainId,
        parent: Option<NetworkDomainId>,
        /// VLAN segmentation applied on external ports.
        segmentation: Option<VlanId>,
    },
    L2BridgeDomain {
        id: NetworkDomainId,
        parent: Option<NetworkDomainId>,
    },
    L3Context {
        id: NetworkDomainId,
    },
}

impl ForwardingDomain {
    /// Returns the domain's own id.
    pub fn id(&self) -> &NetworkDomainId {
        match self {
            Self::Subnet { id, .. }
            | Self::L2FloodDomain { id, .. }
            | Self::L2BridgeDomain { id, .. }
            | Self::L3Context { id } => id,
        }
    }

    /// Returns the parent domain id, if any. L3 contexts are roots.
    pub fn parent(&self) -> Option<&NetworkDomainId> {
        match self {
            Self::Subnet { parent, .. }
            | Self::L2FloodDomain { parent, .. }
            | Self::L2BridgeDomain { parent, .. } => parent.as_ref(),
            Self::L3Context { .. } => None,
        }
    }

    /// Returns the kind tag.
    pub fn kind(&self) -> DomainKind {
        match self {
            Self::Subnet { .. } => DomainKind::Subnet,
            Self::L2FloodDomain { .. } => DomainKind::L2FloodDomain,
            Self::L2BridgeDomain { .. } => DomainKind::L2BridgeDomain,
            Self::L3Context { .. } => DomainKind::L3Context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_accessors() {
        let subnet = ForwardingDomain::Subnet {
            id: NetworkDomainId::new("s1"),
            parent: Some(NetworkDomainId::new("fd1")),
            prefix: "10.0.1.0/24".parse().unwrap(),
            virtual_router_ip: None,
        };
        assert_eq!(subnet.id().as_str(), "s1");
        assert_eq!(subnet.parent().unwrap().as_str(), "fd1");
        assert_eq!(subnet.kind(), DomainKind::Subnet);

        let l3 = ForwardingDomain::L3Context {
            id: NetworkDomainId::new("l3"),
        };
        assert!(l3.parent().is_none());
        assert_eq!(l3.kind(), DomainKind::L3Context);
    }

    #[test]
    fn test_group_builder() {
        let epg = EndpointGroup::new("web")
            .with_network_domain("s1")
            .provides("http")
            .consumes("db");
        assert_eq!(epg.intra_group_policy, IntraGroupPolicy::Allow);
        assert!(epg.provided_contracts.contains(&ContractId::new("http")));
        assert!(epg.consumed_contracts.contains(&ContractId::new("db")));
    }

    #[test]
    fn test_tenant_snapshot_roundtrip() {
        let tenant = Tenant::new("t1", 3);
        let json = serde_json::to_string(&tenant).unwrap();
        let back: Tenant = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, tenant.id);
        assert_eq!(back.version, 3);
    }
}
