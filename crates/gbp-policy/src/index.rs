//! Per-tenant lookup index and hierarchical forwarding-domain resolution.

use gbp_types::{ActionName, ClassifierName, ContractId, EndpointGroupId, NetworkDomainId};
use log::debug;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::classifier::{ActionInstance, ClassifierInstance};
use crate::tenant::{Contract, DomainKind, EndpointGroup, ForwardingDomain, Tenant};

/// Read-only index over one tenant snapshot.
///
/// Built once per tenant update, never mutated afterwards; all getters are
/// O(1) map lookups returning `None` for absent ids. Equality and hashing
/// are derived from the wrapped snapshot's identity (tenant id plus
/// snapshot version), so the index can serve as a cache key.
#[derive(Debug, Clone)]
pub struct TenantIndex {
    tenant: Arc<Tenant>,
    groups: HashMap<EndpointGroupId, usize>,
    contracts: HashMap<ContractId, usize>,
    classifiers: HashMap<ClassifierName, usize>,
    actions: HashMap<ActionName, usize>,
    domains: HashMap<NetworkDomainId, usize>,
    /// Reverse map: parent domain id -> child subnet ids.
    subnets_by_parent: HashMap<NetworkDomainId, BTreeSet<NetworkDomainId>>,
}

impl TenantIndex {
    /// Builds the index from a tenant snapshot.
    ///
    /// Duplicate ids keep the first declaration; later duplicates are
    /// ignored with a debug log, matching the snapshot-wins model.
    pub fn new(tenant: Arc<Tenant>) -> Self {
        let mut groups = HashMap::new();
        for (i, g) in tenant.endpoint_groups.iter().enumerate() {
            if groups.insert(g.id.clone(), i).is_some() {
                debug!("tenant {}: duplicate endpoint group {}", tenant.id, g.id);
            }
        }
        let mut contracts = HashMap::new();
        for (i, c) in tenant.contracts.iter().enumerate() {
            contracts.entry(c.id.clone()).or_insert(i);
        }
        let mut classifiers = HashMap::new();
        for (i, c) in tenant.classifiers.iter().enumerate() {
            classifiers.entry(c.name.clone()).or_insert(i);
        }
        let mut actions = HashMap::new();
        for (i, a) in tenant.actions.iter().enumerate() {
            actions.entry(a.name.clone()).or_insert(i);
        }
        let mut domains = HashMap::new();
        let mut subnets_by_parent: HashMap<NetworkDomainId, BTreeSet<NetworkDomainId>> =
            HashMap::new();
        for (i, d) in tenant.forwarding_domains.iter().enumerate() {
            domains.entry(d.id().clone()).or_insert(i);
            if d.kind() == DomainKind::Subnet {
                if let Some(parent) = d.parent() {
                    subnets_by_parent
                        .entry(parent.clone())
                        .or_default()
                        .insert(d.id().clone());
                }
            }
        }
        Self {
            tenant,
            groups,
            contracts,
            classifiers,
            actions,
            domains,
            subnets_by_parent,
        }
    }

    /// Returns the wrapped tenant snapshot.
    pub fn tenant(&self) -> &Tenant {
        &self.tenant
    }

    /// Looks up an endpoint group by id.
    pub fn endpoint_group(&self, id: &EndpointGroupId) -> Option<&EndpointGroup> {
        self.groups.get(id).map(|&i| &self.tenant.endpoint_groups[i])
    }

    /// Looks up a contract by id.
    pub fn contract(&self, id: &ContractId) -> Option<&Contract> {
        self.contracts.get(id).map(|&i| &self.tenant.contracts[i])
    }

    /// Looks up a classifier instance by name.
    pub fn classifier(&self, name: &ClassifierName) -> Option<&ClassifierInstance> {
        self.classifiers.get(name).map(|&i| &self.tenant.classifiers[i])
    }

    /// Looks up an action instance by name.
    pub fn action(&self, name: &ActionName) -> Option<&ActionInstance> {
        self.actions.get(name).map(|&i| &self.tenant.actions[i])
    }

    /// Looks up a forwarding domain by id.
    pub fn forwarding_domain(&self, id: &NetworkDomainId) -> Option<&ForwardingDomain> {
        self.domains.get(id).map(|&i| &self.tenant.forwarding_domains[i])
    }

    /// Returns true if the group is one of the tenant's external implicit
    /// groups.
    pub fn is_external_group(&self, id: &EndpointGroupId) -> bool {
        self.tenant.external_implicit_groups.contains(id)
    }

    /// Resolves the L3 context above `domain_id`.
    pub fn resolve_l3_context(&self, domain_id: &NetworkDomainId) -> Option<&ForwardingDomain> {
        self.resolve_domain_of_kind(domain_id, DomainKind::L3Context)
    }

    /// Resolves the L2 bridge domain above (or at) `domain_id`.
    pub fn resolve_l2_bridge_domain(
        &self,
        domain_id: &NetworkDomainId,
    ) -> Option<&ForwardingDomain> {
        self.resolve_domain_of_kind(domain_id, DomainKind::L2BridgeDomain)
    }

    /// Resolves the L2 flood domain above (or at) `domain_id`.
    pub fn resolve_l2_flood_domain(
        &self,
        domain_id: &NetworkDomainId,
    ) -> Option<&ForwardingDomain> {
        self.resolve_domain_of_kind(domain_id, DomainKind::L2FloodDomain)
    }

    /// Walks the parent chain from `domain_id` until a domain of `kind` is
    /// found.
    ///
    /// Tenant-authored hierarchies may be malformed; a dangling parent or a
    /// cycle terminates the walk and resolves to `None` rather than an
    /// error. The visited set caps the walk at the domain count.
    fn resolve_domain_of_kind(
        &self,
        domain_id: &NetworkDomainId,
        kind: DomainKind,
    ) -> Option<&ForwardingDomain> {
        let mut visited: HashSet<&NetworkDomainId> = HashSet::new();
        let mut current = domain_id;
        loop {
            if !visited.insert(current) {
                debug!(
                    "tenant {}: domain cycle at {} while resolving {:?}",
                    self.tenant.id, current, kind
                );
                return None;
            }
            let domain = self.forwarding_domain(current)?;
            if domain.kind() == kind {
                return Some(domain);
            }
            current = domain.parent()?;
        }
    }

    /// Collects every subnet on the path from `domain_id` up to the network
    /// root, plus all subnets that name any visited domain as their parent.
    ///
    /// Same cycle guard as the kind resolvers; a malformed hierarchy yields
    /// whatever was accumulated before the walk stopped.
    pub fn resolve_subnets(&self, domain_id: &NetworkDomainId) -> BTreeSet<NetworkDomainId> {
        let mut result = BTreeSet::new();
        let mut visited: HashSet<&NetworkDomainId> = HashSet::new();
        let mut current = Some(domain_id);
        while let Some(id) = current {
            if !visited.insert(id) {
                debug!(
                    "tenant {}: domain cycle at {} while collecting subnets",
                    self.tenant.id, id
                );
                break;
            }
            if let Some(children) = self.subnets_by_parent.get(id) {
                result.extend(children.iter().cloned());
            }
            let Some(domain) = self.forwarding_domain(id) else {
                break;
            };
            if domain.kind() == DomainKind::Subnet {
                result.insert(domain.id().clone());
            }
            current = domain.parent();
        }
        result
    }
}

impl PartialEq for TenantIndex {
    fn eq(&self, other: &Self) -> bool {
        self.tenant.id == other.tenant.id && self.tenant.version == other.tenant.version
    }
}

impl Eq for TenantIndex {}

impl Hash for TenantIndex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.tenant.id.hash(state);
        self.tenant.version.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gbp_types::IpPrefix;

    fn domain_id(s: &str) -> NetworkDomainId {
        NetworkDomainId::new(s)
    }

    fn subnet(id: &str, parent: &str, prefix: &str) -> ForwardingDomain {
        ForwardingDomain::Subnet {
            id: domain_id(id),
            parent: Some(domain_id(parent)),
            prefix: prefix.parse::<IpPrefix>().unwrap(),
            virtual_router_ip: None,
        }
    }

    /// S1 -> F1 -> B1 -> L1, the canonical four-level hierarchy.
    fn layered_tenant() -> Arc<Tenant> {
        let mut tenant = Tenant::new("t1", 1);
        tenant.forwarding_domains = vec![
            subnet("s1", "f1", "10.0.1.0/24"),
            ForwardingDomain::L2FloodDomain {
                id: domain_id("f1"),
                parent: Some(domain_id("b1")),
                segmentation: None,
            },
            ForwardingDomain::L2BridgeDomain {
                id: domain_id("b1"),
                parent: Some(domain_id("l1")),
            },
            ForwardingDomain::L3Context { id: domain_id("l1") },
        ];
        Arc::new(tenant)
    }

    #[test]
    fn test_resolve_l3_context_from_subnet() {
        let index = TenantIndex::new(layered_tenant());
        let l3 = index.resolve_l3_context(&domain_id("s1")).unwrap();
        assert_eq!(l3.id().as_str(), "l1");
        assert_eq!(l3.kind(), DomainKind::L3Context);
    }

    #[test]
    fn test_resolve_intermediate_kinds() {
        let index = TenantIndex::new(layered_tenant());
        let fd = index.resolve_l2_flood_domain(&domain_id("s1")).unwrap();
        assert_eq!(fd.id().as_str(), "f1");
        let bd = index.resolve_l2_bridge_domain(&domain_id("s1")).unwrap();
        assert_eq!(bd.id().as_str(), "b1");
        // Resolution starting at the requested kind returns it directly.
        let bd = index.resolve_l2_bridge_domain(&domain_id("b1")).unwrap();
        assert_eq!(bd.id().as_str(), "b1");
    }

    #[test]
    fn test_resolve_subnets_from_flood_domain() {
        let index = TenantIndex::new(layered_tenant());
        let subnets = index.resolve_subnets(&domain_id("f1"));
        assert_eq!(subnets.len(), 1);
        assert!(subnets.contains(&domain_id("s1")));
    }

    #[test]
    fn test_resolve_subnets_from_subnet_includes_self() {
        let index = TenantIndex::new(layered_tenant());
        let subnets = index.resolve_subnets(&domain_id("s1"));
        assert!(subnets.contains(&domain_id("s1")));
    }

    #[test]
    fn test_dangling_parent_resolves_to_none() {
        let mut tenant = Tenant::new("t1", 1);
        tenant.forwarding_domains = vec![subnet("s1", "missing", "10.0.1.0/24")];
        let index = TenantIndex::new(Arc::new(tenant));
        assert!(index.resolve_l3_context(&domain_id("s1")).is_none());
        // The subnet itself is still accumulated before the dead end.
        assert!(index.resolve_subnets(&domain_id("s1")).contains(&domain_id("s1")));
    }

    #[test]
    fn test_cycle_terminates_and_resolves_to_none() {
        let mut tenant = Tenant::new("t1", 1);
        tenant.forwarding_domains = vec![
            ForwardingDomain::L2FloodDomain {
                id: domain_id("f1"),
                parent: Some(domain_id("b1")),
                segmentation: None,
            },
            ForwardingDomain::L2BridgeDomain {
                id: domain_id("b1"),
                parent: Some(domain_id("f1")),
            },
        ];
        let index = TenantIndex::new(Arc::new(tenant));
        assert!(index.resolve_l3_context(&domain_id("f1")).is_none());
        assert!(index.resolve_subnets(&domain_id("f1")).is_empty());
        // A kind present on the cycle is still found before the guard trips.
        assert!(index.resolve_l2_bridge_domain(&domain_id("f1")).is_some());
    }

    #[test]
    fn test_self_parent_cycle() {
        let mut tenant = Tenant::new("t1", 1);
        tenant.forwarding_domains = vec![ForwardingDomain::L2BridgeDomain {
            id: domain_id("b1"),
            parent: Some(domain_id("b1")),
        }];
        let index = TenantIndex::new(Arc::new(tenant));
        assert!(index.resolve_l3_context(&domain_id("b1")).is_none());
    }

    #[test]
    fn test_unknown_domain_lookups_return_none() {
        let index = TenantIndex::new(layered_tenant());
        assert!(index.forwarding_domain(&domain_id("nope")).is_none());
        assert!(index.resolve_l3_context(&domain_id("nope")).is_none());
        assert!(index.resolve_subnets(&domain_id("nope")).is_empty());
        assert!(index.endpoint_group(&EndpointGroupId::new("nope")).is_none());
        assert!(index.contract(&ContractId::new("nope")).is_none());
    }

    #[test]
    fn test_index_identity_from_snapshot() {
        let a = TenantIndex::new(layered_tenant());
        let b = TenantIndex::new(layered_tenant());
        assert_eq!(a, b);
        let mut newer = Tenant::new("t1", 2);
        newer.forwarding_domains.clear();
        let c = TenantIndex::new(Arc::new(newer));
        assert_ne!(a, c);
    }
}
