//! Deterministic register ordinals for endpoint groups and condition
//! groups.
//!
//! Register-encoded identifiers stand in for the full endpoint identity in
//! policy-enforcer matches. Ordinals are derived from the snapshot by
//! sorted iteration, never from call order, so re-synthesis against an
//! unchanged snapshot produces identical register values.

use gbp_policy::{ConditionGroup, TenantIndex};
use gbp_types::EndpointGroupId;
use std::collections::BTreeMap;

use crate::context::Endpoint;

/// Ordinal table built once per published snapshot.
#[derive(Debug, Clone, Default)]
pub struct PolicyOrdinals {
    groups: BTreeMap<EndpointGroupId, u32>,
    condition_groups: BTreeMap<ConditionGroup, u32>,
}

impl PolicyOrdinals {
    /// Assigns ordinals for every declared endpoint group and for every
    /// condition group observable on the given endpoints.
    ///
    /// Group ordinals start at 1; 0 is reserved as "no identity". The
    /// empty condition group is always present, so endpoints without
    /// conditions encode consistently.
    pub fn build(index: &TenantIndex, endpoints: &[Endpoint]) -> Self {
        let mut groups = BTreeMap::new();
        let mut declared: Vec<&EndpointGroupId> =
            index.tenant().endpoint_groups.iter().map(|g| &g.id).collect();
        declared.sort();
        for (i, id) in declared.into_iter().enumerate() {
            groups.insert(id.clone(), i as u32 + 1);
        }

        let mut observed: Vec<ConditionGroup> = endpoints
            .iter()
            .map(|ep| ep.condition_group())
            .chain(std::iter::once(ConditionGroup::empty()))
            .collect();
        observed.sort();
        observed.dedup();
        let condition_groups = observed
            .into_iter()
            .enumerate()
            .map(|(i, cg)| (cg, i as u32))
            .collect();

        Self {
            groups,
            condition_groups,
        }
    }

    /// Returns the ordinal for an endpoint group, `None` when the group is
    /// not declared by the tenant.
    pub fn group_ordinal(&self, id: &EndpointGroupId) -> Option<u32> {
        self.groups.get(id).copied()
    }

    /// Returns the ordinal for a condition group, `None` when the group was
    /// not observable when the snapshot was built.
    pub fn condition_group_ordinal(&self, group: &ConditionGroup) -> Option<u32> {
        self.condition_groups.get(group).copied()
    }
}
