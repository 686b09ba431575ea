//! The immutable constraint-indexed rule table.

use gbp_types::{ContractId, EndpointGroupId, RuleName, SubjectName, TenantId};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::classifier::{ActionKind, ClassifierSpec, Direction};
use crate::condition::{ConditionGroup, EndpointConstraint};

/// A classifier attached to a resolved rule, with its direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleClassifier {
    pub direction: Direction,
    pub spec: ClassifierSpec,
}

/// A rule with all classifier/action references resolved and validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRule {
    pub name: RuleName,
    pub order: Option<u32>,
    pub classifiers: Vec<RuleClassifier>,
    pub actions: Vec<ActionKind>,
}

impl ResolvedRule {
    /// Returns true if any resolved action denies the traffic; a deny rule
    /// emits no flow and relies on table miss.
    pub fn denies(&self) -> bool {
        self.actions.contains(&ActionKind::Deny)
    }
}

/// An ordered rule list bound to its originating tenant/contract/subject.
///
/// The natural order (subject declaration order, then contract id, then
/// subject name) is the tie-break callers rely on for stable priorities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleGroup {
    pub tenant: TenantId,
    pub contract: ContractId,
    pub subject: SubjectName,
    pub order: Option<u32>,
    pub rules: Vec<ResolvedRule>,
}

impl RuleGroup {
    fn sort_key(&self) -> (u32, &ContractId, &SubjectName) {
        // Absent order sorts after every explicit order.
        (self.order.unwrap_or(u32::MAX), &self.contract, &self.subject)
    }
}

impl PartialOrd for RuleGroup {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RuleGroup {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Immutable two-key rule table for one (consumer, provider) group pair.
///
/// Row and column keys are [`EndpointConstraint`]s; a cell holds the rule
/// groups contributed by every clause that produced that constraint pair.
/// Built once per tenant-policy recomputation, read-only afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    cells: BTreeMap<(EndpointConstraint, EndpointConstraint), Vec<RuleGroup>>,
}

static EMPTY_POLICY: Lazy<Policy> = Lazy::new(Policy::default);

impl Policy {
    /// The distinguished policy with no cells, shared to avoid allocation.
    pub fn empty() -> &'static Policy {
        &EMPTY_POLICY
    }

    /// Returns true if the table has no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Returns the number of cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Appends rule groups to the cell for a constraint pair.
    pub(crate) fn append(
        &mut self,
        from: EndpointConstraint,
        to: EndpointConstraint,
        groups: impl IntoIterator<Item = RuleGroup>,
    ) {
        self.cells.entry((from, to)).or_default().extend(groups);
    }

    /// Returns the ordered rule list applicable to a pair of condition
    /// groups.
    ///
    /// Every cell whose row key is satisfied by `from` and whose column
    /// key is satisfied by `to` contributes its rule groups; the merged
    /// list is sorted by the rule groups' natural order, so the result is
    /// independent of cell iteration order.
    pub fn get_rules(&self, from: &ConditionGroup, to: &ConditionGroup) -> Vec<RuleGroup> {
        let mut result: Vec<RuleGroup> = Vec::new();
        for ((row, column), groups) in &self.cells {
            if from.contains(row.conditions()) && to.contains(column.conditions()) {
                result.extend(groups.iter().cloned());
            }
        }
        result.sort();
        result
    }
}

/// The full resolution result: one [`Policy`] per ordered (consumer,
/// provider) endpoint-group pair.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedPolicy {
    policies: BTreeMap<(EndpointGroupId, EndpointGroupId), Policy>,
}

impl ResolvedPolicy {
    /// Returns the policy between a consumer and a provider group, or the
    /// empty policy when the pair shares no contract.
    pub fn get(&self, consumer: &EndpointGroupId, provider: &EndpointGroupId) -> &Policy {
        self.policies
            .get(&(consumer.clone(), provider.clone()))
            .unwrap_or_else(|| Policy::empty())
    }

    /// Returns the group pairs that have at least one cell.
    pub fn group_pairs(&self) -> impl Iterator<Item = &(EndpointGroupId, EndpointGroupId)> {
        self.policies.keys()
    }

    pub(crate) fn insert(
        &mut self,
        consumer: EndpointGroupId,
        provider: EndpointGroupId,
        policy: Policy,
    ) {
        self.policies.insert((consumer, provider), policy);
    }
}
