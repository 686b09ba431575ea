//! Condition and constraint model.
//!
//! Conditions are boolean tags dynamically attached to endpoints. Contract
//! clauses carry condition matchers; at resolution time those compile into
//! a [`ConditionSet`] per side of the clause. At render time an endpoint's
//! asserted conditions form a [`ConditionGroup`], and a policy-table cell
//! applies iff the group satisfies the cell key's condition set.

use gbp_types::{ConditionName, IpPrefix};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::tenant::{ConditionMatcher, MatchType};

/// The condition requirements compiled from one side of a contract clause.
///
/// An endpoint satisfies the set when every required condition is asserted,
/// no forbidden condition is asserted, and each any-of group has at least
/// one asserted member. The empty set is satisfied by every endpoint.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ConditionSet {
    required: BTreeSet<ConditionName>,
    forbidden: BTreeSet<ConditionName>,
    any_groups: Vec<BTreeSet<ConditionName>>,
}

impl ConditionSet {
    /// The set with no requirements.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a set with explicit parts.
    pub fn new(
        required: impl IntoIterator<Item = ConditionName>,
        forbidden: impl IntoIterator<Item = ConditionName>,
        any_groups: impl IntoIterator<Item = BTreeSet<ConditionName>>,
    ) -> Self {
        Self {
            required: required.into_iter().collect(),
            forbidden: forbidden.into_iter().collect(),
            any_groups: any_groups.into_iter().collect(),
        }
    }

    /// Compiles clause matchers into a condition set.
    pub fn from_matchers<'a>(matchers: impl IntoIterator<Item = &'a ConditionMatcher>) -> Self {
        let mut set = Self::default();
        for matcher in matchers {
            match matcher.match_type {
                MatchType::All => set.required.extend(matcher.conditions.iter().cloned()),
                MatchType::None => set.forbidden.extend(matcher.conditions.iter().cloned()),
                MatchType::Any => set.any_groups.push(matcher.conditions.clone()),
            }
        }
        set
    }

    /// Returns true if the set has no requirements.
    pub fn is_empty(&self) -> bool {
        self.required.is_empty() && self.forbidden.is_empty() && self.any_groups.is_empty()
    }

    /// Returns true if no endpoint can ever satisfy this set.
    ///
    /// A condition both required and forbidden, or an any-of group fully
    /// forbidden, makes the owning clause dead.
    pub fn is_unsatisfiable(&self) -> bool {
        if self.required.intersection(&self.forbidden).next().is_some() {
            return true;
        }
        self.any_groups
            .iter()
            .any(|group| !group.is_empty() && group.is_subset(&self.forbidden))
    }

    /// Tests the set against an endpoint's asserted conditions.
    ///
    /// An empty condition list means "no conditions asserted"; the empty
    /// set matches it.
    pub fn matches(&self, conditions: &BTreeSet<ConditionName>) -> bool {
        self.required.is_subset(conditions)
            && self.forbidden.is_disjoint(conditions)
            && self
                .any_groups
                .iter()
                .all(|group| group.is_empty() || !group.is_disjoint(conditions))
    }
}

/// The set of conditions asserted on an endpoint at evaluation time.
///
/// Immutable; built from the endpoint's condition list when synthesis runs.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ConditionGroup {
    conditions: BTreeSet<ConditionName>,
}

impl ConditionGroup {
    /// The group with no asserted conditions.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a group from an endpoint's condition list. Duplicates
    /// collapse; `None` is treated as the empty list.
    pub fn from_endpoint(conditions: Option<&[ConditionName]>) -> Self {
        Self {
            conditions: conditions
                .unwrap_or_default()
                .iter()
                .cloned()
                .collect(),
        }
    }

    /// Returns the asserted conditions.
    pub fn conditions(&self) -> &BTreeSet<ConditionName> {
        &self.conditions
    }

    /// Returns true if this group satisfies `set`: every required condition
    /// present, every forbidden condition absent.
    pub fn contains(&self, set: &ConditionSet) -> bool {
        set.matches(&self.conditions)
    }
}

/// An L3 prefix constraint attached to a clause side.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PrefixConstraint {
    pub prefix: IpPrefix,
}

/// An endpoint's matching constraint: condition requirements plus L3
/// prefixes. Acts purely as a lookup key in the policy table.
#[derive(
    Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EndpointConstraint {
    conditions: ConditionSet,
    prefixes: BTreeSet<IpPrefix>,
}

impl EndpointConstraint {
    /// Creates a constraint from its two parts.
    pub fn new(conditions: ConditionSet, prefixes: impl IntoIterator<Item = IpPrefix>) -> Self {
        Self {
            conditions,
            prefixes: prefixes.into_iter().collect(),
        }
    }

    /// The unconstrained key: no conditions, no prefixes.
    pub fn any() -> Self {
        Self::default()
    }

    /// Returns the condition part.
    pub fn conditions(&self) -> &ConditionSet {
        &self.conditions
    }

    /// Returns the prefix part.
    pub fn prefixes(&self) -> &BTreeSet<IpPrefix> {
        &self.prefixes
    }

    /// Tests the condition part against an endpoint's conditions.
    /// `None` is treated as the empty list, not as an error.
    pub fn conditions_match(&self, conditions: Option<&[ConditionName]>) -> bool {
        let asserted: BTreeSet<ConditionName> =
            conditions.unwrap_or_default().iter().cloned().collect();
        self.conditions.matches(&asserted)
    }

    /// Projects the prefixes out of a list of prefix constraints.
    /// Duplicates collapse (set semantics).
    pub fn ip_prefixes_from(constraints: &[PrefixConstraint]) -> BTreeSet<IpPrefix> {
        constraints.iter().map(|c| c.prefix).collect()
    }
}
