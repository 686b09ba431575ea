//! Compiles a tenant snapshot into the constraint-indexed rule table.

use itertools::Itertools;
use log::{debug, warn};

use crate::classifier::ActionKind;
use crate::condition::{ConditionSet, EndpointConstraint};
use crate::index::TenantIndex;
use crate::policy::{Policy, ResolvedPolicy, ResolvedRule, RuleClassifier, RuleGroup};
use crate::tenant::{Clause, Contract, Subject};
use crate::PolicyValidationError;

/// Resolves declared contracts into per-group-pair [`Policy`] tables.
///
/// For every ordered (consumer, provider) pair sharing a contract, each
/// clause whose condition matchers can be satisfied contributes the rule
/// groups of its referenced subjects to the cell keyed by the clause's
/// consumer/provider constraints.
///
/// Dangling contract, subject, classifier or action references are
/// resolution misses: logged and skipped, never errors. Malformed
/// classifier parameters abort resolution with a
/// [`PolicyValidationError`].
pub struct PolicyResolver;

impl PolicyResolver {
    /// Builds the resolved policy for one tenant.
    pub fn resolve(index: &TenantIndex) -> Result<ResolvedPolicy, PolicyValidationError> {
        let tenant = index.tenant();
        let mut resolved = ResolvedPolicy::default();

        for (consumer, provider) in tenant
            .endpoint_groups
            .iter()
            .cartesian_product(tenant.endpoint_groups.iter())
        {
            let shared = consumer
                .consumed_contracts
                .intersection(&provider.provided_contracts);
            let mut policy = Policy::default();
            for contract_id in shared {
                let Some(contract) = index.contract(contract_id) else {
                    warn!(
                        "tenant {}: groups ({}, {}) reference missing contract {}",
                        tenant.id, consumer.id, provider.id, contract_id
                    );
                    continue;
                };
                Self::apply_contract(index, contract, &mut policy)?;
            }
            // A pair whose clauses all came up empty gets no entry at all;
            // lookups fall back to the shared empty policy.
            if !policy.is_empty() {
                resolved.insert(consumer.id.clone(), provider.id.clone(), policy);
            }
        }
        Ok(resolved)
    }

    fn apply_contract(
        index: &TenantIndex,
        contract: &Contract,
        policy: &mut Policy,
    ) -> Result<(), PolicyValidationError> {
        for clause in &contract.clauses {
            let consumer_set = ConditionSet::from_matchers(&clause.consumer_matchers);
            let provider_set = ConditionSet::from_matchers(&clause.provider_matchers);
            if consumer_set.is_unsatisfiable() || provider_set.is_unsatisfiable() {
                debug!(
                    "contract {}: clause {} can never match, skipping",
                    contract.id, clause.name
                );
                continue;
            }

            let mut groups = Vec::new();
            for subject in Self::clause_subjects(contract, clause) {
                groups.push(Self::rule_group(index, contract, subject)?);
            }
            if groups.is_empty() {
                continue;
            }

            let from =
                EndpointConstraint::new(consumer_set, clause.consumer_prefixes.iter().copied());
            let to =
                EndpointConstraint::new(provider_set, clause.provider_prefixes.iter().copied());
            policy.append(from, to, groups);
        }
        Ok(())
    }

    /// Subjects a clause activates. An empty reference list activates every
    /// subject of the contract; dangling references are skipped.
    fn clause_subjects<'a>(contract: &'a Contract, clause: &'a Clause) -> Vec<&'a Subject> {
        if clause.subject_refs.is_empty() {
            return contract.subjects.iter().collect();
        }
        clause
            .subject_refs
            .iter()
            .filter_map(|name| {
                let found = contract.subjects.iter().find(|s| &s.name == name);
                if found.is_none() {
                    warn!(
                        "contract {}: clause {} references missing subject {}",
                        contract.id, clause.name, name
                    );
                }
                found
            })
            .collect()
    }

    fn rule_group(
        index: &TenantIndex,
        contract: &Contract,
        subject: &Subject,
    ) -> Result<RuleGroup, PolicyValidationError> {
        let mut declared: Vec<_> = subject.rules.iter().collect();
        declared.sort_by_key(|r| (r.order.unwrap_or(u32::MAX), r.name.clone()));

        let mut rules = Vec::new();
        'rules: for rule in declared {
            let mut classifiers = Vec::new();
            for reference in &rule.classifier_refs {
                let Some(instance) = index.classifier(&reference.name) else {
                    warn!(
                        "contract {}: rule {} references missing classifier {}, \
                         skipping rule",
                        contract.id, rule.name, reference.name
                    );
                    continue 'rules;
                };
                classifiers.push(RuleClassifier {
                    direction: reference.direction,
                    spec: instance.compile()?,
                });
            }

            let mut actions = Vec::new();
            for name in &rule.action_refs {
                let Some(instance) = index.action(name) else {
                    warn!(
                        "contract {}: rule {} references missing action {}, skipping rule",
                        contract.id, rule.name, name
                    );
                    continue 'rules;
                };
                actions.push(instance.kind);
            }
            // A rule with no action references allows by default.
            if actions.is_empty() {
                actions.push(ActionKind::Allow);
            }

            rules.push(ResolvedRule {
                name: rule.name.clone(),
                order: rule.order,
                classifiers,
                actions,
            });
        }

        Ok(RuleGroup {
            tenant: index.tenant().id.clone(),
            contract: contract.id.clone(),
            subject: subject.name.clone(),
            order: subject.order,
            rules,
        })
    }
}
