//! Policy-enforcement stage: contract-rule flows for table 4.

use gbp_policy::{ConditionGroup, IntraGroupPolicy, RuleGroup};
use gbp_types::EndpointGroupId;
use log::{debug, warn};

use crate::context::{Endpoint, RendererContext};
use crate::flow::{FlowBuilder, FlowMatch, Instruction};
use crate::tables::{self, enforcer_priority as prio, reg};
use crate::writer::FlowWriter;

/// Synthesizes table-4 flows for directed traffic between co-located
/// endpoint pairs.
///
/// Matched traffic continues at `next_table`; a pair with no applicable
/// rules gets no flow at all, leaving the deny to the pipeline's
/// table-miss behavior.
#[derive(Debug, Clone)]
pub struct PolicyEnforcer {
    next_table: u8,
}

impl Default for PolicyEnforcer {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEnforcer {
    pub fn new() -> Self {
        Self {
            next_table: tables::EGRESS_NAT,
        }
    }

    pub fn with_next_table(next_table: u8) -> Self {
        Self { next_table }
    }

    /// Writes the flows permitting traffic from `src` to `dst`.
    ///
    /// Both endpoints must resolve to the same switch; anything else is a
    /// skip, not an error.
    pub fn sync_pair(
        &self,
        ctx: &RendererContext,
        src: &Endpoint,
        dst: &Endpoint,
        writer: &mut FlowWriter,
    ) {
        let (Some(src_loc), Some(dst_loc)) = (&src.location, &dst.location) else {
            debug!("pair ({}, {}): not fully located, skipping", src.mac, dst.mac);
            return;
        };
        if src_loc.node != dst_loc.node {
            debug!(
                "pair ({}, {}): on different switches, skipping",
                src.mac, dst.mac
            );
            return;
        }
        let node = &src_loc.node;

        self.same_group_flows(ctx, src, dst, writer);

        let src_cg = src.condition_group();
        let dst_cg = dst.condition_group();
        for src_group in &src.groups {
            for dst_group in &dst.groups {
                if src_group == dst_group {
                    continue;
                }
                let Some(regs) =
                    self.identity_registers(ctx, src_group, &src_cg, dst_group, &dst_cg)
                else {
                    warn!(
                        "pair ({}, {}): no ordinals for ({}, {}), skipping",
                        src.mac, dst.mac, src_group, dst_group
                    );
                    continue;
                };

                // Rules where src consumes from dst apply in the "in"
                // direction; rules where src provides to dst in "out".
                let consumed = ctx
                    .policy()
                    .get(src_group, dst_group)
                    .get_rules(&src_cg, &dst_cg);
                let provided = ctx
                    .policy()
                    .get(dst_group, src_group)
                    .get_rules(&dst_cg, &src_cg);

                self.rule_flows(node, &regs, &consumed, true, writer);
                self.rule_flows(node, &regs, &provided, false, writer);
            }
        }
    }

    /// The unconditional allow between members of one endpoint group,
    /// bypassing contract evaluation unless the group opts out.
    fn same_group_flows(
        &self,
        ctx: &RendererContext,
        src: &Endpoint,
        dst: &Endpoint,
        writer: &mut FlowWriter,
    ) {
        let Some(location) = &src.location else {
            return;
        };
        for group in src.groups.intersection(&dst.groups) {
            let requires_contract = ctx
                .index()
                .endpoint_group(group)
                .map(|g| g.intra_group_policy == IntraGroupPolicy::RequireContract)
                .unwrap_or(false);
            if requires_contract {
                debug!("group {}: intra-group traffic requires contracts", group);
                continue;
            }
            let Some(ordinal) = ctx.ordinals().group_ordinal(group) else {
                warn!("group {}: no ordinal assigned, skipping intra-group allow", group);
                continue;
            };
            writer.write_flow(
                FlowBuilder::new(location.node.clone(), tables::POLICY_ENFORCER, "intraallow")
                    .priority(prio::SAME_GROUP)
                    .matches(
                        FlowMatch::new()
                            .with_register(reg::SRC_EPG, ordinal)
                            .with_register(reg::DST_EPG, ordinal),
                    )
                    .instruction(Instruction::GotoTable(self.next_table))
                    .build(),
            );
        }
    }

    fn identity_registers(
        &self,
        ctx: &RendererContext,
        src_group: &EndpointGroupId,
        src_cg: &ConditionGroup,
        dst_group: &EndpointGroupId,
        dst_cg: &ConditionGroup,
    ) -> Option<FlowMatch> {
        let ordinals = ctx.ordinals();
        Some(
            FlowMatch::new()
                .with_register(reg::SRC_EPG, ordinals.group_ordinal(src_group)?)
                .with_register(reg::SRC_CONDITION_GROUP, ordinals.condition_group_ordinal(src_cg)?)
                .with_register(reg::DST_EPG, ordinals.group_ordinal(dst_group)?)
                .with_register(reg::DST_CONDITION_GROUP, ordinals.condition_group_ordinal(dst_cg)?),
        )
    }

    /// Emits flows for an ordered rule list.
    ///
    /// Each rule in the sorted order consumes one priority slot below the
    /// rule base whether or not it emits flows, so priorities stay stable
    /// when individual rules are deny-only.
    fn rule_flows(
        &self,
        node: &gbp_types::NodeId,
        identity: &FlowMatch,
        groups: &[RuleGroup],
        direction_in: bool,
        writer: &mut FlowWriter,
    ) {
        let mut slot: u16 = 0;
        for group in groups {
            for rule in &group.rules {
                let priority = prio::RULE_BASE.saturating_sub(slot);
                slot += 1;
                if rule.denies() {
                    continue;
                }
                for classifier in &rule.classifiers {
                    let applies = if direction_in {
                        classifier.direction.covers_in()
                    } else {
                        classifier.direction.covers_out()
                    };
                    if !applies {
                        continue;
                    }
                    for ether_type in &classifier.spec.ether_types {
                        let mut matches = identity.clone().with_eth_type(*ether_type);
                        if let Some(proto) = classifier.spec.ip_proto {
                            matches = matches.with_ip_proto(proto);
                        }
                        if let Some(ports) = classifier.spec.src_ports {
                            matches = matches.with_l4_src(ports);
                        }
                        if let Some(ports) = classifier.spec.dst_ports {
                            matches = matches.with_l4_dst(ports);
                        }
                        let discriminator = format!(
                            "policy|{}|{}|{}|{}",
                            escape_id_part(group.contract.as_str()),
                            escape_id_part(group.subject.as_str()),
                            escape_id_part(rule.name.as_str()),
                            escape_id_part(classifier.spec.name.as_str()),
                        );
                        writer.write_flow(
                            FlowBuilder::new(node.clone(), tables::POLICY_ENFORCER, discriminator)
                                .priority(priority)
                                .matches(matches)
                                .instruction(Instruction::GotoTable(self.next_table))
                                .build(),
                        );
                    }
                }
            }
        }
    }
}

/// Tenant-authored names may contain the flow-id separator; escape it so
/// two distinct rules never alias one id.
fn escape_id_part(part: &str) -> String {
    part.replace('\\', "\\\\").replace('|', "\\|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeConfig;
    use gbp_policy::{
        params, ClassifierInstance, ClassifierKind, Clause, Contract, Direction, EndpointGroup,
        PolicyResolver, Rule, Subject, Tenant, TenantIndex,
    };
    use gbp_types::NodeId;
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn node() -> NodeId {
        NodeId::new("openflow:1")
    }

    /// G0 consumes "web" from G1; the contract allows HTTP in.
    fn web_tenant() -> Tenant {
        let mut tenant = Tenant::new("t1", 1);
        tenant.endpoint_groups = vec![
            EndpointGroup::new("g0").consumes("web"),
            EndpointGroup::new("g1").provides("web"),
        ];
        tenant.classifiers = vec![ClassifierInstance::new("http", ClassifierKind::L4)
            .with_param(params::PROTO, 6)
            .with_param(params::DST_PORT, 80)];
        tenant.contracts = vec![Contract::new("web")
            .with_subject(
                Subject::new("allow-http").with_order(0).with_rule(
                    Rule::new("r1")
                        .with_order(0)
                        .with_classifier("http", Direction::In),
                ),
            )
            .with_clause(Clause::new("everyone").with_subject_ref("allow-http"))];
        tenant
    }

    fn context_for(tenant: Tenant, endpoints: Vec<Endpoint>) -> RendererContext {
        let index = TenantIndex::new(Arc::new(tenant));
        let policy = PolicyResolver::resolve(&index).unwrap();
        let mut nodes = BTreeMap::new();
        nodes.insert(node(), NodeConfig::new());
        RendererContext::new(index, policy, endpoints, nodes)
    }

    fn endpoint(mac: &str, group: &str, port: &str) -> Endpoint {
        Endpoint::new("t1", mac.parse().unwrap())
            .in_group(group)
            .located_at("openflow:1", port)
    }

    #[test]
    fn test_consumer_to_provider_flow() {
        let consumer = endpoint("00:16:3e:00:00:01", "g0", "openflow:1:1");
        let provider = endpoint("00:16:3e:00:00:02", "g1", "openflow:1:2");
        let ctx = context_for(web_tenant(), vec![consumer.clone(), provider.clone()]);
        let mut writer = FlowWriter::new();
        PolicyEnforcer::new().sync_pair(&ctx, &consumer, &provider, &mut writer);

        let flows = writer.flows_for(&node(), tables::POLICY_ENFORCER);
        assert_eq!(flows.len(), 2); // IPv4 and IPv6 variants of the rule.
        for flow in &flows {
            assert_eq!(flow.matches.ip_proto, Some(6));
            assert_eq!(
                flow.instructions,
                vec![Instruction::GotoTable(tables::EGRESS_NAT)]
            );
            // Identity registers present.
            assert_eq!(flow.matches.registers.len(), 4);
        }
    }

    #[test]
    fn test_in_direction_excludes_provider_to_consumer() {
        let consumer = endpoint("00:16:3e:00:00:01", "g0", "openflow:1:1");
        let provider = endpoint("00:16:3e:00:00:02", "g1", "openflow:1:2");
        let ctx = context_for(web_tenant(), vec![consumer.clone(), provider.clone()]);
        let mut writer = FlowWriter::new();
        // Reverse direction: provider -> consumer; the "in" classifier
        // must not emit.
        PolicyEnforcer::new().sync_pair(&ctx, &provider, &consumer, &mut writer);
        assert_eq!(writer.flow_count(&node(), tables::POLICY_ENFORCER), 0);
    }

    #[test]
    fn test_no_contract_means_no_flows() {
        let mut tenant = web_tenant();
        tenant.contracts.clear();
        let a = endpoint("00:16:3e:00:00:01", "g0", "openflow:1:1");
        let b = endpoint("00:16:3e:00:00:02", "g1", "openflow:1:2");
        let ctx = context_for(tenant, vec![a.clone(), b.clone()]);
        let mut writer = FlowWriter::new();
        PolicyEnforcer::new().sync_pair(&ctx, &a, &b, &mut writer);
        assert_eq!(writer.total_flow_count(), 0);
    }

    #[test]
    fn test_same_group_bypass() {
        let mut tenant = web_tenant();
        tenant.contracts.clear(); // bypass must not depend on contracts
        let a = endpoint("00:16:3e:00:00:01", "g0", "openflow:1:1");
        let b = endpoint("00:16:3e:00:00:02", "g0", "openflow:1:2");
        let ctx = context_for(tenant, vec![a.clone(), b.clone()]);
        let mut writer = FlowWriter::new();
        PolicyEnforcer::new().sync_pair(&ctx, &a, &b, &mut writer);

        let flows = writer.flows_for(&node(), tables::POLICY_ENFORCER);
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].priority, prio::SAME_GROUP);
        let src = flows[0].matches.registers.get(&reg::SRC_EPG);
        let dst = flows[0].matches.registers.get(&reg::DST_EPG);
        assert_eq!(src, dst);
        assert!(src.is_some());
    }

    #[test]
    fn test_same_group_respects_require_contract() {
        let mut tenant = web_tenant();
        tenant.contracts.clear();
        tenant.endpoint_groups[0] = EndpointGroup::new("g0")
            .with_intra_group_policy(gbp_policy::IntraGroupPolicy::RequireContract);
        let a = endpoint("00:16:3e:00:00:01", "g0", "openflow:1:1");
        let b = endpoint("00:16:3e:00:00:02", "g0", "openflow:1:2");
        let ctx = context_for(tenant, vec![a.clone(), b.clone()]);
        let mut writer = FlowWriter::new();
        PolicyEnforcer::new().sync_pair(&ctx, &a, &b, &mut writer);
        assert_eq!(writer.total_flow_count(), 0);
    }

    #[test]
    fn test_condition_gated_rule() {
        let mut tenant = web_tenant();
        tenant.contracts[0].clauses[0] = Clause::new("secure-only")
            .with_subject_ref("allow-http")
            .with_consumer_matcher(gbp_policy::ConditionMatcher::new(
                "m",
                gbp_policy::MatchType::All,
                [gbp_types::ConditionName::new("secure")],
            ));

        let plain = endpoint("00:16:3e:00:00:01", "g0", "openflow:1:1");
        let provider = endpoint("00:16:3e:00:00:02", "g1", "openflow:1:2");
        let secure = endpoint("00:16:3e:00:00:03", "g0", "openflow:1:3")
            .with_condition("secure");

        let ctx = context_for(
            tenant,
            vec![plain.clone(), provider.clone(), secure.clone()],
        );
        let enforcer = PolicyEnforcer::new();

        let mut writer = FlowWriter::new();
        enforcer.sync_pair(&ctx, &plain, &provider, &mut writer);
        assert_eq!(writer.total_flow_count(), 0);

        enforcer.sync_pair(&ctx, &secure, &provider, &mut writer);
        assert!(writer.flow_count(&node(), tables::POLICY_ENFORCER) > 0);
    }

    #[test]
    fn test_separator_in_names_keeps_flows_distinct() {
        let mut tenant = Tenant::new("t1", 1);
        tenant.endpoint_groups = vec![
            EndpointGroup::new("g0").consumes("web"),
            EndpointGroup::new("g1").provides("web"),
        ];
        // Without escaping, (rule "r|a", classifier "x") and (rule "r",
        // classifier "a|x") produce the same discriminator.
        let http = |name: &str| {
            ClassifierInstance::new(name, ClassifierKind::L4)
                .with_param(params::PROTO, 6)
                .with_param(params::DST_PORT, 80)
        };
        tenant.classifiers = vec![http("x"), http("a|x")];
        tenant.contracts = vec![Contract::new("web")
            .with_subject(
                Subject::new("s")
                    .with_order(0)
                    .with_rule(
                        Rule::new("r|a")
                            .with_order(0)
                            .with_classifier("x", Direction::In),
                    )
                    .with_rule(
                        Rule::new("r")
                            .with_order(1)
                            .with_classifier("a|x", Direction::In),
                    ),
            )
            .with_clause(Clause::new("everyone").with_subject_ref("s"))];

        let consumer = endpoint("00:16:3e:00:00:01", "g0", "openflow:1:1");
        let provider = endpoint("00:16:3e:00:00:02", "g1", "openflow:1:2");
        let ctx = context_for(tenant, vec![consumer.clone(), provider.clone()]);
        let mut writer = FlowWriter::new();
        PolicyEnforcer::new().sync_pair(&ctx, &consumer, &provider, &mut writer);

        // Two rules, each with IPv4 and IPv6 variants; nothing collapsed.
        assert_eq!(writer.flow_count(&node(), tables::POLICY_ENFORCER), 4);
    }

    #[test]
    fn test_cross_switch_pair_skipped() {
        let a = endpoint("00:16:3e:00:00:01", "g0", "openflow:1:1");
        let mut b = endpoint("00:16:3e:00:00:02", "g1", "openflow:2:1");
        b.location = Some(crate::context::EndpointLocation {
            node: NodeId::new("openflow:2"),
            connector: "openflow:2:1".into(),
        });
        let ctx = context_for(web_tenant(), vec![a.clone(), b.clone()]);
        let mut writer = FlowWriter::new();
        PolicyEnforcer::new().sync_pair(&ctx, &a, &b, &mut writer);
        assert_eq!(writer.total_flow_count(), 0);
    }

    #[test]
    fn test_deny_rule_emits_no_flow_but_holds_slot() {
        let mut tenant = web_tenant();
        tenant.actions = vec![gbp_policy::ActionInstance::new(
            "block",
            gbp_policy::ActionKind::Deny,
        )];
        // A deny rule ordered before the allow rule.
        tenant.contracts[0].subjects[0] = Subject::new("allow-http")
            .with_order(0)
            .with_rule(
                Rule::new("r0")
                    .with_order(0)
                    .with_classifier("http", Direction::In)
                    .with_action("block"),
            )
            .with_rule(
                Rule::new("r1")
                    .with_order(1)
                    .with_classifier("http", Direction::In),
            );
        let consumer = endpoint("00:16:3e:00:00:01", "g0", "openflow:1:1");
        let provider = endpoint("00:16:3e:00:00:02", "g1", "openflow:1:2");
        let ctx = context_for(tenant, vec![consumer.clone(), provider.clone()]);
        let mut writer = FlowWriter::new();
        PolicyEnforcer::new().sync_pair(&ctx, &consumer, &provider, &mut writer);

        let flows = writer.flows_for(&node(), tables::POLICY_ENFORCER);
        assert_eq!(flows.len(), 2);
        // The allow rule sits in the second priority slot.
        assert!(flows.iter().all(|f| f.priority == prio::RULE_BASE - 1));
    }
}
