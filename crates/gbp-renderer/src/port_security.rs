//! Port-security stage: ingress validation flows for table 0.

use gbp_policy::{DomainKind, ForwardingDomain, PortMatch};
use gbp_types::{ethertype, IpPrefix, MacAddress, NodeId, VlanId};
use log::{debug, warn};
use std::net::IpAddr;

use crate::context::{Endpoint, RendererContext};
use crate::flow::{FlowBuilder, FlowMatch, Instruction, VlanMatch};
use crate::tables::{self, port_security_priority as prio};
use crate::writer::FlowWriter;

const DHCP_CLIENT_V4: u16 = 68;
const DHCP_SERVER_V4: u16 = 67;
const DHCP_CLIENT_V6: u16 = 546;
const DHCP_SERVER_V6: u16 = 547;

/// All-DHCP-agents multicast address used by DHCPv6 solicits.
const DHCPV6_AGENTS_MAC: MacAddress =
    MacAddress::new([0x33, 0x33, 0x00, 0x01, 0x00, 0x02]);

/// Synthesizes table-0 ingress validation flows.
///
/// Node-level flows (drop bands, tunnel allows, external ports) are written
/// once per switch; endpoint-level source-address allows once per located
/// internal endpoint. Every allow continues at `next_table`.
#[derive(Debug, Clone)]
pub struct PortSecurity {
    next_table: u8,
}

impl Default for PortSecurity {
    fn default() -> Self {
        Self::new()
    }
}

impl PortSecurity {
    pub fn new() -> Self {
        Self {
            next_table: tables::SOURCE_MAPPER,
        }
    }

    /// Overrides the table allows continue at (ingress NAT deployments).
    pub fn with_next_table(next_table: u8) -> Self {
        Self { next_table }
    }

    /// Writes the per-switch baseline flows.
    pub fn sync_node(&self, ctx: &RendererContext, node: &NodeId, writer: &mut FlowWriter) {
        self.drop_flows(node, writer);

        let Some(config) = ctx.node_config(node) else {
            warn!("node {}: no switch configuration, skipping tunnel and external flows", node);
            return;
        };

        for tunnel in &config.tunnel_ports {
            writer.write_flow(
                FlowBuilder::new(node.clone(), tables::PORT_SECURITY, "tunnelallow")
                    .priority(prio::ALLOW_TUNNEL)
                    .matches(FlowMatch::new().with_in_port(tunnel.connector.clone()))
                    .instruction(Instruction::GotoTable(self.next_table))
                    .build(),
            );
        }

        let segmentation_ids = Self::segmentation_ids(ctx);
        for external in &config.external_ports {
            for vid in &segmentation_ids {
                writer.write_flow(
                    FlowBuilder::new(node.clone(), tables::PORT_SECURITY, "vlanpop")
                        .priority(prio::EXTERNAL_VLAN_POP)
                        .matches(
                            FlowMatch::new()
                                .with_in_port(external.clone())
                                .with_vlan(VlanMatch::Tagged(*vid)),
                        )
                        .instruction(Instruction::PopVlan)
                        .instruction(Instruction::GotoTable(self.next_table))
                        .build(),
                );
            }
            writer.write_flow(
                FlowBuilder::new(node.clone(), tables::PORT_SECURITY, "allowexternal")
                    .priority(prio::EXTERNAL_UNTAGGED)
                    .matches(
                        FlowMatch::new()
                            .with_in_port(external.clone())
                            .with_vlan(VlanMatch::Untagged),
                    )
                    .instruction(Instruction::GotoTable(self.next_table))
                    .build(),
            );
        }
    }

    /// Writes the source-address allow flows for one located endpoint.
    ///
    /// External-implicit-group members are covered by the external-port
    /// flows and get no per-endpoint allows.
    pub fn sync_endpoint(&self, ctx: &RendererContext, endpoint: &Endpoint, writer: &mut FlowWriter) {
        let Some(location) = &endpoint.location else {
            debug!("endpoint {}: not located, no port-security flows", endpoint.mac);
            return;
        };
        if ctx.is_external_endpoint(endpoint) {
            debug!(
                "endpoint {}: member of an external implicit group, relying on external port flows",
                endpoint.mac
            );
            return;
        }

        let node = &location.node;
        let in_port = &location.connector;

        for ip in &endpoint.ips {
            let (family, disc) = match ip {
                IpAddr::V4(_) => (ethertype::IPV4, "l3"),
                IpAddr::V6(_) => (ethertype::IPV6, "l3"),
            };
            writer.write_flow(
                FlowBuilder::new(node.clone(), tables::PORT_SECURITY, disc)
                    .priority(prio::ALLOW_L3)
                    .matches(
                        FlowMatch::new()
                            .with_in_port(in_port.clone())
                            .with_eth_src(endpoint.mac)
                            .with_eth_type(family)
                            .with_src_prefix(IpPrefix::host(*ip)),
                    )
                    .instruction(Instruction::GotoTable(self.next_table))
                    .build(),
            );
            // ARP probes carry the same sender address.
            if ip.is_ipv4() {
                writer.write_flow(
                    FlowBuilder::new(node.clone(), tables::PORT_SECURITY, "arp")
                        .priority(prio::ALLOW_L3)
                        .matches(
                            FlowMatch::new()
                                .with_in_port(in_port.clone())
                                .with_eth_src(endpoint.mac)
                                .with_eth_type(ethertype::ARP)
                                .with_src_prefix(IpPrefix::host(*ip)),
                        )
                        .instruction(Instruction::GotoTable(self.next_table))
                        .build(),
                );
            }
        }

        self.dhcp_flows(node, in_port, endpoint, writer);

        writer.write_flow(
            FlowBuilder::new(node.clone(), tables::PORT_SECURITY, "l2")
                .priority(prio::ALLOW_L2)
                .matches(
                    FlowMatch::new()
                        .with_in_port(in_port.clone())
                        .with_eth_src(endpoint.mac),
                )
                .instruction(Instruction::GotoTable(self.next_table))
                .build(),
        );
    }

    fn drop_flows(&self, node: &NodeId, writer: &mut FlowWriter) {
        writer.write_flow(
            FlowBuilder::new(node.clone(), tables::PORT_SECURITY, "dropall")
                .priority(prio::DROP_ALL)
                .instruction(Instruction::Drop)
                .build(),
        );
        let bands = [
            (ethertype::ARP, prio::DROP_ARP),
            (ethertype::IPV4, prio::DROP_IPV4),
            (ethertype::IPV6, prio::DROP_IPV6),
        ];
        for (eth_type, priority) in bands {
            writer.write_flow(
                FlowBuilder::new(node.clone(), tables::PORT_SECURITY, "dropethertype")
                    .priority(priority)
                    .matches(FlowMatch::new().with_eth_type(eth_type))
                    .instruction(Instruction::Drop)
                    .build(),
            );
        }
    }

    fn dhcp_flows(
        &self,
        node: &NodeId,
        in_port: &gbp_types::ConnectorId,
        endpoint: &Endpoint,
        writer: &mut FlowWriter,
    ) {
        writer.write_flow(
            FlowBuilder::new(node.clone(), tables::PORT_SECURITY, "dhcp")
                .priority(prio::ALLOW_DHCP)
                .matches(
                    FlowMatch::new()
                        .with_in_port(in_port.clone())
                        .with_eth_src(endpoint.mac)
                        .with_eth_dst(MacAddress::BROADCAST)
                        .with_eth_type(ethertype::IPV4)
                        .with_ip_proto(17)
                        .with_l4_src(PortMatch::Single(DHCP_CLIENT_V4))
                        .with_l4_dst(PortMatch::Single(DHCP_SERVER_V4)),
                )
                .instruction(Instruction::GotoTable(self.next_table))
                .build(),
        );
        writer.write_flow(
            FlowBuilder::new(node.clone(), tables::PORT_SECURITY, "dhcpv6")
                .priority(prio::ALLOW_DHCP)
                .matches(
                    FlowMatch::new()
                        .with_in_port(in_port.clone())
                        .with_eth_src(endpoint.mac)
                        .with_eth_dst(DHCPV6_AGENTS_MAC)
                        .with_eth_type(ethertype::IPV6)
                        .with_ip_proto(17)
                        .with_l4_src(PortMatch::Single(DHCP_CLIENT_V6))
                        .with_l4_dst(PortMatch::Single(DHCP_SERVER_V6)),
                )
                .instruction(Instruction::GotoTable(self.next_table))
                .build(),
        );
    }

    /// Segmentation ids declared on the tenant's flood domains.
    fn segmentation_ids(ctx: &RendererContext) -> Vec<VlanId> {
        let mut ids: Vec<VlanId> = ctx
            .index()
            .tenant()
            .forwarding_domains
            .iter()
            .filter(|d| d.kind() == DomainKind::L2FloodDomain)
            .filter_map(|d| match d {
                ForwardingDomain::L2FloodDomain { segmentation, .. } => *segmentation,
                _ => None,
            })
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{NodeConfig, TunnelKind};
    use gbp_policy::{ResolvedPolicy, Tenant, TenantIndex};
    use gbp_types::{EndpointGroupId, NetworkDomainId};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    fn node() -> NodeId {
        NodeId::new("openflow:1")
    }

    fn context(tenant: Tenant, config: Option<NodeConfig>) -> RendererContext {
        let mut nodes = BTreeMap::new();
        if let Some(c) = config {
            nodes.insert(node(), c);
        }
        RendererContext::new(
            TenantIndex::new(Arc::new(tenant)),
            ResolvedPolicy::default(),
            Vec::new(),
            nodes,
        )
    }

    fn internal_endpoint() -> Endpoint {
        Endpoint::new("t1", "00:16:3e:00:00:01".parse().unwrap())
            .in_group("web")
            .with_ip("10.0.1.5".parse().unwrap())
            .located_at("openflow:1", "openflow:1:3")
    }

    #[test]
    fn test_node_baseline_drop_flows() {
        let ctx = context(Tenant::new("t1", 1), Some(NodeConfig::new()));
        let mut writer = FlowWriter::new();
        PortSecurity::new().sync_node(&ctx, &node(), &mut writer);

        let flows = writer.flows_for(&node(), tables::PORT_SECURITY);
        // drop-all plus one drop per recognized ether type.
        assert_eq!(flows.len(), 4);
        assert!(flows.iter().any(|f| f.priority == prio::DROP_ALL));
        assert!(flows
            .iter()
            .any(|f| f.matches.eth_type == Some(ethertype::ARP)
                && f.instructions == vec![Instruction::Drop]));
    }

    #[test]
    fn test_missing_node_config_keeps_drop_flows() {
        let ctx = context(Tenant::new("t1", 1), None);
        let mut writer = FlowWriter::new();
        PortSecurity::new().sync_node(&ctx, &node(), &mut writer);
        assert_eq!(writer.flow_count(&node(), tables::PORT_SECURITY), 4);
    }

    #[test]
    fn test_tunnel_allow_per_configured_port() {
        let config = NodeConfig::new()
            .with_tunnel_port("openflow:1:10", TunnelKind::Vxlan)
            .with_tunnel_port("openflow:1:11", TunnelKind::VxlanGpe);
        let ctx = context(Tenant::new("t1", 1), Some(config));
        let mut writer = FlowWriter::new();
        PortSecurity::new().sync_node(&ctx, &node(), &mut writer);

        let tunnels: Vec<_> = writer
            .flows_for(&node(), tables::PORT_SECURITY)
            .into_iter()
            .filter(|f| f.priority == prio::ALLOW_TUNNEL)
            .collect();
        assert_eq!(tunnels.len(), 2);
        for flow in tunnels {
            assert_eq!(
                flow.instructions,
                vec![Instruction::GotoTable(tables::SOURCE_MAPPER)]
            );
        }
    }

    #[test]
    fn test_external_port_vlan_flows() {
        let mut tenant = Tenant::new("t1", 1);
        tenant.forwarding_domains = vec![
            ForwardingDomain::L2FloodDomain {
                id: NetworkDomainId::new("f1"),
                parent: None,
                segmentation: Some(VlanId::new(100).unwrap()),
            },
            ForwardingDomain::L2FloodDomain {
                id: NetworkDomainId::new("f2"),
                parent: None,
                segmentation: Some(VlanId::new(200).unwrap()),
            },
        ];
        let config = NodeConfig::new().with_external_port("openflow:1:9");
        let ctx = context(tenant, Some(config));
        let mut writer = FlowWriter::new();
        PortSecurity::new().sync_node(&ctx, &node(), &mut writer);

        let flows = writer.flows_for(&node(), tables::PORT_SECURITY);
        let pops: Vec<_> = flows
            .iter()
            .filter(|f| f.instructions.contains(&Instruction::PopVlan))
            .collect();
        assert_eq!(pops.len(), 2);
        assert!(flows.iter().any(|f| f.priority == prio::EXTERNAL_UNTAGGED
            && f.matches.vlan == Some(VlanMatch::Untagged)));
    }

    #[test]
    fn test_internal_endpoint_allow_flows() {
        let ctx = context(Tenant::new("t1", 1), Some(NodeConfig::new()));
        let mut writer = FlowWriter::new();
        PortSecurity::new().sync_endpoint(&ctx, &internal_endpoint(), &mut writer);

        let flows = writer.flows_for(&node(), tables::PORT_SECURITY);
        // one IPv4 allow, one ARP allow, DHCPv4 + DHCPv6, one L2 allow.
        assert_eq!(flows.len(), 5);
        assert!(flows.iter().any(|f| f.matches.eth_type == Some(ethertype::ARP)));
        assert!(flows
            .iter()
            .any(|f| f.priority == prio::ALLOW_L2 && f.matches.eth_type.is_none()));
        // Every allow continues down the pipeline.
        assert!(flows
            .iter()
            .all(|f| f.instructions.contains(&Instruction::GotoTable(tables::SOURCE_MAPPER))));
    }

    #[test]
    fn test_external_endpoint_gets_no_per_endpoint_flows() {
        let mut tenant = Tenant::new("t1", 1);
        tenant
            .external_implicit_groups
            .insert(EndpointGroupId::new("web"));
        let ctx = context(tenant, Some(NodeConfig::new()));
        let mut writer = FlowWriter::new();
        PortSecurity::new().sync_endpoint(&ctx, &internal_endpoint(), &mut writer);
        assert_eq!(writer.total_flow_count(), 0);
    }

    #[test]
    fn test_unlocated_endpoint_skipped() {
        let ctx = context(Tenant::new("t1", 1), Some(NodeConfig::new()));
        let mut writer = FlowWriter::new();
        let endpoint = Endpoint::new("t1", "00:16:3e:00:00:01".parse().unwrap());
        PortSecurity::new().sync_endpoint(&ctx, &endpoint, &mut writer);
        assert_eq!(writer.total_flow_count(), 0);
    }

    #[test]
    fn test_next_table_override_applies_to_every_allow() {
        let config = NodeConfig::new().with_tunnel_port("openflow:1:10", TunnelKind::Vxlan);
        let ctx = context(Tenant::new("t1", 1), Some(config));
        let mut writer = FlowWriter::new();
        let stage = PortSecurity::with_next_table(tables::INGRESS_NAT);
        stage.sync_node(&ctx, &node(), &mut writer);
        stage.sync_endpoint(&ctx, &internal_endpoint(), &mut writer);

        let allows: Vec<_> = writer
            .flows_for(&node(), tables::PORT_SECURITY)
            .into_iter()
            .filter(|f| !f.instructions.contains(&Instruction::Drop))
            .collect();
        assert!(!allows.is_empty());
        // Tunnel, DHCP, L2/L3 allows all continue at the configured table.
        assert!(allows
            .iter()
            .all(|f| f.instructions.contains(&Instruction::GotoTable(tables::INGRESS_NAT))));
        assert!(allows.iter().any(|f| f.priority == prio::ALLOW_TUNNEL));
    }

    #[test]
    fn test_node_sync_idempotent() {
        let config = NodeConfig::new().with_tunnel_port("openflow:1:10", TunnelKind::Vxlan);
        let ctx = context(Tenant::new("t1", 1), Some(config));
        let mut writer = FlowWriter::new();
        let stage = PortSecurity::new();
        stage.sync_node(&ctx, &node(), &mut writer);
        let first = writer.flow_count(&node(), tables::PORT_SECURITY);
        stage.sync_node(&ctx, &node(), &mut writer);
        assert_eq!(writer.flow_count(&node(), tables::PORT_SECURITY), first);
    }
}
