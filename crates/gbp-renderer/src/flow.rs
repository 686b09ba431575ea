//! Device-agnostic flow descriptors with deterministic ids.

use gbp_policy::PortMatch;
use gbp_types::{ConnectorId, IpPrefix, MacAddress, NodeId, VlanId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;

/// VLAN tag state matched by a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VlanMatch {
    /// No 802.1Q tag present.
    Untagged,
    /// Tagged with a specific VLAN id.
    Tagged(VlanId),
}

/// Match predicate over packet fields and pipeline registers.
///
/// The canonical encoding emits the populated fields in one fixed order,
/// so two matches built from the same inputs encode identically no matter
/// how they were constructed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowMatch {
    pub in_port: Option<ConnectorId>,
    pub eth_src: Option<MacAddress>,
    pub eth_dst: Option<MacAddress>,
    pub eth_type: Option<u16>,
    pub vlan: Option<VlanMatch>,
    pub src_prefix: Option<IpPrefix>,
    pub dst_prefix: Option<IpPrefix>,
    pub ip_proto: Option<u8>,
    pub l4_src: Option<PortMatch>,
    pub l4_dst: Option<PortMatch>,
    /// Register loads required to have happened earlier in the pipeline.
    pub registers: BTreeMap<u8, u32>,
}

impl FlowMatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_in_port(mut self, port: impl Into<ConnectorId>) -> Self {
        self.in_port = Some(port.into());
        self
    }

    pub fn with_eth_src(mut self, mac: MacAddress) -> Self {
        self.eth_src = Some(mac);
        self
    }

    pub fn with_eth_dst(mut self, mac: MacAddress) -> Self {
        self.eth_dst = Some(mac);
        self
    }

    pub fn with_eth_type(mut self, eth_type: u16) -> Self {
        self.eth_type = Some(eth_type);
        self
    }

    pub fn with_vlan(mut self, vlan: VlanMatch) -> Self {
        self.vlan = Some(vlan);
        self
    }

    pub fn with_src_prefix(mut self, prefix: IpPrefix) -> Self {
        self.src_prefix = Some(prefix);
        self
    }

    pub fn with_dst_prefix(mut self, prefix: IpPrefix) -> Self {
        self.dst_prefix = Some(prefix);
        self
    }

    pub fn with_ip_proto(mut self, proto: u8) -> Self {
        self.ip_proto = Some(proto);
        self
    }

    pub fn with_l4_src(mut self, ports: PortMatch) -> Self {
        self.l4_src = Some(ports);
        self
    }

    pub fn with_l4_dst(mut self, ports: PortMatch) -> Self {
        self.l4_dst = Some(ports);
        self
    }

    pub fn with_register(mut self, reg: u8, value: u32) -> Self {
        self.registers.insert(reg, value);
        self
    }

    /// Canonical string encoding, independent of construction order.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        if let Some(p) = &self.in_port {
            let _ = write!(out, "in_port={p},");
        }
        if let Some(m) = &self.eth_src {
            let _ = write!(out, "eth_src={m},");
        }
        if let Some(m) = &self.eth_dst {
            let _ = write!(out, "eth_dst={m},");
        }
        if let Some(t) = self.eth_type {
            let _ = write!(out, "eth_type={t:#06x},");
        }
        match self.vlan {
            Some(VlanMatch::Untagged) => out.push_str("vlan=none,"),
            Some(VlanMatch::Tagged(vid)) => {
                let _ = write!(out, "vlan={vid},");
            }
            None => {}
        }
        if let Some(p) = &self.src_prefix {
            let _ = write!(out, "nw_src={p},");
        }
        if let Some(p) = &self.dst_prefix {
            let _ = write!(out, "nw_dst={p},");
        }
        if let Some(proto) = self.ip_proto {
            let _ = write!(out, "ip_proto={proto},");
        }
        if let Some(ports) = self.l4_src {
            let _ = write!(out, "tp_src={},", port_match_str(ports));
        }
        if let Some(ports) = self.l4_dst {
            let _ = write!(out, "tp_dst={},", port_match_str(ports));
        }
        for (reg, value) in &self.registers {
            let _ = write!(out, "reg{reg}={value},");
        }
        out.pop();
        out
    }
}

fn port_match_str(ports: PortMatch) -> String {
    match ports {
        PortMatch::Single(p) => p.to_string(),
        PortMatch::Range(low, high) => format!("{low}-{high}"),
    }
}

/// An instruction executed on match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instruction {
    /// Continue at the given pipeline table.
    GotoTable(u8),
    /// Strip the outer 802.1Q tag.
    PopVlan,
    /// Load a value into a pipeline register.
    LoadRegister { reg: u8, value: u32 },
    /// Emit on a connector.
    Output(ConnectorId),
    /// Discard the packet.
    Drop,
}

/// Deterministic flow identity derived from (table, discriminator, match).
///
/// Repeated synthesis of the same flow yields the same id, so the
/// accumulator's replace-on-id semantics make re-synthesis idempotent.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FlowId(String);

impl FlowId {
    fn derive(table: u8, discriminator: &str, matches: &FlowMatch) -> Self {
        FlowId(format!("{table}|{discriminator}|{}", matches.canonical()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered match/action rule destined for one table of one switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    pub node: NodeId,
    pub table: u8,
    pub priority: u16,
    pub matches: FlowMatch,
    pub instructions: Vec<Instruction>,
}

/// Builder for [`Flow`]; the id is derived at build time from the table,
/// the discriminator and the final match content.
#[derive(Debug, Clone)]
pub struct FlowBuilder {
    node: NodeId,
    table: u8,
    discriminator: String,
    priority: u16,
    matches: FlowMatch,
    instructions: Vec<Instruction>,
}

impl FlowBuilder {
    /// Starts a flow for one (node, table) with a discriminator naming the
    /// flow class (so distinct classes with equal matches stay distinct).
    pub fn new(node: NodeId, table: u8, discriminator: impl Into<String>) -> Self {
        Self {
            node,
            table,
            discriminator: discriminator.into(),
            priority: 0,
            matches: FlowMatch::default(),
            instructions: Vec::new(),
        }
    }

    pub fn priority(mut self, priority: u16) -> Self {
        self.priority = priority;
        self
    }

    pub fn matches(mut self, matches: FlowMatch) -> Self {
        self.matches = matches;
        self
    }

    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn build(self) -> Flow {
        let id = FlowId::derive(self.table, &self.discriminator, &self.matches);
        Flow {
            id,
            node: self.node,
            table: self.table,
            priority: self.priority,
            matches: self.matches,
            instructions: self.instructions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeId {
        NodeId::new("openflow:1")
    }

    #[test]
    fn test_canonical_ignores_construction_order() {
        let a = FlowMatch::new()
            .with_eth_type(0x0800)
            .with_in_port("openflow:1:3")
            .with_register(2, 7)
            .with_register(0, 5);
        let b = FlowMatch::new()
            .with_register(0, 5)
            .with_register(2, 7)
            .with_in_port("openflow:1:3")
            .with_eth_type(0x0800);
        assert_eq!(a.canonical(), b.canonical());
        assert_eq!(
            a.canonical(),
            "in_port=openflow:1:3,eth_type=0x0800,reg0=5,reg2=7"
        );
    }

    #[test]
    fn test_empty_match_canonical() {
        assert_eq!(FlowMatch::new().canonical(), "");
    }

    #[test]
    fn test_flow_id_deterministic() {
        let build = || {
            FlowBuilder::new(node(), 0, "l2allow")
                .priority(140)
                .matches(
                    FlowMatch::new()
                        .with_in_port("openflow:1:3")
                        .with_eth_src("00:16:3e:00:00:01".parse().unwrap()),
                )
                .instruction(Instruction::GotoTable(2))
                .build()
        };
        assert_eq!(build(), build());
        assert_eq!(build().id, build().id);
    }

    #[test]
    fn test_discriminator_distinguishes_flow_classes() {
        let matches = FlowMatch::new().with_in_port("openflow:1:3");
        let a = FlowBuilder::new(node(), 0, "tunnel")
            .matches(matches.clone())
            .build();
        let b = FlowBuilder::new(node(), 0, "external")
            .matches(matches)
            .build();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_table_part_of_id() {
        let a = FlowBuilder::new(node(), 0, "x").build();
        let b = FlowBuilder::new(node(), 4, "x").build();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_flow_json_roundtrip() {
        let flow = FlowBuilder::new(node(), 4, "policy")
            .priority(6000)
            .matches(FlowMatch::new().with_eth_type(0x0800).with_register(0, 3))
            .instruction(Instruction::GotoTable(5))
            .build();
        let json = serde_json::to_string(&flow).unwrap();
        let back: Flow = serde_json::from_str(&json).unwrap();
        assert_eq!(back, flow);
    }

    #[test]
    fn test_port_range_encoding() {
        let m = FlowMatch::new()
            .with_ip_proto(6)
            .with_l4_dst(PortMatch::Range(8000, 8080));
        assert_eq!(m.canonical(), "ip_proto=6,tp_dst=8000-8080");
    }
}
