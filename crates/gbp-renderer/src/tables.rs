//! Pipeline table layout, register assignments and priority bands.

/// Table 0: ingress source validation.
pub const PORT_SECURITY: u8 = 0;
/// Table 1: ingress NAT (owned by an external renderer stage).
pub const INGRESS_NAT: u8 = 1;
/// Table 2: source identity mapping.
pub const SOURCE_MAPPER: u8 = 2;
/// Table 3: destination mapping.
pub const DESTINATION_MAPPER: u8 = 3;
/// Table 4: contract-rule enforcement.
pub const POLICY_ENFORCER: u8 = 4;
/// Table 5: egress NAT.
pub const EGRESS_NAT: u8 = 5;
/// Table 6: external output mapping.
pub const EXTERNAL_MAPPER: u8 = 6;

/// Registers standing in for the full endpoint identity so hardware match
/// width stays bounded.
pub mod reg {
    /// Source endpoint-group ordinal.
    pub const SRC_EPG: u8 = 0;
    /// Source condition-group ordinal.
    pub const SRC_CONDITION_GROUP: u8 = 1;
    /// Destination endpoint-group ordinal.
    pub const DST_EPG: u8 = 2;
    /// Destination condition-group ordinal.
    pub const DST_CONDITION_GROUP: u8 = 3;
}

/// Port-security priority bands, most specific highest. The per-ether-type
/// drops sit below every allow so recognized traffic that matched no allow
/// is dropped explicitly instead of falling through to drop-all.
pub mod port_security_priority {
    pub const DROP_ALL: u16 = 1;
    pub const DROP_ARP: u16 = 110;
    pub const DROP_IPV4: u16 = 111;
    pub const DROP_IPV6: u16 = 112;
    pub const ALLOW_L2: u16 = 140;
    pub const ALLOW_L3: u16 = 150;
    pub const ALLOW_DHCP: u16 = 150;
    pub const EXTERNAL_UNTAGGED: u16 = 190;
    pub const EXTERNAL_VLAN_POP: u16 = 200;
    pub const ALLOW_TUNNEL: u16 = 300;
}

/// Policy-enforcer priority bands.
pub mod enforcer_priority {
    /// Unconditional same-group allow, above every contract rule.
    pub const SAME_GROUP: u16 = 65000;
    /// Base priority for contract rules; each successive rule in the
    /// sorted order gets the next lower priority.
    pub const RULE_BASE: u16 = 6000;
}
