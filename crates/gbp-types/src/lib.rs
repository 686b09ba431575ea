//! Common types for group-based policy resolution and rendering.
//!
//! This crate provides the type-safe primitives shared by the policy model
//! and the flow renderer:
//!
//! - Typed string identifiers for every declared policy object
//!   ([`TenantId`], [`EndpointGroupId`], [`ContractId`], ...)
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`IpPrefix`]: IP network prefixes (CIDR notation)
//! - [`VlanId`]: IEEE 802.1Q VLAN identifiers used for flood-domain
//!   segmentation

mod id;
mod ip;
mod mac;
mod vlan;

pub use id::{
    ActionName, ClassifierName, ConditionName, ConnectorId, ContractId, EndpointGroupId,
    NetworkDomainId, NodeId, RuleName, SubjectName, TenantId,
};
pub use ip::IpPrefix;
pub use mac::MacAddress;
pub use vlan::VlanId;

/// Well-known ether-type values matched by classifiers and port-security
/// flows.
pub mod ethertype {
    /// Address Resolution Protocol.
    pub const ARP: u16 = 0x0806;
    /// Internet Protocol version 4.
    pub const IPV4: u16 = 0x0800;
    /// Internet Protocol version 6.
    pub const IPV6: u16 = 0x86dd;
    /// IEEE 802.1Q VLAN tag.
    pub const VLAN: u16 = 0x8100;

    /// Returns true if `value` is an ether type a classifier may name.
    pub fn is_supported(value: u16) -> bool {
        matches!(value, ARP | IPV4 | IPV6)
    }
}

/// Common error type for parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("invalid IP prefix format: {0}")]
    InvalidIpPrefix(String),

    #[error("invalid VLAN ID: {0} (must be 1-4094)")]
    InvalidVlanId(u16),
}
