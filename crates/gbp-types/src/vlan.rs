//! VLAN identifier used for flood-domain segmentation.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// An IEEE 802.1Q VLAN identifier (1-4094).
///
/// Flood domains may carry a segmentation id; external-port VLAN-pop flows
/// match on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct VlanId(u16);

impl VlanId {
    /// Creates a VLAN id, rejecting reserved values (0 and 4095).
    pub fn new(id: u16) -> Result<Self, ParseError> {
        if id == 0 || id > 4094 {
            return Err(ParseError::InvalidVlanId(id));
        }
        Ok(VlanId(id))
    }

    /// Returns the raw 12-bit value.
    pub const fn value(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for VlanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for VlanId {
    type Error = ParseError;

    fn try_from(id: u16) -> Result<Self, Self::Error> {
        VlanId::new(id)
    }
}

impl From<VlanId> for u16 {
    fn from(id: VlanId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_range() {
        assert!(VlanId::new(1).is_ok());
        assert!(VlanId::new(4094).is_ok());
        assert_eq!(VlanId::new(100).unwrap().value(), 100);
    }

    #[test]
    fn test_reserved_values_rejected() {
        assert_eq!(VlanId::new(0), Err(ParseError::InvalidVlanId(0)));
        assert_eq!(VlanId::new(4095), Err(ParseError::InvalidVlanId(4095)));
        assert!(VlanId::new(u16::MAX).is_err());
    }
}
