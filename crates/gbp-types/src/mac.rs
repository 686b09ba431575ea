//! MAC address type with safe parsing and formatting.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 48-bit Ethernet MAC address.
///
/// Parsed from the colon-separated hex form used throughout endpoint
/// registrations, and always formatted back in lower case so flow matches
/// built from the same endpoint are byte-identical.
///
/// # Examples
///
/// ```
/// use gbp_types::MacAddress;
///
/// let mac: MacAddress = "00:16:3E:AA:BB:CC".parse().unwrap();
/// assert_eq!(mac.to_string(), "00:16:3e:aa:bb:cc");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// The broadcast address (ff:ff:ff:ff:ff:ff).
    pub const BROADCAST: MacAddress = MacAddress([0xff; 6]);

    /// Creates a MAC address from raw bytes.
    pub const fn new(octets: [u8; 6]) -> Self {
        MacAddress(octets)
    }

    /// Returns the raw bytes.
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Returns true if the group bit of the first octet is set.
    pub const fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }

    /// Returns true for a plain unicast address.
    pub const fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for MacAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| ParseError::InvalidMacAddress(s.to_string()))?;
            if part.len() != 2 {
                return Err(ParseError::InvalidMacAddress(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16)
                .map_err(|_| ParseError::InvalidMacAddress(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(ParseError::InvalidMacAddress(s.to_string()));
        }
        Ok(MacAddress(octets))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = ParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let mac: MacAddress = "00:16:3e:01:02:03".parse().unwrap();
        assert_eq!(mac.octets(), [0x00, 0x16, 0x3e, 0x01, 0x02, 0x03]);
        assert_eq!(mac.to_string(), "00:16:3e:01:02:03");
    }

    #[test]
    fn test_parse_uppercase_canonicalized() {
        let mac: MacAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(mac.to_string(), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!("00:16:3e:01:02".parse::<MacAddress>().is_err());
        assert!("00:16:3e:01:02:03:04".parse::<MacAddress>().is_err());
        assert!("00:16:3e:01:02:zz".parse::<MacAddress>().is_err());
        assert!("0016.3e01.0203".parse::<MacAddress>().is_err());
    }

    #[test]
    fn test_multicast() {
        assert!(MacAddress::BROADCAST.is_multicast());
        let mac: MacAddress = "01:00:5e:00:00:01".parse().unwrap();
        assert!(mac.is_multicast());
        let mac: MacAddress = "00:16:3e:00:00:01".parse().unwrap();
        assert!(mac.is_unicast());
    }
}
