use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// 48-bit hardware address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub const ZERO: MacAddress = MacAddress([0; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Builds an address from the first six bytes of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let octets: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        Some(Self(octets))
    }

    /// Builds an address from six OID sub-identifiers, as found in table indexes.
    pub fn from_oid_components(components: &[u32]) -> Option<Self> {
        if components.len() != 6 {
            return None;
        }
        let mut bytes = [0u8; 6];
        for (byte, component) in bytes.iter_mut().zip(components) {
            *byte = u8::try_from(*component).ok()?;
        }
        Some(Self(bytes))
    }

    pub const fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    /// All-zero address, used by agents to mean "unknown".
    pub fn is_zero(&self) -> bool {
        self.0 == [0; 6]
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    /// Accepts `:`/`-` separated pairs or twelve plain hex digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s.chars().filter(|c| !matches!(c, ':' | '-' | '.')).collect();
        if digits.len() != 12 {
            return Err(Error::InvalidMacAddress(s.to_string()));
        }
        let bytes = hex::decode(&digits).map_err(|_| Error::InvalidMacAddress(s.to_string()))?;
        Self::from_slice(&bytes).ok_or_else(|| Error::InvalidMacAddress(s.to_string()))
    }
}

impl TryFrom<String> for MacAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> String {
        mac.to_string()
    }
}

impl From<[u8; 6]> for MacAddress {
    fn from(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }
}

/// 802.1D bridge identifier: 2-byte priority followed by the bridge MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BridgeId {
    pub priority: u16,
    pub mac: MacAddress,
}

impl BridgeId {
    /// Decodes the 8-byte octet string used by `dot1dStpPortDesignatedBridge`.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 {
            return None;
        }
        Some(Self {
            priority: u16::from_be_bytes([bytes[0], bytes[1]]),
            mac: MacAddress::from_slice(&bytes[2..8])?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.mac.is_zero()
    }
}

impl fmt::Display for BridgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}.{}", self.priority, self.mac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_formats() {
        let mac: MacAddress = "00:1a:2b:3c:4d:5e".parse().unwrap();
        assert_eq!(mac.as_bytes(), &[0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
        assert_eq!("00-1A-2B-3C-4D-5E".parse::<MacAddress>().unwrap(), mac);
        assert_eq!("001a2b3c4d5e".parse::<MacAddress>().unwrap(), mac);
        assert_eq!(mac.to_string(), "00:1a:2b:3c:4d:5e");
        assert!("00:1a:2b".parse::<MacAddress>().is_err());
        assert!("zz:1a:2b:3c:4d:5e".parse::<MacAddress>().is_err());
        assert_eq!(MacAddress::from_oid_components(&[0, 26, 43, 60, 77, 94]), Some(mac));
        assert_eq!(MacAddress::from_oid_components(&[0, 26, 43, 60, 77, 300]), None);
    }

    #[test]
    fn bridge_id_from_designated_bridge() {
        let id = BridgeId::from_bytes(&[0x80, 0x00, 0, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]).unwrap();
        assert_eq!(id.priority, 0x8000);
        assert_eq!(id.mac.to_string(), "00:1a:2b:3c:4d:5e");
        assert!(!id.is_zero());
        assert!(BridgeId::from_bytes(&[0; 8]).unwrap().is_zero());
        assert!(BridgeId::from_bytes(&[0; 7]).is_none());
    }
}
