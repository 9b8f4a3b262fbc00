use std::{
    fmt::Display,
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    str::FromStr,
};

use async_trait::async_trait;
use snmp2::Value;
use thiserror::Error;

/// Owned SNMP object identifier.
///
/// `snmp2::Oid` borrows from the response buffer, so everything that leaves the
/// transport is converted into this type first. Ordering is lexicographic by
/// sub-identifier, which is the order GETNEXT walks a MIB.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjectId(Vec<u32>);

impl ObjectId {
    pub fn new(components: &[u32]) -> Self {
        Self(components.to_vec())
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, position: usize) -> Option<u32> {
        self.0.get(position).copied()
    }

    /// True if `self` lies inside the subtree rooted at `root` (and is not `root` itself).
    pub fn is_under(&self, root: &ObjectId) -> bool {
        self.0.len() > root.0.len() && self.0.starts_with(&root.0)
    }

    /// Sub-identifiers following `prefix_len` leading components.
    pub fn suffix(&self, prefix_len: usize) -> &[u32] {
        self.0.get(prefix_len..).unwrap_or(&[])
    }

    /// Copy of this OID with the sub-identifier at `position` replaced.
    /// Used to address a sibling column of the same table row.
    pub fn with_component(&self, position: usize, value: u32) -> Option<Self> {
        let mut components = self.0.clone();
        *components.get_mut(position)? = value;
        Some(Self(components))
    }

    pub fn child(&self, tail: &[u32]) -> Self {
        let mut components = self.0.clone();
        components.extend_from_slice(tail);
        Self(components)
    }

    pub(crate) fn to_snmp2(&self) -> Result<snmp2::Oid<'static>, SnmpError> {
        let components: Vec<u64> = self.0.iter().map(|c| u64::from(*c)).collect();
        snmp2::Oid::from(&components).map_err(|_| SnmpError::BadOid(self.to_string()))
    }

    pub(crate) fn from_snmp2(oid: &snmp2::Oid<'_>) -> Result<Self, SnmpError> {
        let components = oid
            .iter()
            .ok_or_else(|| SnmpError::Parse(format!("OID {oid} has components wider than 64 bits")))?
            .map(|c| u32::try_from(c).map_err(|_| SnmpError::Parse(format!("OID component {c} out of range"))))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(components))
    }
}

impl From<&[u32]> for ObjectId {
    fn from(components: &[u32]) -> Self {
        Self::new(components)
    }
}

impl From<Vec<u32>> for ObjectId {
    fn from(components: Vec<u32>) -> Self {
        Self(components)
    }
}

impl FromStr for ObjectId {
    type Err = SnmpError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().trim_start_matches('.');
        if trimmed.is_empty() {
            return Err(SnmpError::BadOid(s.to_string()));
        }
        trimmed
            .split('.')
            .map(|part| part.parse::<u32>().map_err(|_| SnmpError::BadOid(s.to_string())))
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

impl Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for component in &self.0 {
            write!(f, ".{component}")?;
        }
        Ok(())
    }
}

/// Replacement for the snmp2::Value type due to lifetime shenanigans
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnmpValue {
    Integer(i64),
    IpAddress(Ipv4Addr),
    OctetString(Vec<u8>),
    ObjectIdentifier(ObjectId),
    Counter32(u32),
    Counter64(u64),
    Timeticks(u32),
    Boolean(bool),
    Unsigned32(u32),
    Null,

    // Exception values returned in place of a variable (SNMPv2)
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,

    // Fallback
    Unknown,
}

impl SnmpValue {
    /// True for the SNMPv2 exception values that carry no data.
    pub fn is_exception(&self) -> bool {
        matches!(
            self,
            SnmpValue::NoSuchObject | SnmpValue::NoSuchInstance | SnmpValue::EndOfMibView
        )
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            SnmpValue::Integer(i) => u32::try_from(*i).ok(),
            SnmpValue::Counter32(v) | SnmpValue::Unsigned32(v) | SnmpValue::Timeticks(v) => Some(*v),
            SnmpValue::Counter64(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SnmpValue::Integer(i) => Some(*i),
            SnmpValue::Counter32(v) | SnmpValue::Unsigned32(v) | SnmpValue::Timeticks(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Raw bytes of an octet string.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            SnmpValue::OctetString(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Printable rendering of an octet string with trailing NULs and whitespace stripped.
    pub fn as_string(&self) -> Option<String> {
        match self {
            SnmpValue::OctetString(bytes) => Some(
                String::from_utf8_lossy(bytes)
                    .trim_end_matches(['\0', ' ', '\r', '\n'])
                    .to_string(),
            ),
            SnmpValue::Integer(i) => Some(i.to_string()),
            SnmpValue::IpAddress(ip) => Some(ip.to_string()),
            _ => None,
        }
    }

    /// Interprets the value as an IP address: either the `IpAddress` type or a
    /// 4/16 byte octet string (the encoding used by CDP and LLDP tables).
    pub fn as_ip_address(&self) -> Option<IpAddr> {
        match self {
            SnmpValue::IpAddress(ip) => Some(IpAddr::V4(*ip)),
            SnmpValue::OctetString(bytes) => ip_from_octets(bytes),
            _ => None,
        }
    }
}

pub(crate) fn ip_from_octets(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

impl From<&Value<'_>> for SnmpValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Integer(i) => SnmpValue::Integer(*i),
            Value::IpAddress(ip) => SnmpValue::IpAddress(Ipv4Addr::from(*ip)),
            Value::OctetString(s) => SnmpValue::OctetString(s.to_vec()),
            Value::ObjectIdentifier(oid) => match ObjectId::from_snmp2(oid) {
                Ok(oid) => SnmpValue::ObjectIdentifier(oid),
                Err(_) => SnmpValue::Unknown,
            },
            Value::Counter32(c) => SnmpValue::Counter32(*c),
            Value::Counter64(c) => SnmpValue::Counter64(*c),
            Value::Timeticks(t) => SnmpValue::Timeticks(*t),
            Value::Boolean(b) => SnmpValue::Boolean(*b),
            Value::Unsigned32(u) => SnmpValue::Unsigned32(*u),
            Value::Null => SnmpValue::Null,
            Value::NoSuchObject => SnmpValue::NoSuchObject,
            Value::NoSuchInstance => SnmpValue::NoSuchInstance,
            Value::EndOfMibView => SnmpValue::EndOfMibView,
            _ => SnmpValue::Unknown,
        }
    }
}

/// One variable binding from a response PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnmpVariable {
    pub oid: ObjectId,
    pub value: SnmpValue,
}

impl SnmpVariable {
    pub fn new(oid: ObjectId, value: SnmpValue) -> Self {
        Self { oid, value }
    }
}

/// PDU-level error status meaning "no such name" in SNMPv1.
pub const PDU_ERR_NO_SUCH_NAME: u32 = 2;

/// SNMP failure taxonomy. Success is `Ok`, everything else maps to one of the
/// classic numeric status codes through [`SnmpError::code`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnmpError {
    #[error("request timeout")]
    Timeout,
    #[error("invalid parameters: {0}")]
    Param(String),
    #[error("unable to create socket: {0}")]
    Socket(String),
    #[error("send/receive error: {0}")]
    Comm(String),
    #[error("error parsing PDU: {0}")]
    Parse(String),
    #[error("object does not exist on agent: {0}")]
    NoObject(ObjectId),
    #[error("invalid object id: {0}")]
    BadOid(String),
    #[error("agent returned error status {status} (index {index})")]
    Agent { status: u32, index: u32 },
    #[error("SNMPv3 security parameters missing")]
    NoV3Security,
    #[error("malformed or unexpected response: {0}")]
    BadResponse(String),
}

impl SnmpError {
    /// Numeric status using the NetXMS `SNMP_ERR_*` values.
    pub fn code(&self) -> u32 {
        match self {
            SnmpError::Timeout => 1,
            SnmpError::Param(_) => 2,
            SnmpError::Socket(_) => 3,
            SnmpError::Comm(_) => 4,
            SnmpError::Parse(_) => 5,
            SnmpError::NoObject(_) => 6,
            SnmpError::BadOid(_) => 8,
            SnmpError::Agent { .. } => 9,
            SnmpError::NoV3Security => 14,
            SnmpError::BadResponse(_) => 20,
        }
    }

    /// Only timeouts are worth repeating; everything else is a definitive answer.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SnmpError::Timeout)
    }
}

pub type SnmpResult<T> = Result<T, SnmpError>;

/// Request/response access to one SNMP agent.
///
/// Each call is a single PDU exchange bounded by the transport's own timeout;
/// retry policy lives in the walker. Implementations must be shareable
/// between the walker and the resolver that issues supplementary requests.
#[async_trait]
pub trait SnmpTransport: Send + Sync {
    /// GET for every OID, results in request order.
    async fn get(&self, oids: &[ObjectId]) -> SnmpResult<Vec<SnmpVariable>>;

    async fn get_next(&self, oid: &ObjectId) -> SnmpResult<SnmpVariable>;

    async fn get_bulk(&self, oid: &ObjectId, max_repetitions: u32) -> SnmpResult<Vec<SnmpVariable>>;

    /// False for SNMPv1 agents, which have no GETBULK.
    fn supports_bulk(&self) -> bool;

    /// Human readable peer description for logging.
    fn peer(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_prints_dotted_oids() {
        let oid: ObjectId = ".1.3.6.1.2.1.17.2.15.1.3".parse().unwrap();
        assert_eq!(oid.len(), 11);
        assert_eq!(oid.to_string(), ".1.3.6.1.2.1.17.2.15.1.3");
        assert_eq!("1.3.6".parse::<ObjectId>().unwrap(), ObjectId::new(&[1, 3, 6]));
        assert!("1.3.x".parse::<ObjectId>().is_err());
        assert!("".parse::<ObjectId>().is_err());
    }

    #[test]
    fn subtree_membership_excludes_root_and_siblings() {
        let root = ObjectId::new(&[1, 3, 6, 1, 2]);
        assert!(ObjectId::new(&[1, 3, 6, 1, 2, 7]).is_under(&root));
        assert!(!root.is_under(&root));
        assert!(!ObjectId::new(&[1, 3, 6, 1, 3, 1]).is_under(&root));
        assert!(!ObjectId::new(&[1, 3, 6, 1]).is_under(&root));
    }

    #[test]
    fn ordering_follows_getnext_order() {
        let a = ObjectId::new(&[1, 3, 6, 1, 2]);
        let b = ObjectId::new(&[1, 3, 6, 1, 2, 0]);
        let c = ObjectId::new(&[1, 3, 6, 1, 10]);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn sibling_column_addressing() {
        let row = ObjectId::new(&[1, 3, 6, 1, 4, 1, 9, 9, 23, 1, 2, 1, 1, 4, 5, 1]);
        let port = row.with_component(13, 7).unwrap();
        assert_eq!(port.components()[13], 7);
        assert_eq!(port.suffix(14), &[5, 1]);
        assert!(row.with_component(40, 1).is_none());
    }

    #[test]
    fn ip_address_from_octet_strings() {
        let v4 = SnmpValue::OctetString(vec![192, 0, 2, 10]);
        assert_eq!(v4.as_ip_address(), Some("192.0.2.10".parse().unwrap()));
        let bad = SnmpValue::OctetString(vec![1, 2, 3]);
        assert_eq!(bad.as_ip_address(), None);
        assert_eq!(
            SnmpValue::OctetString(b"Gi0/2\0".to_vec()).as_string().as_deref(),
            Some("Gi0/2")
        );
    }

    #[test]
    fn error_codes_match_classic_status_values() {
        assert_eq!(SnmpError::Timeout.code(), 1);
        assert_eq!(SnmpError::BadResponse(String::new()).code(), 20);
        assert!(SnmpError::Timeout.is_retryable());
        assert!(!SnmpError::Comm("x".into()).is_retryable());
    }
}
