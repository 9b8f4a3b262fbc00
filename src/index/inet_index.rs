use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    sync::Arc,
};

use super::hash_index::HashIndex;
use crate::network::mac::MacAddress;

/// Index keyed by 32-bit object id.
pub type ObjectIndex<V> = HashIndex<u32, V>;

/// Index keyed by a 6-byte hardware address.
pub type MacAddressIndex<V> = HashIndex<MacAddress, V>;

const FAMILY_V4: u8 = 4;
const FAMILY_V6: u8 = 6;

/// Fixed 18-byte address key: family, a reserved zero byte, then 16 address
/// bytes with IPv4 addresses left-aligned and zero padded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InetAddressKey([u8; 18]);

impl InetAddressKey {
    pub fn as_bytes(&self) -> &[u8; 18] {
        &self.0
    }

    pub fn address(&self) -> IpAddr {
        let bytes = &self.0[2..];
        if self.0[0] == FAMILY_V4 {
            IpAddr::V4(Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]))
        } else {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            IpAddr::V6(Ipv6Addr::from(octets))
        }
    }
}

impl From<IpAddr> for InetAddressKey {
    fn from(address: IpAddr) -> Self {
        let mut key = [0u8; 18];
        match address {
            IpAddr::V4(v4) => {
                key[0] = FAMILY_V4;
                key[2..6].copy_from_slice(&v4.octets());
            }
            IpAddr::V6(v6) => {
                key[0] = FAMILY_V6;
                key[2..18].copy_from_slice(&v6.octets());
            }
        }
        Self(key)
    }
}

/// Address to object index. One object may be registered under several addresses.
pub struct InetAddressIndex<V: ?Sized> {
    inner: HashIndex<InetAddressKey, V>,
}

impl<V: ?Sized> Default for InetAddressIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: ?Sized> InetAddressIndex<V> {
    pub fn new() -> Self {
        Self {
            inner: HashIndex::new(),
        }
    }

    pub fn put(&self, address: IpAddr, object: Arc<V>) -> bool {
        self.inner.put(address.into(), object)
    }

    /// Registers `object` under every address in `addresses`; true if any key was replaced.
    pub fn put_list(&self, addresses: &[IpAddr], object: &Arc<V>) -> bool {
        addresses
            .iter()
            .fold(false, |replaced, addr| self.put(*addr, Arc::clone(object)) | replaced)
    }

    pub fn remove(&self, address: IpAddr) {
        self.inner.remove(&address.into());
    }

    pub fn remove_list(&self, addresses: &[IpAddr]) {
        for addr in addresses {
            self.remove(*addr);
        }
    }

    pub fn get(&self, address: IpAddr) -> Option<Arc<V>> {
        self.inner.get(&address.into())
    }

    pub fn find(&self, predicate: impl FnMut(&V) -> bool) -> Option<Arc<V>> {
        self.inner.find(predicate)
    }

    pub fn size(&self) -> usize {
        self.inner.size()
    }

    pub fn get_objects(&self, filter: impl FnMut(&V) -> bool) -> Vec<Arc<V>> {
        self.inner.get_objects(filter)
    }

    pub fn for_each(&self, mut callback: impl FnMut(IpAddr, &Arc<V>)) {
        self.inner.for_each(|key, object| callback(key.address(), object));
    }
}
