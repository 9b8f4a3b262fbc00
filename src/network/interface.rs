use std::net::IpAddr;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::{network::mac::MacAddress, topology::neighbors::LinkLayerProtocol};

/// Link recorded on an interface by a previous topology poll.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub node_id: u32,
    pub interface_id: u32,
    pub protocol: LinkLayerProtocol,
    /// Set when the link was learned from the remote side's poll and not yet
    /// confirmed by polling this interface's own node.
    pub reflection: bool,
}

impl PeerInfo {
    pub fn is_set(&self) -> bool {
        self.node_id != 0
    }
}

/// One network interface of a node.
///
/// Addressing attributes are fixed at creation; only the peer record changes
/// after that, under the interface's own lock.
#[derive(Debug)]
pub struct Interface {
    id: u32,
    node_id: u32,
    name: String,
    if_index: u32,
    slot: u32,
    port: u32,
    bridge_port: u32,
    mac: MacAddress,
    addresses: Vec<IpAddr>,
    peer: Mutex<PeerInfo>,
}

impl Interface {
    pub fn new(id: u32, node_id: u32, name: &str, if_index: u32) -> Self {
        Self {
            id,
            node_id,
            name: name.to_string(),
            if_index,
            slot: 0,
            port: 0,
            bridge_port: 0,
            mac: MacAddress::ZERO,
            addresses: Vec::new(),
            peer: Mutex::new(PeerInfo::default()),
        }
    }

    pub fn with_slot_port(mut self, slot: u32, port: u32) -> Self {
        self.slot = slot;
        self.port = port;
        self
    }

    pub fn with_bridge_port(mut self, bridge_port: u32) -> Self {
        self.bridge_port = bridge_port;
        self
    }

    pub fn with_mac(mut self, mac: MacAddress) -> Self {
        self.mac = mac;
        self
    }

    pub fn with_addresses(mut self, addresses: Vec<IpAddr>) -> Self {
        self.addresses = addresses;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    /// Object id of the owning node.
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn if_index(&self) -> u32 {
        self.if_index
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn port(&self) -> u32 {
        self.port
    }

    pub fn bridge_port(&self) -> u32 {
        self.bridge_port
    }

    pub fn mac(&self) -> MacAddress {
        self.mac
    }

    pub fn addresses(&self) -> &[IpAddr] {
        &self.addresses
    }

    pub fn peer(&self) -> PeerInfo {
        *self.peer.lock()
    }

    /// Records `node_id`/`interface_id` as the peer. Re-setting the same peer from
    /// the interface's own node confirms a reflected link.
    pub fn set_peer(&self, node_id: u32, interface_id: u32, protocol: LinkLayerProtocol, reflection: bool) {
        let mut peer = self.peer.lock();
        if peer.node_id == node_id && peer.interface_id == interface_id && peer.protocol == protocol {
            if peer.reflection && !reflection {
                peer.reflection = false;
            }
            return;
        }
        *peer = PeerInfo {
            node_id,
            interface_id,
            protocol,
            reflection,
        };
    }

    pub fn clear_peer(&self) {
        *self.peer.lock() = PeerInfo::default();
    }
}
