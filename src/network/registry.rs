use std::{collections::HashMap, net::IpAddr, sync::Arc};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    index::{InetAddressIndex, MacAddressIndex, ObjectIndex},
    network::{
        interface::Interface,
        mac::{BridgeId, MacAddress},
        node::Node,
    },
};

/// Shared object indexes consulted by every topology poller.
///
/// Lookups go through the lock-free indexes; only the per-zone index table
/// itself is behind a lock, and that is written once per new zone.
#[derive(Default)]
pub struct ObjectRegistry {
    nodes: ObjectIndex<Node>,
    interfaces: ObjectIndex<Interface>,
    zones: RwLock<HashMap<u32, Arc<InetAddressIndex<Node>>>>,
    interfaces_by_mac: MacAddressIndex<Interface>,
    nodes_by_bridge: MacAddressIndex<Node>,
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn zone_index(&self, zone_uin: u32) -> Option<Arc<InetAddressIndex<Node>>> {
        self.zones.read().get(&zone_uin).cloned()
    }

    fn zone_index_or_create(&self, zone_uin: u32) -> Arc<InetAddressIndex<Node>> {
        if let Some(index) = self.zone_index(zone_uin) {
            return index;
        }
        Arc::clone(self.zones.write().entry(zone_uin).or_default())
    }

    /// Indexes `node` and all of its interfaces. Returns true if the node id was already known.
    pub fn register_node(&self, node: Arc<Node>) -> bool {
        let replaced = self.nodes.put(node.id(), Arc::clone(&node));
        self.zone_index_or_create(node.zone_uin()).put_list(&node.addresses(), &node);
        if !node.bridge_address().is_zero() {
            self.nodes_by_bridge.put(node.bridge_address(), Arc::clone(&node));
        }
        for iface in node.interfaces() {
            self.register_interface(iface);
        }
        debug!(target: "topology::registry", node = %node, replaced, "node registered");
        replaced
    }

    pub fn register_interface(&self, interface: Arc<Interface>) {
        if !interface.mac().is_zero() {
            self.interfaces_by_mac.put(interface.mac(), Arc::clone(&interface));
        }
        self.interfaces.put(interface.id(), interface);
    }

    pub fn unregister_node(&self, node: &Node) {
        self.nodes.remove(&node.id());
        if let Some(index) = self.zone_index(node.zone_uin()) {
            index.remove_list(&node.addresses());
        }
        if !node.bridge_address().is_zero() {
            self.nodes_by_bridge.remove(&node.bridge_address());
        }
        for iface in node.interfaces() {
            self.interfaces.remove(&iface.id());
            if !iface.mac().is_zero() {
                self.interfaces_by_mac.remove(&iface.mac());
            }
        }
    }

    pub fn find_node_by_id(&self, id: u32) -> Option<Arc<Node>> {
        self.nodes.get(&id)
    }

    pub fn find_interface_by_id(&self, id: u32) -> Option<Arc<Interface>> {
        self.interfaces.get(&id)
    }

    /// Node owning `address` within zone `zone_uin`.
    pub fn find_node_by_ip(&self, zone_uin: u32, address: IpAddr) -> Option<Arc<Node>> {
        self.zone_index(zone_uin)?.get(address)
    }

    pub fn find_interface_by_mac(&self, mac: MacAddress) -> Option<Arc<Interface>> {
        if mac.is_zero() {
            return None;
        }
        self.interfaces_by_mac.get(&mac)
    }

    /// Node owning an interface with hardware address `mac`.
    pub fn find_node_by_mac(&self, mac: MacAddress) -> Option<Arc<Node>> {
        let iface = self.find_interface_by_mac(mac)?;
        self.find_node_by_id(iface.node_id())
    }

    /// Node whose bridge base address matches `bridge`.
    pub fn find_node_by_bridge_id(&self, bridge: &BridgeId) -> Option<Arc<Node>> {
        if bridge.is_zero() {
            return None;
        }
        self.nodes_by_bridge.get(&bridge.mac)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.size()
    }

    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.get_objects(|_| true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn router(id: u32, zone: u32, ip: &str, mac: &str) -> Arc<Node> {
        let node = Node::new(id, &format!("r{id}"))
            .with_zone(zone)
            .with_primary_ip(ip.parse().unwrap());
        node.add_interface(
            Interface::new(id + 1, id, "eth0", 1)
                .with_mac(mac.parse().unwrap())
                .with_addresses(vec![ip.parse().unwrap(), "198.51.100.1".parse().unwrap()]),
        );
        Arc::new(node)
    }

    #[test]
    fn addresses_are_scoped_by_zone() {
        let registry = ObjectRegistry::new();
        registry.register_node(router(100, 0, "192.0.2.10", "00:00:00:00:01:00"));
        registry.register_node(router(200, 7, "192.0.2.10", "00:00:00:00:02:00"));

        let ip: IpAddr = "192.0.2.10".parse().unwrap();
        assert_eq!(registry.find_node_by_ip(0, ip).unwrap().id(), 100);
        assert_eq!(registry.find_node_by_ip(7, ip).unwrap().id(), 200);
        assert!(registry.find_node_by_ip(3, ip).is_none());
        assert_eq!(registry.node_count(), 2);
    }

    #[test]
    fn mac_and_interface_lookups() {
        let registry = ObjectRegistry::new();
        registry.register_node(router(100, 0, "192.0.2.10", "00:00:00:00:01:00"));
        let mac: MacAddress = "00:00:00:00:01:00".parse().unwrap();
        assert_eq!(registry.find_interface_by_mac(mac).unwrap().id(), 101);
        assert_eq!(registry.find_node_by_mac(mac).unwrap().id(), 100);
        assert_eq!(registry.find_interface_by_id(101).unwrap().name(), "eth0");
        assert!(registry.find_interface_by_mac(MacAddress::ZERO).is_none());
    }

    #[test]
    fn bridge_lookup_and_unregister() {
        let registry = ObjectRegistry::new();
        let bridge_mac: MacAddress = "00:1a:2b:3c:4d:5e".parse().unwrap();
        let node = Arc::new(
            Node::new(300, "sw")
                .with_primary_ip("10.0.0.3".parse().unwrap())
                .with_bridge_address(bridge_mac),
        );
        registry.register_node(Arc::clone(&node));
        let id = BridgeId {
            priority: 0x8000,
            mac: bridge_mac,
        };
        assert_eq!(registry.find_node_by_bridge_id(&id).unwrap().id(), 300);

        registry.unregister_node(&node);
        registry.unregister_node(&node);
        assert!(registry.find_node_by_bridge_id(&id).is_none());
        assert!(registry.find_node_by_ip(0, "10.0.0.3".parse().unwrap()).is_none());
        assert!(registry.find_node_by_id(300).is_none());
        // the caller's reference outlives the index entries
        assert_eq!(node.id(), 300);
    }
}
