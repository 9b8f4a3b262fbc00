use std::{
    fmt,
    net::IpAddr,
    ops::BitOr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::{
    data_aquisition::{ObjectId, SnmpError, SnmpResult, SnmpTransport, SnmpVariable, WalkControl, WalkOptions, snmp_walk},
    error::Error,
    network::{interface::Interface, mac::MacAddress},
    topology::neighbors::LinkLayerNeighbors,
};

/// Node capability flags, numerically compatible with the `NC_*` node flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const SNMP: Capabilities = Capabilities(0x0000_0001);
    pub const BRIDGE: Capabilities = Capabilities(0x0000_0004);
    pub const ROUTER: Capabilities = Capabilities(0x0000_0008);
    pub const CDP: Capabilities = Capabilities(0x0000_0100);
    pub const NDP: Capabilities = Capabilities(0x0000_0200);
    pub const LLDP: Capabilities = Capabilities(0x0000_0400);
    pub const STP: Capabilities = Capabilities(0x0000_4000);

    const NAMES: [(&'static str, Capabilities); 7] = [
        ("snmp", Self::SNMP),
        ("bridge", Self::BRIDGE),
        ("router", Self::ROUTER),
        ("cdp", Self::CDP),
        ("ndp", Self::NDP),
        ("lldp", Self::LLDP),
        ("stp", Self::STP),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(&self) -> u32 {
        self.0
    }

    pub const fn contains(&self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    /// Parses flag names such as `"cdp"` or `"stp"`; `"sonmp"` is accepted for NDP.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, Error> {
        names.iter().try_fold(Self::NONE, |acc, name| {
            let name = name.as_ref().to_ascii_lowercase();
            let name = if name == "sonmp" { "ndp".to_string() } else { name };
            Self::NAMES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, flag)| acc | *flag)
                .ok_or_else(|| Error::Inventory(format!("unknown node capability `{name}`")))
        })
    }

    pub fn names(&self) -> Vec<String> {
        Self::NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(n, _)| n.to_string())
            .collect()
    }
}

impl BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Self) -> Self::Output {
        Capabilities(self.0 | rhs.0)
    }
}

impl TryFrom<Vec<String>> for Capabilities {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::from_names(&names)
    }
}

impl From<Capabilities> for Vec<String> {
    fn from(caps: Capabilities) -> Self {
        caps.names()
    }
}

/// Managed device: identity, capabilities, SNMP transport and interfaces.
pub struct Node {
    id: u32,
    name: String,
    zone_uin: u32,
    capabilities: Capabilities,
    primary_ip: Option<IpAddr>,
    bridge_address: MacAddress,
    transport: Option<Arc<dyn SnmpTransport>>,
    interfaces: RwLock<Vec<Arc<Interface>>>,
    link_layer_neighbors: Mutex<Option<Arc<LinkLayerNeighbors>>>,
    down: AtomicBool,
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("zone_uin", &self.zone_uin)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.name, self.id)
    }
}

impl Node {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            zone_uin: 0,
            capabilities: Capabilities::NONE,
            primary_ip: None,
            bridge_address: MacAddress::ZERO,
            transport: None,
            interfaces: RwLock::new(Vec::new()),
            link_layer_neighbors: Mutex::new(None),
            down: AtomicBool::new(false),
        }
    }

    pub fn with_zone(mut self, zone_uin: u32) -> Self {
        self.zone_uin = zone_uin;
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_primary_ip(mut self, address: IpAddr) -> Self {
        self.primary_ip = Some(address);
        self
    }

    /// Base MAC address of the bridge, as advertised in STP bridge identifiers.
    pub fn with_bridge_address(mut self, mac: MacAddress) -> Self {
        self.bridge_address = mac;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn SnmpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn zone_uin(&self) -> u32 {
        self.zone_uin
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn primary_ip(&self) -> Option<IpAddr> {
        self.primary_ip
    }

    pub fn bridge_address(&self) -> MacAddress {
        self.bridge_address
    }

    pub fn snmp_transport(&self) -> Option<&Arc<dyn SnmpTransport>> {
        self.transport.as_ref()
    }

    pub fn is_down(&self) -> bool {
        self.down.load(Ordering::Relaxed)
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::Relaxed);
    }

    /// Attaches an interface to this node and returns the shared handle.
    pub fn add_interface(&self, interface: Interface) -> Arc<Interface> {
        let interface = Arc::new(interface);
        self.interfaces.write().push(Arc::clone(&interface));
        interface
    }

    pub fn interfaces(&self) -> Vec<Arc<Interface>> {
        self.interfaces.read().clone()
    }

    /// Every address of the node: the primary address plus interface addresses.
    pub fn addresses(&self) -> Vec<IpAddr> {
        let mut out: Vec<IpAddr> = self.primary_ip.into_iter().collect();
        for iface in self.interfaces.read().iter() {
            for addr in iface.addresses() {
                if !out.contains(addr) {
                    out.push(*addr);
                }
            }
        }
        out
    }

    fn find_interface(&self, predicate: impl Fn(&Interface) -> bool) -> Option<Arc<Interface>> {
        self.interfaces.read().iter().find(|i| predicate(i)).cloned()
    }

    pub fn find_interface_by_index(&self, if_index: u32) -> Option<Arc<Interface>> {
        self.find_interface(|i| i.if_index() == if_index)
    }

    /// Case-insensitive name match.
    pub fn find_interface_by_name(&self, name: &str) -> Option<Arc<Interface>> {
        self.find_interface(|i| i.name().eq_ignore_ascii_case(name))
    }

    pub fn find_interface_by_slot_port(&self, slot: u32, port: u32) -> Option<Arc<Interface>> {
        self.find_interface(|i| i.slot() == slot && i.port() == port)
    }

    pub fn find_interface_by_mac(&self, mac: MacAddress) -> Option<Arc<Interface>> {
        if mac.is_zero() {
            return None;
        }
        self.find_interface(|i| i.mac() == mac)
    }

    /// Interface mapped to 802.1D bridge port number `bridge_port`.
    pub fn find_bridge_port(&self, bridge_port: u32) -> Option<Arc<Interface>> {
        if bridge_port == 0 {
            return None;
        }
        self.find_interface(|i| i.bridge_port() == bridge_port)
    }

    /// Walks `root` on this node's SNMP transport, handing each variable to `callback`.
    pub async fn call_snmp_enumerate<F>(
        &self,
        root: &ObjectId,
        options: &WalkOptions,
        cancel: Option<&CancellationToken>,
        callback: F,
    ) -> SnmpResult<usize>
    where
        F: FnMut(&SnmpVariable) -> WalkControl,
    {
        let transport = self
            .transport
            .as_deref()
            .ok_or_else(|| SnmpError::Comm(format!("node {self} has no SNMP transport")))?;
        snmp_walk(transport, root, options, cancel, callback).await
    }

    /// Neighbor list stored by the last topology poll.
    pub fn link_layer_neighbors(&self) -> Option<Arc<LinkLayerNeighbors>> {
        self.link_layer_neighbors.lock().clone()
    }

    pub fn set_link_layer_neighbors(&self, neighbors: Arc<LinkLayerNeighbors>) {
        *self.link_layer_neighbors.lock() = Some(neighbors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_aquisition::{SnmpValue, mock::MockAgent};

    fn switch() -> Node {
        let node = Node::new(100, "sw1").with_capabilities(Capabilities::SNMP | Capabilities::CDP);
        node.add_interface(
            Interface::new(101, 100, "GigabitEthernet0/1", 5)
                .with_slot_port(1, 1)
                .with_bridge_port(1)
                .with_mac("00:00:0c:00:00:05".parse().unwrap()),
        );
        node.add_interface(Interface::new(102, 100, "Gi0/2", 6).with_slot_port(1, 2).with_bridge_port(2));
        node
    }

    #[test]
    fn capability_names() {
        let caps = Capabilities::from_names(&["cdp", "STP", "sonmp"]).unwrap();
        assert!(caps.contains(Capabilities::CDP));
        assert!(caps.contains(Capabilities::STP));
        assert!(caps.contains(Capabilities::NDP));
        assert!(!caps.contains(Capabilities::LLDP));
        assert_eq!(caps.bits(), 0x4300);
        assert!(Capabilities::from_names(&["ospf"]).is_err());
        assert_eq!(caps.names(), vec!["cdp", "ndp", "stp"]);
    }

    #[test]
    fn interface_lookups() {
        let node = switch();
        assert_eq!(node.find_interface_by_index(6).unwrap().id(), 102);
        assert_eq!(node.find_interface_by_name("gigabitethernet0/1").unwrap().id(), 101);
        assert_eq!(node.find_interface_by_slot_port(1, 2).unwrap().id(), 102);
        assert_eq!(node.find_bridge_port(1).unwrap().id(), 101);
        assert!(node.find_bridge_port(0).is_none());
        assert!(node.find_interface_by_mac(MacAddress::ZERO).is_none());
        assert_eq!(
            node.find_interface_by_mac("00:00:0c:00:00:05".parse().unwrap()).unwrap().id(),
            101
        );
    }

    #[tokio::test]
    async fn enumerate_without_transport_fails() {
        let node = switch();
        let root: ObjectId = "1.3.6.1.2.1.2.2.1.2".parse().unwrap();
        let result = node
            .call_snmp_enumerate(&root, &WalkOptions::default(), None, |_| WalkControl::Continue)
            .await;
        assert!(matches!(result, Err(SnmpError::Comm(_))));
    }

    #[tokio::test]
    async fn enumerate_walks_node_transport() {
        let agent = Arc::new(MockAgent::new());
        agent.set("1.3.6.1.2.1.2.2.1.2.5", SnmpValue::OctetString(b"Gi0/1".to_vec()));
        agent.set("1.3.6.1.2.1.2.2.1.2.6", SnmpValue::OctetString(b"Gi0/2".to_vec()));
        let node = switch().with_transport(agent);
        let root: ObjectId = "1.3.6.1.2.1.2.2.1.2".parse().unwrap();
        let mut names = Vec::new();
        let rows = node
            .call_snmp_enumerate(&root, &WalkOptions::default(), None, |var| {
                names.push(var.value.as_string().unwrap_or_default());
                WalkControl::Continue
            })
            .await;
        assert_eq!(rows, Ok(2));
        assert_eq!(names, vec!["Gi0/1", "Gi0/2"]);
    }
}
