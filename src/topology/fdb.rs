//! Switch forwarding database and the host connections derived from it.

use std::collections::{HashMap, HashSet};

use tracing::{debug, trace};

use crate::{
    data_aquisition::{ObjectId, SnmpResult, WalkControl},
    network::{Capabilities, MacAddress, Node},
    topology::{
        neighbors::{LinkLayerNeighbors, LinkLayerProtocol, NeighborInfo},
        resolver::DiscoveryContext,
    },
};

/// dot1dTpFdbPort, indexed by the six bytes of dot1dTpFdbAddress
const TP_FDB_PORT: [u32; 11] = [1, 3, 6, 1, 2, 1, 17, 4, 3, 1, 2];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdbEntry {
    pub mac: MacAddress,
    pub bridge_port: u32,
    /// ifIndex mapped from the bridge port, 0 if the port is unknown.
    pub if_index: u32,
}

/// MAC addresses learned by a switch, by port.
#[derive(Debug, Default)]
pub struct ForwardingDatabase {
    entries: HashMap<MacAddress, FdbEntry>,
    // learned addresses per ifIndex
    ports: HashMap<u32, HashSet<MacAddress>>,
}

impl ForwardingDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `entry`; a MAC address learned again replaces its previous port.
    pub fn add(&mut self, entry: FdbEntry) {
        if let Some(old) = self.entries.insert(entry.mac, entry) {
            if let Some(macs) = self.ports.get_mut(&old.if_index) {
                macs.remove(&old.mac);
                if macs.is_empty() {
                    self.ports.remove(&old.if_index);
                }
            }
        }
        self.ports.entry(entry.if_index).or_default().insert(entry.mac);
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn entries(&self) -> impl Iterator<Item = &FdbEntry> {
        self.entries.values()
    }

    /// ifIndex of the port `mac` was learned on.
    pub fn find_mac(&self, mac: MacAddress) -> Option<u32> {
        self.entries.get(&mac).map(|e| e.if_index)
    }

    /// Number of addresses learned on `if_index`.
    pub fn mac_count_on_port(&self, if_index: u32) -> usize {
        self.ports.get(&if_index).map_or(0, HashSet::len)
    }

    /// The only MAC address learned on `if_index`, if exactly one was.
    pub fn single_mac_on_port(&self, if_index: u32) -> Option<MacAddress> {
        if if_index == 0 {
            return None;
        }
        let macs = self.ports.get(&if_index)?;
        if macs.len() != 1 {
            return None;
        }
        macs.iter().next().copied()
    }
}

/// Reads the forwarding database of `node`, mapping bridge ports to ifIndex.
pub async fn get_switch_forwarding_database(node: &Node, ctx: &DiscoveryContext) -> SnmpResult<ForwardingDatabase> {
    let root = ObjectId::new(&TP_FDB_PORT);
    let mut fdb = ForwardingDatabase::new();
    node.call_snmp_enumerate(&root, &ctx.options, Some(&ctx.cancel), |var| {
        let index = var.oid.suffix(TP_FDB_PORT.len());
        let (Some(mac), Some(bridge_port)) = (MacAddress::from_oid_components(index), var.value.as_u32()) else {
            trace!(target: "topology::fdb", node = %node, "malformed FDB entry {}", var.oid);
            return WalkControl::Continue;
        };
        let if_index = node.find_bridge_port(bridge_port).map(|i| i.if_index()).unwrap_or(0);
        fdb.add(FdbEntry {
            mac,
            bridge_port,
            if_index,
        });
        WalkControl::Continue
    })
    .await?;
    debug!(target: "topology::fdb", node = %node, entries = fdb.size(), "FDB retrieved");
    Ok(fdb)
}

/// Adds a link for every port where exactly one known host MAC address was learned.
pub async fn add_host_connections(
    node: &Node,
    neighbors: &mut LinkLayerNeighbors,
    ctx: &DiscoveryContext,
) -> SnmpResult<usize> {
    if !node.capabilities().contains(Capabilities::BRIDGE) {
        return Ok(0);
    }
    let fdb = get_switch_forwarding_database(node, ctx).await?;

    let mut added = 0;
    for if_local in node.interfaces() {
        let Some(mac) = fdb.single_mac_on_port(if_local.if_index()) else {
            continue;
        };
        let Some(if_remote) = ctx.registry.find_interface_by_mac(mac) else {
            trace!(target: "topology::fdb", node = %node, "no interface with MAC {mac}");
            continue;
        };
        let Some(peer) = ctx.registry.find_node_by_id(if_remote.node_id()) else {
            continue;
        };
        if peer.id() == node.id() {
            continue;
        }
        debug!(
            target: "topology::fdb",
            node = %node,
            "host {peer}:{} found on {} by MAC {mac}",
            if_remote.name(),
            if_local.name()
        );
        let info = NeighborInfo::new(if_local.if_index(), if_remote.if_index(), peer.id(), LinkLayerProtocol::Fdb);
        if neighbors.add_connection(info) {
            added += 1;
        }
    }
    Ok(added)
}
