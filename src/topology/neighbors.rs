use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Weak},
};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::network::node::Node;

/// Protocol a link-layer adjacency was learned from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkLayerProtocol {
    #[default]
    Unknown,
    Fdb,
    Cdp,
    Lldp,
    #[serde(alias = "sonmp")]
    Ndp,
    Stp,
}

impl LinkLayerProtocol {
    /// Rank used to pick one adjacency per local interface; physical-topology
    /// protocols first, forwarding-database guesses last.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Stp | Self::Cdp => 4,
            Self::Lldp => 3,
            Self::Ndp => 2,
            Self::Fdb => 1,
            Self::Unknown => 0,
        }
    }
}

impl fmt::Display for LinkLayerProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Fdb => "FDB",
            Self::Cdp => "CDP",
            Self::Lldp => "LLDP",
            Self::Ndp => "NDP",
            Self::Stp => "STP",
        };
        f.write_str(name)
    }
}

/// One discovered adjacency between a local and a remote interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborInfo {
    /// Local ifIndex.
    pub if_local: u32,
    /// Remote ifIndex.
    pub if_remote: u32,
    /// Object id of the remote node.
    pub object_id: u32,
    pub is_pt_to_pt: bool,
    pub protocol: LinkLayerProtocol,
    pub is_cached: bool,
}

impl NeighborInfo {
    pub fn new(if_local: u32, if_remote: u32, object_id: u32, protocol: LinkLayerProtocol) -> Self {
        Self {
            if_local,
            if_remote,
            object_id,
            is_pt_to_pt: true,
            protocol,
            is_cached: false,
        }
    }

    fn is_complete(&self) -> bool {
        self.if_local != 0 && self.if_remote != 0 && self.object_id != 0
    }

    fn same_link(&self, other: &NeighborInfo) -> bool {
        self.if_local == other.if_local && self.if_remote == other.if_remote && self.object_id == other.object_id
    }

    // fresh beats cached, then protocol rank
    fn outranks(&self, other: &NeighborInfo) -> bool {
        (!self.is_cached, self.protocol.precedence()) > (!other.is_cached, other.protocol.precedence())
    }
}

/// Adjacencies collected for one node during one topology poll.
///
/// Owned by a single poller while it is being filled; afterwards it is shared
/// read-only through the node.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LinkLayerNeighbors {
    #[serde(skip)]
    owner: Weak<Node>,
    node_id: u32,
    connections: Vec<NeighborInfo>,
}

impl LinkLayerNeighbors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collector bound to the node being polled.
    pub fn for_node(node: &Arc<Node>) -> Self {
        let mut neighbors = Self::new();
        neighbors.set_owner(node);
        neighbors
    }

    pub fn set_owner(&mut self, node: &Arc<Node>) {
        self.owner = Arc::downgrade(node);
        self.node_id = node.id();
    }

    pub fn owner(&self) -> Option<Arc<Node>> {
        self.owner.upgrade()
    }

    /// Id of the owning node, 0 when unbound.
    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// Appends `info`. Incomplete records and repeats of an already known link are
    /// not added; a repeat from a higher ranked source upgrades the stored record.
    /// Returns true if a new entry was appended.
    pub fn add_connection(&mut self, info: NeighborInfo) -> bool {
        if !info.is_complete() {
            trace!(target: "topology::neighbors", node_id = self.node_id, ?info, "incomplete connection ignored");
            return false;
        }

        if let Some(existing) = self.connections.iter_mut().find(|c| c.same_link(&info)) {
            if info.outranks(existing) {
                existing.protocol = info.protocol;
                existing.is_cached = info.is_cached;
                existing.is_pt_to_pt = info.is_pt_to_pt;
            }
            return false;
        }

        for other in self.connections.iter().filter(|c| c.if_local == info.if_local) {
            debug!(
                target: "topology::neighbors",
                node_id = self.node_id,
                if_local = info.if_local,
                "conflicting adjacency: {} reports node {} ifIndex {}, {} reported node {} ifIndex {}",
                info.protocol,
                info.object_id,
                info.if_remote,
                other.protocol,
                other.object_id,
                other.if_remote
            );
        }
        self.connections.push(info);
        true
    }

    pub fn size(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn get_connection(&self, index: usize) -> Option<&NeighborInfo> {
        self.connections.get(index)
    }

    pub fn connections(&self) -> &[NeighborInfo] {
        &self.connections
    }

    pub fn iter(&self) -> impl Iterator<Item = &NeighborInfo> {
        self.connections.iter()
    }

    /// At most one entry per local interface: fresh over cached, then STP/CDP,
    /// LLDP, NDP, FDB; the first reported wins a tie. Ordered by first appearance.
    pub fn active_connections(&self) -> Vec<NeighborInfo> {
        let mut slots: HashMap<u32, usize> = HashMap::new();
        let mut out: Vec<NeighborInfo> = Vec::new();
        for info in &self.connections {
            match slots.get(&info.if_local) {
                Some(&i) => {
                    if info.outranks(&out[i]) {
                        out[i] = *info;
                    }
                }
                None => {
                    slots.insert(info.if_local, out.len());
                    out.push(*info);
                }
            }
        }
        out
    }
}

impl<'a> IntoIterator for &'a LinkLayerNeighbors {
    type Item = &'a NeighborInfo;
    type IntoIter = std::slice::Iter<'a, NeighborInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.connections.iter()
    }
}
