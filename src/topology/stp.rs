//! Spanning tree adjacency from the BRIDGE-MIB port table.
//!
//! For each active port the designated bridge and designated port identify the
//! switch and port on the other side of the segment.

use tracing::{debug, trace};

use crate::{
    data_aquisition::{ObjectId, SnmpResult, SnmpValue, SnmpVariable},
    network::{BridgeId, Capabilities, Node, ObjectRegistry},
    topology::{
        neighbors::{LinkLayerNeighbors, LinkLayerProtocol, NeighborInfo},
        resolver::{DiscoveryContext, NeighborResolver, add_neighbors},
    },
};

/// dot1dStpPortState, indexed by dot1dStpPort
const STP_PORT_STATE: [u32; 11] = [1, 3, 6, 1, 2, 1, 17, 2, 15, 1, 3];
const COLUMN_POS: usize = 10;
const STP_PORT_DESIGNATED_BRIDGE: u32 = 8;
const STP_PORT_DESIGNATED_PORT: u32 = 9;

const STATE_BLOCKING: u32 = 2;
const STATE_FORWARDING: u32 = 5;

pub struct StpRow {
    port: u32,
    oid: ObjectId,
}

/// Port number from a dot1dStpPortDesignatedPort value: 4 bits of priority, 12 bits of port.
fn designated_port(value: &SnmpValue) -> Option<u32> {
    let raw = match value {
        SnmpValue::OctetString(bytes) if bytes.len() >= 2 => u32::from(u16::from_be_bytes([bytes[0], bytes[1]])),
        other => other.as_u32()?,
    };
    Some(raw & 0x0FFF)
}

pub struct StpResolver;

impl NeighborResolver for StpResolver {
    type Row = StpRow;

    const PROTOCOL: LinkLayerProtocol = LinkLayerProtocol::Stp;

    fn capability(&self) -> Capabilities {
        Capabilities::STP
    }

    fn root(&self) -> ObjectId {
        ObjectId::new(&STP_PORT_STATE)
    }

    fn parse_row(&self, node: &Node, var: &SnmpVariable) -> Option<StpRow> {
        let port = var.oid.get(STP_PORT_STATE.len())?;
        let state = var.value.as_u32()?;
        // listening, learning, disabled and broken ports carry no adjacency
        if state != STATE_BLOCKING && state != STATE_FORWARDING {
            trace!(target: "topology::stp", node = %node, port, state, "port state ignored");
            return None;
        }
        Some(StpRow {
            port,
            oid: var.oid.clone(),
        })
    }

    fn supplementary_oids(&self, row: &StpRow) -> Vec<ObjectId> {
        [STP_PORT_DESIGNATED_BRIDGE, STP_PORT_DESIGNATED_PORT]
            .iter()
            .filter_map(|column| row.oid.with_component(COLUMN_POS, *column))
            .collect()
    }

    fn resolve(
        &self,
        node: &Node,
        registry: &ObjectRegistry,
        row: &StpRow,
        extra: &[SnmpVariable],
    ) -> Option<NeighborInfo> {
        if extra.len() < 2 {
            debug!(target: "topology::stp", node = %node, port = row.port, "designated bridge and port not returned");
            return None;
        }
        let Some(bridge) = extra[0].value.as_bytes().and_then(BridgeId::from_bytes) else {
            debug!(target: "topology::stp", node = %node, port = row.port, "malformed designated bridge");
            return None;
        };
        if bridge.is_zero() {
            trace!(target: "topology::stp", node = %node, port = row.port, "designated bridge not set");
            return None;
        }

        let Some(remote) = registry
            .find_node_by_mac(bridge.mac)
            .or_else(|| registry.find_node_by_bridge_id(&bridge))
        else {
            debug!(target: "topology::stp", node = %node, port = row.port, "no node for designated bridge {bridge}");
            return None;
        };
        if remote.id() == node.id() {
            trace!(target: "topology::stp", node = %node, port = row.port, "node is the designated bridge");
            return None;
        }

        let Some(dport) = designated_port(&extra[1].value) else {
            debug!(target: "topology::stp", node = %node, port = row.port, "malformed designated port");
            return None;
        };
        let Some(if_local) = node.find_bridge_port(row.port) else {
            debug!(target: "topology::stp", node = %node, "local bridge port {} not found", row.port);
            return None;
        };
        let Some(if_remote) = remote.find_bridge_port(dport) else {
            debug!(target: "topology::stp", node = %node, "bridge port {dport} not found on {remote}");
            return None;
        };
        debug!(
            target: "topology::stp",
            node = %node,
            "local {} linked to {remote}:{} via designated bridge {bridge}",
            if_local.name(),
            if_remote.name()
        );
        Some(NeighborInfo::new(
            if_local.if_index(),
            if_remote.if_index(),
            remote.id(),
            LinkLayerProtocol::Stp,
        ))
    }
}

/// Adds neighbors inferred from the spanning tree port table of `node`.
pub async fn add_stp_neighbors(
    node: &Node,
    neighbors: &mut LinkLayerNeighbors,
    ctx: &DiscoveryContext,
) -> SnmpResult<usize> {
    debug!(target: "topology::stp", node = %node, "collecting STP information");
    add_neighbors(&StpResolver, node, neighbors, ctx).await
}
