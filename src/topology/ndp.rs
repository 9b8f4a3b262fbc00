//! Nortel (SynOptics/Bay) topology table, also known as SONMP.

use std::net::IpAddr;

use tracing::{debug, trace};

use crate::{
    data_aquisition::{ObjectId, SnmpResult, SnmpVariable},
    network::{Capabilities, Node, ObjectRegistry},
    topology::{
        neighbors::{LinkLayerNeighbors, LinkLayerProtocol, NeighborInfo},
        resolver::{DiscoveryContext, NeighborResolver, add_neighbors},
    },
};

/// s5EnMsTopNmmIpAddr, indexed by slot.port.ipAddr(4).segId
const NMM_IP_ADDR: [u32; 14] = [1, 3, 6, 1, 4, 1, 45, 1, 6, 13, 2, 1, 1, 3];
const COLUMN_POS: usize = 13;
const NMM_SEG_ID: u32 = 5;

pub struct NdpRow {
    slot: u32,
    port: u32,
    remote_ip: IpAddr,
    oid: ObjectId,
}

/// Remote slot and port encoded in a segment id.
fn decode_segment(segment_id: u32) -> (u32, u32) {
    ((segment_id >> 8) & 0xFF, segment_id & 0xFF)
}

pub struct NdpResolver;

impl NeighborResolver for NdpResolver {
    type Row = NdpRow;

    const PROTOCOL: LinkLayerProtocol = LinkLayerProtocol::Ndp;

    fn capability(&self) -> Capabilities {
        Capabilities::NDP
    }

    fn root(&self) -> ObjectId {
        ObjectId::new(&NMM_IP_ADDR)
    }

    fn parse_row(&self, node: &Node, var: &SnmpVariable) -> Option<NdpRow> {
        let index = var.oid.suffix(NMM_IP_ADDR.len());
        if index.len() < 7 {
            trace!(target: "topology::ndp", node = %node, "unexpected index in {}", var.oid);
            return None;
        }
        // slot 0 describes the switch itself
        if index[0] == 0 {
            return None;
        }
        let remote_ip = var.value.as_ip_address()?;
        trace!(
            target: "topology::ndp",
            node = %node,
            "found peer at {}.{} IP address {remote_ip}",
            index[0],
            index[1]
        );
        if remote_ip.is_unspecified() {
            return None;
        }
        Some(NdpRow {
            slot: index[0],
            port: index[1],
            remote_ip,
            oid: var.oid.clone(),
        })
    }

    fn supplementary_oids(&self, row: &NdpRow) -> Vec<ObjectId> {
        row.oid.with_component(COLUMN_POS, NMM_SEG_ID).into_iter().collect()
    }

    fn resolve(
        &self,
        node: &Node,
        registry: &ObjectRegistry,
        row: &NdpRow,
        extra: &[SnmpVariable],
    ) -> Option<NeighborInfo> {
        let Some(remote) = registry.find_node_by_ip(node.zone_uin(), row.remote_ip) else {
            trace!(target: "topology::ndp", node = %node, "node object for IP {} not found", row.remote_ip);
            return None;
        };
        if remote.id() == node.id() {
            return None;
        }
        trace!(target: "topology::ndp", node = %node, "remote node is {remote}");

        let Some(if_local) = node.find_interface_by_slot_port(row.slot, row.port) else {
            trace!(target: "topology::ndp", node = %node, "local interface {}/{} not found", row.slot, row.port);
            return None;
        };
        let Some(segment_id) = extra.first().and_then(|v| v.value.as_u32()) else {
            debug!(target: "topology::ndp", node = %node, "no segment id for {}", row.oid);
            return None;
        };
        let (remote_slot, remote_port) = decode_segment(segment_id);
        let Some(if_remote) = remote.find_interface_by_slot_port(remote_slot, remote_port) else {
            trace!(
                target: "topology::ndp",
                node = %node,
                "remote interface {remote_slot}/{remote_port} not found on {remote}"
            );
            return None;
        };
        trace!(
            target: "topology::ndp",
            node = %node,
            "local {} linked to {remote}:{}",
            if_local.name(),
            if_remote.name()
        );
        Some(NeighborInfo::new(
            if_local.if_index(),
            if_remote.if_index(),
            remote.id(),
            LinkLayerProtocol::Ndp,
        ))
    }
}

/// Adds neighbors from the Nortel topology table of `node`.
pub async fn add_ndp_neighbors(
    node: &Node,
    neighbors: &mut LinkLayerNeighbors,
    ctx: &DiscoveryContext,
) -> SnmpResult<usize> {
    debug!(target: "topology::ndp", node = %node, "collecting NDP information");
    add_neighbors(&NdpResolver, node, neighbors, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_aquisition::{SnmpValue, mock::MockAgent},
        network::Interface,
    };
    use std::{net::Ipv4Addr, sync::Arc};

    fn topology_agent() -> Arc<MockAgent> {
        let agent = Arc::new(MockAgent::new());
        // own entry, slot 0
        agent.set(
            "1.3.6.1.4.1.45.1.6.13.2.1.1.3.0.0.10.0.0.1.0",
            SnmpValue::IpAddress(Ipv4Addr::new(10, 0, 0, 1)),
        );
        agent.set(
            "1.3.6.1.4.1.45.1.6.13.2.1.1.3.1.3.10.0.0.2.259",
            SnmpValue::IpAddress(Ipv4Addr::new(10, 0, 0, 2)),
        );
        agent.set(
            "1.3.6.1.4.1.45.1.6.13.2.1.1.3.1.4.10.0.0.9.260",
            SnmpValue::IpAddress(Ipv4Addr::new(10, 0, 0, 9)),
        );
        // segment id: slot 2, port 7
        agent.set(
            "1.3.6.1.4.1.45.1.6.13.2.1.1.5.1.3.10.0.0.2.259",
            SnmpValue::Integer(0x0207),
        );
        agent.set(
            "1.3.6.1.4.1.45.1.6.13.2.1.1.5.1.4.10.0.0.9.260",
            SnmpValue::Integer(0x0101),
        );
        agent
    }

    fn setup(agent: Arc<MockAgent>, caps: Capabilities) -> (Node, DiscoveryContext) {
        let node = Node::new(100, "bay-1")
            .with_primary_ip("10.0.0.1".parse().unwrap())
            .with_capabilities(caps)
            .with_transport(agent);
        node.add_interface(Interface::new(101, 100, "1/3", 3).with_slot_port(1, 3));
        node.add_interface(Interface::new(102, 100, "1/4", 4).with_slot_port(1, 4));

        let remote = Node::new(200, "bay-2").with_primary_ip("10.0.0.2".parse().unwrap());
        remote.add_interface(Interface::new(201, 200, "2/7", 71).with_slot_port(2, 7));
        let registry = ObjectRegistry::new();
        registry.register_node(Arc::new(remote));
        (node, DiscoveryContext::new(Arc::new(registry)))
    }

    #[test]
    fn segment_id_encoding() {
        assert_eq!(decode_segment(0x0207), (2, 7));
        assert_eq!(decode_segment(0x01_0C05), (0x0C, 5));
    }

    #[tokio::test]
    async fn resolves_slot_port_on_both_ends() {
        let (node, ctx) = setup(topology_agent(), Capabilities::NDP);
        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_ndp_neighbors(&node, &mut nbs, &ctx).await, Ok(1));
        let n = nbs.get_connection(0).unwrap();
        assert_eq!((n.if_local, n.if_remote, n.object_id), (3, 71, 200));
        assert_eq!(n.protocol, LinkLayerProtocol::Ndp);
        assert!(n.is_pt_to_pt);
    }

    #[tokio::test]
    async fn skipped_without_capability() {
        let agent = topology_agent();
        let (node, ctx) = setup(Arc::clone(&agent), Capabilities::CDP);
        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_ndp_neighbors(&node, &mut nbs, &ctx).await, Ok(0));
        assert_eq!(agent.request_count(), 0);
    }
}
