//! IEEE 802.1AB (LLDP) remote systems table.

use std::{
    net::{IpAddr, Ipv4Addr, Ipv6Addr},
    sync::Arc,
};

use tracing::{debug, trace};

use crate::{
    data_aquisition::{ObjectId, SnmpResult, SnmpVariable},
    network::{BridgeId, Capabilities, Interface, MacAddress, Node, ObjectRegistry},
    topology::{
        neighbors::{LinkLayerNeighbors, LinkLayerProtocol, NeighborInfo},
        resolver::{DiscoveryContext, NeighborResolver, add_neighbors},
    },
};

/// lldpRemChassisId, indexed by lldpRemTimeMark.lldpRemLocalPortNum.lldpRemIndex
const REM_CHASSIS_ID: [u32; 11] = [1, 0, 8802, 1, 1, 2, 1, 4, 1, 1, 5];
const COLUMN_POS: usize = 10;
const REM_CHASSIS_ID_SUBTYPE: u32 = 4;
const REM_PORT_ID_SUBTYPE: u32 = 6;
const REM_PORT_ID: u32 = 7;

const CHASSIS_MAC_ADDRESS: u32 = 4;
const CHASSIS_NETWORK_ADDRESS: u32 = 5;

const PORT_INTERFACE_ALIAS: u32 = 1;
const PORT_MAC_ADDRESS: u32 = 3;
const PORT_INTERFACE_NAME: u32 = 5;
const PORT_LOCAL: u32 = 7;

// IANA address family numbers used in networkAddress chassis ids
const AF_IPV4: u8 = 1;
const AF_IPV6: u8 = 2;

pub struct LldpRow {
    local_port: u32,
    chassis_id: Vec<u8>,
    oid: ObjectId,
}

fn network_address(chassis_id: &[u8]) -> Option<IpAddr> {
    let (family, address) = chassis_id.split_first()?;
    match *family {
        AF_IPV4 => {
            let octets: [u8; 4] = address.get(..4)?.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        AF_IPV6 => {
            let octets: [u8; 16] = address.get(..16)?.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

fn find_remote_node(node: &Node, registry: &ObjectRegistry, subtype: u32, chassis_id: &[u8]) -> Option<Arc<Node>> {
    match subtype {
        CHASSIS_MAC_ADDRESS => {
            let mac = MacAddress::from_slice(chassis_id).filter(|m| !m.is_zero())?;
            registry.find_node_by_mac(mac).or_else(|| {
                registry.find_node_by_bridge_id(&BridgeId { priority: 0, mac })
            })
        }
        CHASSIS_NETWORK_ADDRESS => {
            let address = network_address(chassis_id).filter(|a| !a.is_unspecified())?;
            registry.find_node_by_ip(node.zone_uin(), address)
        }
        other => {
            trace!(target: "topology::lldp", node = %node, "chassis id subtype {other} not supported");
            None
        }
    }
}

fn find_remote_interface(remote: &Node, subtype: u32, port_id: &SnmpVariable) -> Option<Arc<Interface>> {
    match subtype {
        PORT_MAC_ADDRESS => remote.find_interface_by_mac(MacAddress::from_slice(port_id.value.as_bytes()?)?),
        PORT_INTERFACE_NAME | PORT_INTERFACE_ALIAS => remote.find_interface_by_name(&port_id.value.as_string()?),
        PORT_LOCAL => {
            let id = port_id.value.as_string()?;
            match id.parse::<u32>() {
                Ok(if_index) => remote
                    .find_interface_by_index(if_index)
                    .or_else(|| remote.find_interface_by_name(&id)),
                Err(_) => remote.find_interface_by_name(&id),
            }
        }
        _ => None,
    }
}

pub struct LldpResolver;

impl NeighborResolver for LldpResolver {
    type Row = LldpRow;

    const PROTOCOL: LinkLayerProtocol = LinkLayerProtocol::Lldp;

    fn capability(&self) -> Capabilities {
        Capabilities::LLDP
    }

    fn root(&self) -> ObjectId {
        ObjectId::new(&REM_CHASSIS_ID)
    }

    fn parse_row(&self, node: &Node, var: &SnmpVariable) -> Option<LldpRow> {
        let index = var.oid.suffix(REM_CHASSIS_ID.len());
        if index.len() != 3 {
            trace!(target: "topology::lldp", node = %node, "unexpected index in {}", var.oid);
            return None;
        }
        let chassis_id = var.value.as_bytes()?.to_vec();
        if chassis_id.iter().all(|b| *b == 0) {
            trace!(target: "topology::lldp", node = %node, "empty chassis id in {}", var.oid);
            return None;
        }
        Some(LldpRow {
            local_port: index[1],
            chassis_id,
            oid: var.oid.clone(),
        })
    }

    fn supplementary_oids(&self, row: &LldpRow) -> Vec<ObjectId> {
        [REM_CHASSIS_ID_SUBTYPE, REM_PORT_ID_SUBTYPE, REM_PORT_ID]
            .iter()
            .filter_map(|column| row.oid.with_component(COLUMN_POS, *column))
            .collect()
    }

    fn resolve(
        &self,
        node: &Node,
        registry: &ObjectRegistry,
        row: &LldpRow,
        extra: &[SnmpVariable],
    ) -> Option<NeighborInfo> {
        let [chassis_subtype, port_subtype, port_id] = extra else {
            debug!(target: "topology::lldp", node = %node, "chassis and port columns not returned");
            return None;
        };
        let Some(chassis_subtype) = chassis_subtype.value.as_u32() else {
            debug!(target: "topology::lldp", node = %node, row = %row.oid, "malformed chassis id subtype");
            return None;
        };
        let Some(remote) = find_remote_node(node, registry, chassis_subtype, &row.chassis_id) else {
            debug!(
                target: "topology::lldp",
                node = %node,
                "no node for chassis id {} (subtype {chassis_subtype})",
                hex::encode(&row.chassis_id)
            );
            return None;
        };
        if remote.id() == node.id() {
            return None;
        }

        let Some(port_subtype) = port_subtype.value.as_u32() else {
            debug!(target: "topology::lldp", node = %node, row = %row.oid, "malformed port id subtype");
            return None;
        };
        let Some(if_remote) = find_remote_interface(&remote, port_subtype, port_id) else {
            debug!(
                target: "topology::lldp",
                node = %node,
                "remote port (subtype {port_subtype}) not found on {remote}"
            );
            return None;
        };
        let Some(if_local) = node
            .find_bridge_port(row.local_port)
            .or_else(|| node.find_interface_by_index(row.local_port))
        else {
            debug!(target: "topology::lldp", node = %node, "local port {} not found", row.local_port);
            return None;
        };
        debug!(
            target: "topology::lldp",
            node = %node,
            "local {} linked to {remote}:{}",
            if_local.name(),
            if_remote.name()
        );
        Some(NeighborInfo::new(
            if_local.if_index(),
            if_remote.if_index(),
            remote.id(),
            LinkLayerProtocol::Lldp,
        ))
    }
}

/// Adds neighbors from the LLDP remote systems table of `node`.
pub async fn add_lldp_neighbors(
    node: &Node,
    neighbors: &mut LinkLayerNeighbors,
    ctx: &DiscoveryContext,
) -> SnmpResult<usize> {
    debug!(target: "topology::lldp", node = %node, "collecting LLDP information");
    add_neighbors(&LldpResolver, node, neighbors, ctx).await
}
