//! Cisco Discovery Protocol neighbors from the CISCO-CDP-MIB cache table.

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

/// cdpCacheAddress, indexed by cdpCacheIfIndex.cdpCacheDeviceIndex
const CDP_CACHE_ADDRESS: [u32; 14] = [1, 3, 6, 1, 4, 1, 9, 9, 23, 1, 2, 1, 1, 4];
const COLUMN_POS: usize = 13;
const CDP_CACHE_DEVICE_PORT: u32 = 7;

pub struct CdpRow {
    if_local: u32,
    remote_ip: IpAddr,
    oid: ObjectId,
}

pub struct CdpResolver;

impl NeighborResolver for CdpResolver {
    type Row = CdpRow;

    const PROTOCOL: LinkLayerProtocol = LinkLayerProtocol::Cdp;

    fn capability(&self) -> Capabilities {
        Capabilities::CDP
    }

    fn root(&self) -> ObjectId {
        ObjectId::new(&CDP_CACHE_ADDRESS)
    }

    fn parse_row(&self, node: &Node, var: &SnmpVariable) -> Option<CdpRow> {
        let index = var.oid.suffix(CDP_CACHE_ADDRESS.len());
        if index.len() != 2 {
            trace!(target: "topology::cdp", node = %node, "unexpected index in {}", var.oid);
            return None;
        }
        let Some(remote_ip) = var.value.as_ip_address() else {
            debug!(target: "topology::cdp", node = %node, "cannot decode remote address in {}", var.oid);
            return None;
        };
        if remote_ip.is_unspecified() {
            trace!(target: "topology::cdp", node = %node, "zero remote address in {}", var.oid);
            return None;
        }
        Some(CdpRow {
            if_local: index[0],
            remote_ip,
            oid: var.oid.clone(),
        })
    }

    fn supplementary_oids(&self, row: &CdpRow) -> Vec<ObjectId> {
        row.oid
            .with_component(COLUMN_POS, CDP_CACHE_DEVICE_PORT)
            .into_iter()
            .collect()
    }

    fn resolve(
        &self,
        node: &Node,
        registry: &ObjectRegistry,
        row: &CdpRow,
        extra: &[SnmpVariable],
    ) -> Option<NeighborInfo> {
        let Some(remote) = registry.find_node_by_ip(node.zone_uin(), row.remote_ip) else {
            debug!(target: "topology::cdp", node = %node, "cannot find node object for remote IP {}", row.remote_ip);
            return None;
        };
        if remote.id() == node.id() {
            debug!(target: "topology::cdp", node = %node, "remote IP {} belongs to the node itself", row.remote_ip);
            return None;
        }
        debug!(target: "topology::cdp", node = %node, "remote node {remote} found for IP {}", row.remote_ip);

        let Some(port_name) = extra.first().and_then(|var| var.value.as_string()) else {
            debug!(target: "topology::cdp", node = %node, "malformed remote port for {}", row.remote_ip);
            return None;
        };
        let Some(if_remote) = remote.find_interface_by_name(&port_name) else {
            debug!(target: "topology::cdp", node = %node, "remote interface {port_name:?} not found on {remote}");
            return None;
        };
        let Some(if_local) = node.find_interface_by_index(row.if_local) else {
            debug!(target: "topology::cdp", node = %node, "local interface with ifIndex {} not found", row.if_local);
            return None;
        };
        debug!(
            target: "topology::cdp",
            node = %node,
            "local {} linked to {remote}:{}",
            if_local.name(),
            if_remote.name()
        );
        Some(NeighborInfo::new(
            if_local.if_index(),
            if_remote.if_index(),
            remote.id(),
            LinkLayerProtocol::Cdp,
        ))
    }
}

/// Adds neighbors reported in the CDP cache of `node`.
pub async fn add_cdp_neighbors(
    node: &Node,
    neighbors: &mut LinkLayerNeighbors,
    ctx: &DiscoveryContext,
) -> SnmpResult<usize> {
    debug!(target: "topology::cdp", node = %node, "collecting CDP information");
    add_neighbors(&CdpResolver, node, neighbors, ctx).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_aquisition::{SnmpValue, mock::MockAgent},
        network::Interface,
    };
    use std::sync::Arc;

    const ROW: &str = "1.3.6.1.4.1.9.9.23.1.2.1.1.4.5.1";
    const PORT: &str = "1.3.6.1.4.1.9.9.23.1.2.1.1.7.5.1";

    fn agent_with_row(address: [u8; 4], port: &str) -> Arc<MockAgent> {
        let agent = Arc::new(MockAgent::new());
        agent.set("1.3.6.1.4.1.9.9.23.1.2.1.1.3.5.1", SnmpValue::Integer(1));
        agent.set(ROW, SnmpValue::OctetString(address.to_vec()));
        agent.set("1.3.6.1.4.1.9.9.23.1.2.1.1.6.5.1", SnmpValue::OctetString(b"switch-b".to_vec()));
        agent.set(PORT, SnmpValue::OctetString(port.as_bytes().to_vec()));
        agent
    }

    fn node_a(agent: Arc<MockAgent>, caps: Capabilities) -> Node {
        let node = Node::new(100, "switch-a")
            .with_primary_ip("192.0.2.1".parse().unwrap())
            .with_capabilities(caps)
            .with_transport(agent);
        node.add_interface(Interface::new(101, 100, "Gi0/1", 5));
        node
    }

    fn node_b() -> Arc<Node> {
        let node = Node::new(200, "switch-b").with_primary_ip("192.0.2.10".parse().unwrap());
        node.add_interface(Interface::new(201, 200, "Gi0/2", 7));
        Arc::new(node)
    }

    fn context(registry: ObjectRegistry) -> DiscoveryContext {
        DiscoveryContext::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn resolves_cache_entry_to_remote_interface() {
        let agent = agent_with_row([192, 0, 2, 10], "Gi0/2");
        let node = node_a(agent, Capabilities::SNMP | Capabilities::CDP);
        let registry = ObjectRegistry::new();
        registry.register_node(node_b());
        let ctx = context(registry);

        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_cdp_neighbors(&node, &mut nbs, &ctx).await, Ok(1));
        assert_eq!(
            nbs.connections(),
            &[NeighborInfo {
                if_local: 5,
                if_remote: 7,
                object_id: 200,
                is_pt_to_pt: true,
                protocol: LinkLayerProtocol::Cdp,
                is_cached: false,
            }]
        );
    }

    #[tokio::test]
    async fn unknown_remote_address_is_skipped() {
        let agent = agent_with_row([192, 0, 2, 10], "Gi0/2");
        let node = node_a(agent, Capabilities::CDP);
        let ctx = context(ObjectRegistry::new());

        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_cdp_neighbors(&node, &mut nbs, &ctx).await, Ok(0));
        assert!(nbs.is_empty());
    }

    #[tokio::test]
    async fn zero_address_is_rejected_before_lookup() {
        let agent = agent_with_row([0, 0, 0, 0], "Gi0/2");
        let node = node_a(Arc::clone(&agent), Capabilities::CDP);
        let registry = ObjectRegistry::new();
        registry.register_node(node_b());
        let ctx = context(registry);

        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_cdp_neighbors(&node, &mut nbs, &ctx).await, Ok(0));
        assert!(nbs.is_empty());
        // two GETNEXT requests and no supplementary GET
        assert_eq!(agent.request_count(), 2);
    }

    #[tokio::test]
    async fn own_address_is_not_a_neighbor() {
        let agent = agent_with_row([192, 0, 2, 1], "Gi0/1");
        let node = Arc::new(node_a(agent, Capabilities::CDP));
        let registry = ObjectRegistry::new();
        registry.register_node(Arc::clone(&node));
        let ctx = context(registry);

        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_cdp_neighbors(&node, &mut nbs, &ctx).await, Ok(0));
        assert!(nbs.is_empty());
    }

    #[tokio::test]
    async fn unknown_remote_port_is_skipped() {
        let agent = agent_with_row([192, 0, 2, 10], "Gi0/9");
        let node = node_a(agent, Capabilities::CDP);
        let registry = ObjectRegistry::new();
        registry.register_node(node_b());
        let ctx = context(registry);

        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_cdp_neighbors(&node, &mut nbs, &ctx).await, Ok(0));
    }

    #[tokio::test]
    async fn missing_remote_port_column_skips_row() {
        let agent = agent_with_row([192, 0, 2, 10], "Gi0/2");
        agent.set(PORT, SnmpValue::NoSuchObject);
        let node = node_a(agent, Capabilities::CDP);
        let registry = ObjectRegistry::new();
        registry.register_node(node_b());
        let ctx = context(registry);

        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_cdp_neighbors(&node, &mut nbs, &ctx).await, Ok(0));
        assert!(nbs.is_empty());
    }

    #[tokio::test]
    async fn node_without_cdp_is_not_queried() {
        let agent = agent_with_row([192, 0, 2, 10], "Gi0/2");
        let node = node_a(Arc::clone(&agent), Capabilities::SNMP | Capabilities::LLDP);
        let registry = ObjectRegistry::new();
        registry.register_node(node_b());
        let ctx = context(registry);

        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_cdp_neighbors(&node, &mut nbs, &ctx).await, Ok(0));
        assert_eq!(agent.request_count(), 0);
    }
}
