use std::sync::Arc;

use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, trace, warn};

use crate::{
    data_aquisition::SnmpResult,
    network::{Node, ObjectRegistry},
    topology::{
        cdp::add_cdp_neighbors,
        fdb::add_host_connections,
        lldp::add_lldp_neighbors,
        ndp::add_ndp_neighbors,
        neighbors::{LinkLayerNeighbors, LinkLayerProtocol, NeighborInfo},
        resolver::DiscoveryContext,
        stp::add_stp_neighbors,
    },
};

/// Protocols queried when no explicit selection is made, in query order.
pub const ALL_PROTOCOLS: [LinkLayerProtocol; 4] = [
    LinkLayerProtocol::Lldp,
    LinkLayerProtocol::Ndp,
    LinkLayerProtocol::Cdp,
    LinkLayerProtocol::Stp,
];

/// Adds the peers already recorded on the node's interfaces as cached entries.
pub fn add_existing_connections(node: &Node, neighbors: &mut LinkLayerNeighbors, registry: &ObjectRegistry) -> usize {
    let mut added = 0;
    for if_local in node.interfaces() {
        let peer = if_local.peer();
        if peer.node_id == 0 || peer.interface_id == 0 {
            continue;
        }
        let Some(if_remote) = registry.find_interface_by_id(peer.interface_id) else {
            continue;
        };
        let info = NeighborInfo {
            is_cached: true,
            ..NeighborInfo::new(if_local.if_index(), if_remote.if_index(), peer.node_id, peer.protocol)
        };
        if neighbors.add_connection(info) {
            added += 1;
        }
    }
    added
}

fn report(node: &Node, protocol: &str, result: SnmpResult<usize>) {
    match result {
        Ok(added) => debug!(target: "topology::poll", node = %node, protocol, added, "neighbors collected"),
        Err(e) => debug!(
            target: "topology::poll",
            node = %node,
            protocol,
            code = e.code(),
            "no topology information collected: {e}"
        ),
    }
}

/// Drives topology discovery for one node at a time.
#[derive(Clone)]
pub struct TopologyPoller {
    ctx: DiscoveryContext,
    protocols: Vec<LinkLayerProtocol>,
    host_connections: bool,
}

impl TopologyPoller {
    pub fn new(ctx: DiscoveryContext) -> Self {
        Self {
            ctx,
            protocols: ALL_PROTOCOLS.to_vec(),
            host_connections: true,
        }
    }

    /// Restricts the queried neighbor tables. FDB in this list has no effect; see
    /// [`TopologyPoller::with_host_connections`].
    pub fn with_protocols(mut self, protocols: Vec<LinkLayerProtocol>) -> Self {
        self.protocols = protocols;
        self
    }

    pub fn with_host_connections(mut self, enabled: bool) -> Self {
        self.host_connections = enabled;
        self
    }

    pub fn context(&self) -> &DiscoveryContext {
        &self.ctx
    }

    fn enabled(&self, protocol: LinkLayerProtocol) -> bool {
        self.protocols.contains(&protocol)
    }

    /// Collects every adjacency of `node`: LLDP, NDP, CDP, STP, forwarding database
    /// hosts, then the peers already known from earlier polls.
    pub async fn build_link_layer_neighbors(&self, node: &Arc<Node>) -> LinkLayerNeighbors {
        let ctx = &self.ctx;
        let mut nbs = LinkLayerNeighbors::for_node(node);

        for protocol in ALL_PROTOCOLS {
            if !self.enabled(protocol) {
                continue;
            }
            if ctx.cancel.is_cancelled() {
                debug!(target: "topology::poll", node = %node, "shutdown requested, stopping collection");
                return nbs;
            }
            let result = match protocol {
                LinkLayerProtocol::Lldp => add_lldp_neighbors(node, &mut nbs, ctx).await,
                LinkLayerProtocol::Ndp => add_ndp_neighbors(node, &mut nbs, ctx).await,
                LinkLayerProtocol::Cdp => add_cdp_neighbors(node, &mut nbs, ctx).await,
                LinkLayerProtocol::Stp => add_stp_neighbors(node, &mut nbs, ctx).await,
                LinkLayerProtocol::Fdb | LinkLayerProtocol::Unknown => continue,
            };
            report(node, &protocol.to_string(), result);
        }

        if self.host_connections && !ctx.cancel.is_cancelled() {
            let result = add_host_connections(node, &mut nbs, ctx).await;
            report(node, "FDB", result);
        }

        let cached = add_existing_connections(node, &mut nbs, &ctx.registry);
        trace!(target: "topology::poll", node = %node, cached, "existing connections added");
        nbs
    }

    /// Runs a topology poll: collects the neighbor list, stores it on the node and
    /// brings the peer records of the affected interfaces up to date.
    pub async fn poll(&self, node: &Arc<Node>) -> Arc<LinkLayerNeighbors> {
        debug!(target: "topology::poll", node = %node, "starting topology poll");
        let nbs = Arc::new(self.build_link_layer_neighbors(node).await);
        info!(
            target: "topology::poll",
            node = %node,
            connections = nbs.size(),
            "link layer topology retrieved"
        );
        node.set_link_layer_neighbors(Arc::clone(&nbs));

        self.update_peers(node, &nbs);
        self.remove_outdated_peers(node, &nbs);
        debug!(target: "topology::poll", node = %node, "link layer topology processed");
        nbs
    }

    /// Polls every node in `nodes` on its own task, at most `max_parallel` at a time.
    /// Results are ordered by node id; a node whose task panicked is left out.
    pub async fn poll_all(
        &self,
        nodes: Vec<Arc<Node>>,
        max_parallel: usize,
    ) -> Vec<(Arc<Node>, Arc<LinkLayerNeighbors>)> {
        let permits = Arc::new(Semaphore::new(max_parallel.max(1)));
        let mut tasks = JoinSet::new();
        for node in nodes {
            let poller = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        warn!(target: "topology::poll", node = %node, "poll slot unavailable: {e}");
                        return None;
                    }
                };
                let nbs = poller.poll(&node).await;
                Some((node, nbs))
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => error!(target: "topology::poll", "topology poll task failed: {e}"),
            }
        }
        results.sort_by_key(|(node, _)| node.id());
        results
    }

    fn update_peers(&self, node: &Node, nbs: &LinkLayerNeighbors) {
        let registry = &self.ctx.registry;
        for ni in nbs.iter().filter(|ni| !ni.is_cached) {
            let Some(remote) = registry.find_node_by_id(ni.object_id) else {
                continue;
            };
            let if_local = node.find_interface_by_index(ni.if_local);
            let if_remote = remote.find_interface_by_index(ni.if_remote);
            let (Some(if_local), Some(if_remote)) = (if_local, if_remote) else {
                debug!(
                    target: "topology::poll",
                    node = %node,
                    "peer {remote}: interface {} or remote interface {} missing",
                    ni.if_local,
                    ni.if_remote
                );
                continue;
            };

            // unlink whatever each end was connected to before
            for (end, new_peer) in [(&if_remote, &if_local), (&if_local, &if_remote)] {
                let old = end.peer().interface_id;
                if old != 0 && old != new_peer.id() {
                    if let Some(old_peer) = registry.find_interface_by_id(old) {
                        old_peer.clear_peer();
                    }
                }
            }

            if_local.set_peer(remote.id(), if_remote.id(), ni.protocol, false);
            if_remote.set_peer(node.id(), if_local.id(), ni.protocol, true);
            debug!(
                target: "topology::poll",
                node = %node,
                "local interface {} linked to remote interface {remote}:{}",
                if_local.name(),
                if_remote.name()
            );
        }
    }

    fn remove_outdated_peers(&self, node: &Node, nbs: &LinkLayerNeighbors) {
        let registry = &self.ctx.registry;
        for iface in node.interfaces() {
            let peer = iface.peer();
            if peer.node_id == node.id() && peer.interface_id == iface.id() {
                iface.clear_peer();
                trace!(target: "topology::poll", node = %node, "self-linked interface {} fixed", iface.name());
                continue;
            }
            if !peer.is_set() {
                continue;
            }
            let Some(peer_node) = registry.find_node_by_id(peer.node_id) else {
                trace!(target: "topology::poll", node = %node, "peer node {} no longer exists", peer.node_id);
                iface.clear_peer();
                continue;
            };
            if peer_node.is_down() {
                continue;
            }

            let confirmed = nbs
                .iter()
                .find(|ni| ni.object_id == peer.node_id && ni.if_local == iface.if_index())
                .is_some_and(|ni| {
                    !ni.is_cached
                        || (matches!(ni.protocol, LinkLayerProtocol::Fdb | LinkLayerProtocol::Stp) && peer.reflection)
                });
            if !confirmed {
                if let Some(if_peer) = registry.find_interface_by_id(peer.interface_id) {
                    if_peer.clear_peer();
                }
                iface.clear_peer();
                trace!(
                    target: "topology::poll",
                    node = %node,
                    "removed outdated peer information from interface {}",
                    iface.name()
                );
            }
        }
    }
}

/// Builds the complete neighbor list of `node` with every protocol enabled.
pub async fn build_link_layer_neighbors(node: &Arc<Node>, ctx: &DiscoveryContext) -> LinkLayerNeighbors {
    TopologyPoller::new(ctx.clone()).build_link_layer_neighbors(node).await
}
