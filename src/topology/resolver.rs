/*!
Shared driver for table-based neighbor discovery.

Every protocol follows the same row pipeline: walk one MIB column, pull the remote
identity out of the row, fetch a few extra columns with a GET, resolve both ends
to interfaces and append the adjacency. The protocol-specific parts live behind
[`NeighborResolver`]; [`add_neighbors`] owns the walk, the capability guard, the
supplementary GET and the per-row failure isolation.
*/

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    data_aquisition::{ObjectId, SnmpResult, SnmpVariable, SnmpWalk, WalkOptions, snmp_get},
    network::{Capabilities, Node, ObjectRegistry},
    topology::neighbors::{LinkLayerNeighbors, LinkLayerProtocol, NeighborInfo},
};

/// Everything a resolver needs besides the node itself.
#[derive(Clone)]
pub struct DiscoveryContext {
    pub registry: Arc<ObjectRegistry>,
    pub options: WalkOptions,
    pub cancel: CancellationToken,
}

impl DiscoveryContext {
    pub fn new(registry: Arc<ObjectRegistry>) -> Self {
        Self {
            registry,
            options: WalkOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Protocol-specific half of a table-based neighbor resolver.
pub trait NeighborResolver {
    /// Identity and index data extracted from one walked row.
    type Row;

    const PROTOCOL: LinkLayerProtocol;

    /// Capability the node must have for the table to be walked at all.
    fn capability(&self) -> Capabilities;

    /// Column walked to enumerate neighbors.
    fn root(&self) -> ObjectId;

    /// Extracts the row; `None` skips it (sentinels, malformed indexes, filtered states).
    fn parse_row(&self, node: &Node, var: &SnmpVariable) -> Option<Self::Row>;

    /// Columns fetched with one GET before resolving the row. May be empty.
    fn supplementary_oids(&self, row: &Self::Row) -> Vec<ObjectId>;

    /// Resolves both ends of the link. `extra` holds one variable per supplementary OID.
    fn resolve(
        &self,
        node: &Node,
        registry: &ObjectRegistry,
        row: &Self::Row,
        extra: &[SnmpVariable],
    ) -> Option<NeighborInfo>;
}

/// Runs `resolver` against `node` and appends the resolved adjacencies to `neighbors`.
///
/// Returns the number of entries added. Rows that cannot be resolved are logged and
/// skipped; only a failure of the walk itself is returned as an error, and entries
/// added before it are kept.
pub async fn add_neighbors<R: NeighborResolver>(
    resolver: &R,
    node: &Node,
    neighbors: &mut LinkLayerNeighbors,
    ctx: &DiscoveryContext,
) -> SnmpResult<usize> {
    let protocol = R::PROTOCOL;
    if !node.capabilities().contains(resolver.capability()) {
        trace!(target: "topology::resolver", node = %node, %protocol, "capability not set, skipping");
        return Ok(0);
    }
    let Some(transport) = node.snmp_transport() else {
        debug!(target: "topology::resolver", node = %node, %protocol, "node has no SNMP transport");
        return Ok(0);
    };

    let mut walk = SnmpWalk::new(transport.as_ref(), resolver.root(), ctx.options.clone())
        .with_cancellation(ctx.cancel.clone());
    let mut added = 0;
    while let Some(var) = walk.next().await {
        let var = var?;
        let Some(row) = resolver.parse_row(node, &var) else {
            continue;
        };

        let oids = resolver.supplementary_oids(&row);
        let extra = if oids.is_empty() {
            Vec::new()
        } else {
            match snmp_get(transport.as_ref(), &oids, ctx.options.max_retries).await {
                Ok(vars) if vars.len() == oids.len() => vars,
                Ok(vars) => {
                    debug!(
                        target: "topology::resolver",
                        node = %node,
                        %protocol,
                        row = %var.oid,
                        "malformed response: expected {} variables, got {}",
                        oids.len(),
                        vars.len()
                    );
                    continue;
                }
                Err(e) => {
                    debug!(target: "topology::resolver", node = %node, %protocol, row = %var.oid, "supplementary request failed: {e}");
                    continue;
                }
            }
        };

        if let Some(info) = resolver.resolve(node, &ctx.registry, &row, &extra) {
            if info.object_id == node.id() {
                debug!(target: "topology::resolver", node = %node, %protocol, "self reference ignored");
                continue;
            }
            if neighbors.add_connection(info) {
                added += 1;
            }
        }
    }
    debug!(target: "topology::resolver", node = %node, %protocol, rows = walk.rows(), added, "table processed");
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data_aquisition::{SnmpError, SnmpValue, mock::MockAgent},
        network::Interface,
    };

    const ROOT: &str = "1.3.6.1.4.1.99999.1.1";
    const PEER: &str = "1.3.6.1.4.1.99999.1.2";

    /// Toy table: index = local ifIndex, value = remote node id; column 2 holds the remote ifIndex.
    struct ToyResolver;

    impl NeighborResolver for ToyResolver {
        type Row = (u32, u32);

        const PROTOCOL: LinkLayerProtocol = LinkLayerProtocol::Lldp;

        fn capability(&self) -> Capabilities {
            Capabilities::LLDP
        }

        fn root(&self) -> ObjectId {
            ROOT.parse().unwrap()
        }

        fn parse_row(&self, _node: &Node, var: &SnmpVariable) -> Option<Self::Row> {
            Some((var.oid.get(9)?, var.value.as_u32()?))
        }

        fn supplementary_oids(&self, row: &Self::Row) -> Vec<ObjectId> {
            vec![PEER.parse::<ObjectId>().unwrap().child(&[row.0])]
        }

        fn resolve(
            &self,
            _node: &Node,
            registry: &ObjectRegistry,
            row: &Self::Row,
            extra: &[SnmpVariable],
        ) -> Option<NeighborInfo> {
            let remote = registry.find_node_by_id(row.1)?;
            Some(NeighborInfo::new(row.0, extra[0].value.as_u32()?, remote.id(), Self::PROTOCOL))
        }
    }

    fn setup(agent: Arc<MockAgent>) -> (Node, DiscoveryContext) {
        let registry = Arc::new(ObjectRegistry::new());
        for id in [100, 200, 300] {
            registry.register_node(Arc::new(Node::new(id, "peer")));
        }
        let node = Node::new(100, "local")
            .with_capabilities(Capabilities::LLDP)
            .with_transport(agent);
        node.add_interface(Interface::new(101, 100, "eth1", 1));
        (node, DiscoveryContext::new(registry))
    }

    #[tokio::test]
    async fn bad_rows_are_skipped_without_aborting() {
        let agent = Arc::new(MockAgent::new());
        agent.set(&format!("{ROOT}.1"), SnmpValue::Integer(200));
        agent.set(&format!("{PEER}.1"), SnmpValue::Integer(7));
        // unknown remote node
        agent.set(&format!("{ROOT}.2"), SnmpValue::Integer(999));
        agent.set(&format!("{PEER}.2"), SnmpValue::Integer(8));
        // self reference
        agent.set(&format!("{ROOT}.3"), SnmpValue::Integer(100));
        agent.set(&format!("{PEER}.3"), SnmpValue::Integer(9));
        // supplementary column missing
        agent.set(&format!("{ROOT}.4"), SnmpValue::Integer(300));
        agent.set(&format!("{ROOT}.5"), SnmpValue::Integer(300));
        agent.set(&format!("{PEER}.5"), SnmpValue::Integer(4));

        let (node, ctx) = setup(Arc::clone(&agent));
        let mut nbs = LinkLayerNeighbors::new();
        let added = add_neighbors(&ToyResolver, &node, &mut nbs, &ctx).await;
        assert_eq!(added, Ok(2));
        let found: Vec<_> = nbs.iter().map(|n| (n.if_local, n.if_remote, n.object_id)).collect();
        assert_eq!(found, vec![(1, 7, 200), (5, 4, 300)]);
    }

    #[tokio::test]
    async fn missing_capability_generates_no_traffic() {
        let agent = Arc::new(MockAgent::new());
        agent.set(&format!("{ROOT}.1"), SnmpValue::Integer(200));
        let (node, ctx) = setup(Arc::clone(&agent));
        let node = Node::new(node.id(), node.name()).with_transport(agent.clone());
        let mut nbs = LinkLayerNeighbors::new();
        assert_eq!(add_neighbors(&ToyResolver, &node, &mut nbs, &ctx).await, Ok(0));
        assert_eq!(agent.request_count(), 0);
    }

    #[tokio::test]
    async fn walk_failure_keeps_earlier_rows() {
        let agent = Arc::new(MockAgent::new());
        agent.set(&format!("{ROOT}.1"), SnmpValue::Integer(200));
        agent.set(&format!("{PEER}.1"), SnmpValue::Integer(7));
        agent.set(&format!("{ROOT}.2"), SnmpValue::Integer(300));
        agent.kill_getnext(&format!("{ROOT}.1"));
        let (node, ctx) = setup(Arc::clone(&agent));
        let ctx = ctx.with_options(WalkOptions {
            use_bulk: false,
            ..WalkOptions::default()
        });
        let mut nbs = LinkLayerNeighbors::new();
        let result = add_neighbors(&ToyResolver, &node, &mut nbs, &ctx).await;
        assert_eq!(result, Err(SnmpError::Timeout));
        assert_eq!(nbs.size(), 1);
    }
}
