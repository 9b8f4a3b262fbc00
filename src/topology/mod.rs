/*!
Topology module

Link-layer neighbor discovery for managed nodes.

Structure:
- `neighbors`: `NeighborInfo` records and the per-node `LinkLayerNeighbors` collector.
- `resolver`: the `NeighborResolver` strategy trait and the shared `add_neighbors`
              driver that walks a neighbor table and resolves each row.
- `cdp`, `ndp`, `stp`, `lldp`: protocol strategies built on the driver.
- `fdb`: switch forwarding database and host connections derived from it.
- `poll`: full neighbor collection for a node and the peer updates that follow it.

Re-exports:
- The `add_*` entry points, `TopologyPoller` and `DiscoveryContext` for callers
  that schedule polls.
*/

pub mod cdp;
pub mod fdb;
pub mod lldp;
pub mod ndp;
pub mod neighbors;
pub mod poll;
pub mod resolver;
pub mod stp;

pub use cdp::add_cdp_neighbors;
pub use fdb::{ForwardingDatabase, add_host_connections, get_switch_forwarding_database};
pub use lldp::add_lldp_neighbors;
pub use ndp::add_ndp_neighbors;
pub use neighbors::{LinkLayerNeighbors, LinkLayerProtocol, NeighborInfo};
pub use poll::{TopologyPoller, add_existing_connections, build_link_layer_neighbors};
pub use resolver::{DiscoveryContext, NeighborResolver, add_neighbors};
pub use stp::add_stp_neighbors;
