/*
 * Managed object model consumed by topology discovery: nodes, their interfaces,
 * hardware addresses, and the registry of shared indexes used to resolve neighbors.
 */

pub mod interface;
pub mod mac;
pub mod node;
pub mod registry;

pub use interface::{Interface, PeerInfo};
pub use mac::{BridgeId, MacAddress};
pub use node::{Capabilities, Node};
pub use registry::ObjectRegistry;
