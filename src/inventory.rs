use std::{
    net::{IpAddr, SocketAddr},
    path::Path,
    sync::Arc,
    time::Duration,
};

use ipnetwork::IpNetwork;
use serde::{Deserialize, Serialize};
use snmp2::Version;
use tracing::{debug, info};

use crate::{
    data_aquisition::{SnmpClient, SnmpTransport},
    error::{Error, Result},
    network::{Capabilities, Interface, MacAddress, Node, ObjectRegistry},
};

const SNMP_PORT: u16 = 161;

/// Known objects and how to reach them, as stored in the inventory JSON file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Inventory {
    pub nodes: Vec<NodeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeEntry {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub zone: u32,
    /// Capability names such as `"snmp"`, `"bridge"`, `"cdp"`.
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub primary_ip: Option<IpAddr>,
    #[serde(default)]
    pub bridge_address: Option<MacAddress>,
    #[serde(default)]
    pub snmp: Option<SnmpTarget>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SnmpTarget {
    /// Agent address; the port defaults to 161.
    pub address: String,
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_community() -> String {
    "public".to_string()
}

fn default_version() -> String {
    "2c".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InterfaceEntry {
    pub id: u32,
    pub name: String,
    pub if_index: u32,
    #[serde(default)]
    pub slot: u32,
    #[serde(default)]
    pub port: u32,
    #[serde(default)]
    pub bridge_port: u32,
    #[serde(default)]
    pub mac: Option<MacAddress>,
    /// Addresses in CIDR notation, e.g. `"10.0.0.1/24"`; a bare address is a host route.
    #[serde(default)]
    pub addresses: Vec<IpNetwork>,
}

impl SnmpTarget {
    fn socket_address(&self) -> Result<SocketAddr> {
        if let Ok(address) = self.address.parse::<SocketAddr>() {
            return Ok(address);
        }
        self.address
            .parse::<IpAddr>()
            .map(|ip| SocketAddr::new(ip, SNMP_PORT))
            .map_err(|_| Error::Inventory(format!("invalid SNMP address `{}`", self.address)))
    }

    fn snmp_version(&self) -> Result<Version> {
        match self.version.to_ascii_lowercase().as_str() {
            "1" | "v1" => Ok(Version::V1),
            "2c" | "v2c" | "2" => Ok(Version::V2C),
            other => Err(Error::Inventory(format!(
                "unsupported SNMP version `{other}` for {}",
                self.address
            ))),
        }
    }

    pub fn client(&self, timeout: Duration) -> Result<SnmpClient> {
        Ok(SnmpClient::new(self.socket_address()?, &self.community, self.snmp_version()?, None)
            .with_timeout(timeout))
    }
}

impl Inventory {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Builds the object registry, attaching an SNMP client to every node with a target.
    pub fn build_registry(&self, snmp_timeout: Duration) -> Result<Arc<ObjectRegistry>> {
        self.build_registry_with(|target| Ok(Arc::new(target.client(snmp_timeout)?) as Arc<dyn SnmpTransport>))
    }

    /// Same as [`Inventory::build_registry`] with a caller supplied transport factory.
    pub fn build_registry_with<F>(&self, mut connect: F) -> Result<Arc<ObjectRegistry>>
    where
        F: FnMut(&SnmpTarget) -> Result<Arc<dyn SnmpTransport>>,
    {
        let registry = Arc::new(ObjectRegistry::new());
        let mut interface_ids = std::collections::HashSet::new();

        for entry in &self.nodes {
            if entry.id == 0 {
                return Err(Error::Inventory(format!("node `{}` has id 0", entry.name)));
            }
            if registry.find_node_by_id(entry.id).is_some() {
                return Err(Error::Inventory(format!("duplicate node id {}", entry.id)));
            }

            let mut node = Node::new(entry.id, &entry.name)
                .with_zone(entry.zone)
                .with_capabilities(Capabilities::from_names(entry.capabilities.as_slice())?);
            if let Some(ip) = entry.primary_ip {
                node = node.with_primary_ip(ip);
            }
            if let Some(mac) = entry.bridge_address {
                node = node.with_bridge_address(mac);
            }
            if let Some(target) = &entry.snmp {
                node = node.with_transport(connect(target)?);
            }

            for iface in &entry.interfaces {
                if iface.id == 0 || !interface_ids.insert(iface.id) {
                    return Err(Error::Inventory(format!(
                        "invalid or duplicate interface id {} on node {}",
                        iface.id, entry.name
                    )));
                }
                let mut interface = Interface::new(iface.id, entry.id, &iface.name, iface.if_index)
                    .with_slot_port(iface.slot, iface.port)
                    .with_bridge_port(iface.bridge_port)
                    .with_addresses(iface.addresses.iter().map(IpNetwork::ip).collect());
                if let Some(mac) = iface.mac {
                    interface = interface.with_mac(mac);
                }
                node.add_interface(interface);
            }

            let node = Arc::new(node);
            debug!(
                target: "topology::registry",
                node = %node,
                interfaces = entry.interfaces.len(),
                "node loaded from inventory"
            );
            registry.register_node(node);
        }

        info!(target: "topology::registry", nodes = registry.node_count(), "inventory loaded");
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_aquisition::mock::MockAgent;

    const INVENTORY: &str = r#"{
        "nodes": [
            {
                "id": 100,
                "name": "core-sw",
                "capabilities": ["snmp", "bridge", "cdp", "lldp"],
                "primary_ip": "10.0.0.1",
                "bridge_address": "00:11:22:33:44:00",
                "snmp": { "address": "10.0.0.1", "community": "private" },
                "interfaces": [
                    { "id": 101, "name": "Gi0/1", "if_index": 1, "bridge_port": 1,
                      "mac": "00:11:22:33:44:01", "addresses": ["10.0.0.1/24"] },
                    { "id": 102, "name": "Gi0/2", "if_index": 2, "bridge_port": 2 }
                ]
            },
            {
                "id": 200,
                "name": "host",
                "zone": 3,
                "interfaces": [
                    { "id": 201, "name": "eth0", "if_index": 1, "mac": "aa-bb-cc-dd-ee-ff",
                      "addresses": ["192.168.1.5"] }
                ]
            }
        ]
    }"#;

    #[test]
    fn builds_registry_from_json() {
        let inventory = Inventory::from_json(INVENTORY).unwrap();
        let registry = inventory
            .build_registry_with(|_| Ok(Arc::new(MockAgent::new()) as Arc<dyn SnmpTransport>))
            .unwrap();

        assert_eq!(registry.node_count(), 2);
        let switch = registry.find_node_by_id(100).unwrap();
        assert!(switch.capabilities().contains(Capabilities::BRIDGE | Capabilities::CDP));
        assert!(switch.snmp_transport().is_some());
        assert_eq!(switch.find_bridge_port(2).unwrap().id(), 102);
        assert_eq!(
            registry.find_node_by_ip(0, "10.0.0.1".parse().unwrap()).unwrap().id(),
            100
        );

        let host = registry.find_node_by_id(200).unwrap();
        assert!(host.snmp_transport().is_none());
        assert_eq!(
            registry.find_node_by_ip(3, "192.168.1.5".parse().unwrap()).unwrap().id(),
            200
        );
        let mac: MacAddress = "aa:bb:cc:dd:ee:ff".parse().unwrap();
        assert_eq!(registry.find_interface_by_mac(mac).unwrap().id(), 201);
    }

    #[test]
    fn rejects_duplicates_and_bad_capabilities() {
        let duplicate_node = r#"{"nodes": [{"id": 1, "name": "a"}, {"id": 1, "name": "b"}]}"#;
        let inventory = Inventory::from_json(duplicate_node).unwrap();
        assert!(inventory.build_registry(Duration::from_secs(1)).is_err());

        let duplicate_iface = r#"{"nodes": [
            {"id": 1, "name": "a", "interfaces": [{"id": 5, "name": "x", "if_index": 1}]},
            {"id": 2, "name": "b", "interfaces": [{"id": 5, "name": "y", "if_index": 1}]}
        ]}"#;
        let inventory = Inventory::from_json(duplicate_iface).unwrap();
        assert!(inventory.build_registry(Duration::from_secs(1)).is_err());

        let bad_caps = r#"{"nodes": [{"id": 1, "name": "a", "capabilities": ["ospf"]}]}"#;
        let inventory = Inventory::from_json(bad_caps).unwrap();
        assert!(matches!(
            inventory.build_registry(Duration::from_secs(1)),
            Err(Error::Inventory(_))
        ));
    }

    #[test]
    fn snmp_target_parsing() {
        let target = SnmpTarget {
            address: "10.1.1.1".to_string(),
            community: default_community(),
            version: "v1".to_string(),
        };
        assert_eq!(target.socket_address().unwrap(), "10.1.1.1:161".parse().unwrap());
        assert!(matches!(target.snmp_version(), Ok(Version::V1)));

        let target = SnmpTarget {
            address: "[2001:db8::1]:1161".to_string(),
            version: "3".to_string(),
            ..target
        };
        assert_eq!(target.socket_address().unwrap().port(), 1161);
        assert!(target.snmp_version().is_err());

        let target = SnmpTarget {
            address: "router.example".to_string(),
            ..target
        };
        assert!(target.socket_address().is_err());
    }
}
