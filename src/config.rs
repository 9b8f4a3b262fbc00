use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    data_aquisition::WalkOptions,
    error::{Error, Result},
    topology::{LinkLayerProtocol, poll::ALL_PROTOCOLS},
};

mod duration_str {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SnmpSettings {
    /// Per-request timeout, e.g. `"1500ms"` or `"2s"`.
    #[serde(with = "duration_str")]
    pub timeout: Duration,
    /// Attempts per request, including the first one.
    pub retries: u32,
    pub use_bulk: bool,
    pub max_repetitions: u32,
}

impl Default for SnmpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1500),
            retries: 3,
            use_bulk: true,
            max_repetitions: 32,
        }
    }
}

impl SnmpSettings {
    pub fn walk_options(&self) -> WalkOptions {
        WalkOptions {
            max_retries: self.retries,
            use_bulk: self.use_bulk,
            max_repetitions: self.max_repetitions,
        }
    }
}

/// Discovery settings read from a JSON file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DiscoveryConfig {
    pub snmp: SnmpSettings,
    /// Neighbor tables to query.
    pub protocols: Vec<LinkLayerProtocol>,
    /// Derive host links from switch forwarding databases.
    pub host_connections: bool,
    /// Nodes polled at the same time.
    pub max_parallel_polls: usize,
    /// Default `tracing` filter when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            snmp: SnmpSettings::default(),
            protocols: ALL_PROTOCOLS.to_vec(),
            host_connections: true,
            max_parallel_polls: 16,
            log_filter: "info".to_string(),
        }
    }
}

impl DiscoveryConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(Error::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.snmp.timeout.is_zero() {
            return Err(Error::Config("snmp.timeout must be greater than zero".to_string()));
        }
        if self.snmp.retries == 0 {
            return Err(Error::Config("snmp.retries must be at least 1".to_string()));
        }
        if self.max_parallel_polls == 0 {
            return Err(Error::Config("max_parallel_polls must be at least 1".to_string()));
        }
        if let Some(p) = self
            .protocols
            .iter()
            .find(|p| matches!(p, LinkLayerProtocol::Fdb | LinkLayerProtocol::Unknown))
        {
            return Err(Error::Config(format!(
                "`{}` is not a neighbor table; use host_connections for FDB",
                serde_json::to_string(p)?
            )));
        }
        Ok(())
    }
}
