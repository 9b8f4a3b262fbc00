use std::path::PathBuf;

use thiserror::Error;

use crate::data_aquisition::SnmpError;

/// Errors raised outside the per-row resolution path (configuration, inventory, I/O).
#[derive(Debug, Error)]
pub enum Error {
    #[error("SNMP error: {0}")]
    Snmp(#[from] SnmpError),
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Invalid MAC address: {0}")]
    InvalidMacAddress(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Inventory error: {0}")]
    Inventory(String),
}

pub type Result<T> = std::result::Result<T, Error>;
