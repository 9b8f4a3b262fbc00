pub mod config;
pub mod data_aquisition;
pub mod error;
pub mod index;
pub mod inventory;
pub mod logging;
pub mod network;
pub mod topology;

pub use error::{Error, Result};
