/*
 * This module provides data aquisition abilites for the application.
 * It doesn't care what a MIB table means, just how to read it from a device.
 * Topology resolvers build on the walker and the transport trait defined here.
 */

pub mod core;
#[cfg(test)]
pub mod mock;
pub mod snmp;
pub mod walk;

pub use self::core::{ObjectId, SnmpError, SnmpResult, SnmpTransport, SnmpValue, SnmpVariable};
pub use self::snmp::SnmpClient;
pub use self::walk::{SnmpWalk, WalkControl, WalkOptions, snmp_get, snmp_walk};
