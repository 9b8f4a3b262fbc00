//! In-memory SNMP agent used by tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    ops::Bound,
    sync::atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::core::{ObjectId, SnmpError, SnmpResult, SnmpTransport, SnmpValue, SnmpVariable};

#[derive(Default)]
pub struct MockAgent {
    mib: Mutex<BTreeMap<ObjectId, SnmpValue>>,
    bulk: bool,
    /// Number of upcoming requests that time out before the agent answers again.
    transient_timeouts: AtomicUsize,
    /// GETNEXT requests for these OIDs always time out.
    dead_oids: Mutex<HashSet<ObjectId>>,
    /// Forced GETNEXT answers, used to simulate broken agents.
    next_overrides: Mutex<HashMap<ObjectId, SnmpVariable>>,
    requests: AtomicUsize,
}

impl MockAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bulk(mut self) -> Self {
        self.bulk = true;
        self
    }

    pub fn set(&self, oid: &str, value: SnmpValue) {
        let oid: ObjectId = oid.parse().expect("valid test OID");
        self.mib.lock().insert(oid, value);
    }

    pub fn time_out_next(&self, count: usize) {
        self.transient_timeouts.store(count, Ordering::SeqCst);
    }

    pub fn kill_getnext(&self, oid: &str) {
        self.dead_oids.lock().insert(oid.parse().expect("valid test OID"));
    }

    pub fn override_next(&self, request: &str, response: SnmpVariable) {
        self.next_overrides
            .lock()
            .insert(request.parse().expect("valid test OID"), response);
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    fn begin_request(&self) -> SnmpResult<()> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let pending = self.transient_timeouts.load(Ordering::SeqCst);
        if pending > 0 {
            self.transient_timeouts.store(pending - 1, Ordering::SeqCst);
            return Err(SnmpError::Timeout);
        }
        Ok(())
    }

    fn successor(&self, oid: &ObjectId) -> SnmpVariable {
        let mib = self.mib.lock();
        match mib.range((Bound::Excluded(oid.clone()), Bound::Unbounded)).next() {
            Some((next, value)) => SnmpVariable::new(next.clone(), value.clone()),
            None => SnmpVariable::new(oid.clone(), SnmpValue::EndOfMibView),
        }
    }
}

#[async_trait]
impl SnmpTransport for MockAgent {
    async fn get(&self, oids: &[ObjectId]) -> SnmpResult<Vec<SnmpVariable>> {
        self.begin_request()?;
        let mib = self.mib.lock();
        Ok(oids
            .iter()
            .map(|oid| {
                let value = mib.get(oid).cloned().unwrap_or(SnmpValue::NoSuchObject);
                SnmpVariable::new(oid.clone(), value)
            })
            .collect())
    }

    async fn get_next(&self, oid: &ObjectId) -> SnmpResult<SnmpVariable> {
        self.begin_request()?;
        if self.dead_oids.lock().contains(oid) {
            return Err(SnmpError::Timeout);
        }
        if let Some(forced) = self.next_overrides.lock().get(oid) {
            return Ok(forced.clone());
        }
        Ok(self.successor(oid))
    }

    async fn get_bulk(&self, oid: &ObjectId, max_repetitions: u32) -> SnmpResult<Vec<SnmpVariable>> {
        self.begin_request()?;
        let mut out = Vec::new();
        let mut cursor = oid.clone();
        for _ in 0..max_repetitions.max(1) {
            let var = self.successor(&cursor);
            let end = var.value == SnmpValue::EndOfMibView;
            cursor = var.oid.clone();
            out.push(var);
            if end {
                break;
            }
        }
        Ok(out)
    }

    fn supports_bulk(&self) -> bool {
        self.bulk
    }

    fn peer(&self) -> String {
        "mock-agent".to_string()
    }
}
