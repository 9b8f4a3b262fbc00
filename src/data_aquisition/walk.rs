/*!
Generic MIB subtree walker.

`SnmpWalk` is a pull-style cursor over every variable below a root OID. It issues
GETNEXT (or GETBULK when the agent speaks SNMPv2c/v3 and the options allow it),
chaining each request from the last OID received, and stops as soon as the agent
leaves the subtree, signals end of view, or answers with a non-increasing OID.

A request that times out is repeated until `max_retries` attempts have been made;
after that the walk ends with [`SnmpError::Timeout`]. Rows already handed out are
never taken back, so callers see "at least the rows that were fetched".
*/

use std::{collections::VecDeque, future::Future};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::core::{ObjectId, PDU_ERR_NO_SUCH_NAME, SnmpError, SnmpResult, SnmpTransport, SnmpVariable};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOptions {
    /// Total attempts per request before the walk gives up.
    pub max_retries: u32,
    pub use_bulk: bool,
    pub max_repetitions: u32,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_retries: 3,
            use_bulk: true,
            max_repetitions: 32,
        }
    }
}

/// Returned by walk callbacks to continue or end the walk early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    Stop,
}

/// Repeats `op` while it times out, up to `attempts` tries in total.
pub(crate) async fn with_retries<T, F, Fut>(attempts: u32, mut op: F) -> SnmpResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SnmpResult<T>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(e) if e.is_retryable() && attempt < attempts => {
                trace!(target: "snmp::walk", attempt, attempts, "request failed ({e}), retrying");
                attempt += 1;
            }
            other => return other,
        }
    }
}

/// Cursor over one MIB subtree.
pub struct SnmpWalk<'a> {
    transport: &'a dyn SnmpTransport,
    root: ObjectId,
    cursor: ObjectId,
    options: WalkOptions,
    buffer: VecDeque<SnmpVariable>,
    cancel: Option<CancellationToken>,
    finished: bool,
    rows: usize,
}

impl<'a> SnmpWalk<'a> {
    pub fn new(transport: &'a dyn SnmpTransport, root: ObjectId, options: WalkOptions) -> Self {
        Self {
            transport,
            cursor: root.clone(),
            root,
            options,
            buffer: VecDeque::new(),
            cancel: None,
            finished: false,
            rows: 0,
        }
    }

    /// Ends the walk quietly at the next row boundary once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn root(&self) -> &ObjectId {
        &self.root
    }

    /// Number of rows delivered so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    fn use_bulk(&self) -> bool {
        self.options.use_bulk && self.transport.supports_bulk()
    }

    fn finish<T>(&mut self, result: Option<T>) -> Option<T> {
        self.finished = true;
        self.buffer.clear();
        result
    }

    /// Next variable in the subtree, `None` once the walk is over.
    pub async fn next(&mut self) -> Option<SnmpResult<SnmpVariable>> {
        loop {
            if self.finished {
                return None;
            }
            if self.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                debug!(target: "snmp::walk", root = %self.root, rows = self.rows, "walk cancelled");
                return self.finish(None);
            }

            if let Some(var) = self.buffer.pop_front() {
                if var.value.is_exception() || !var.oid.is_under(&self.root) {
                    trace!(target: "snmp::walk", root = %self.root, rows = self.rows, "end of subtree at {}", var.oid);
                    return self.finish(None);
                }
                if var.oid <= self.cursor {
                    return self.finish(Some(Err(SnmpError::BadResponse(format!(
                        "agent returned non-increasing OID {} after {}",
                        var.oid, self.cursor
                    )))));
                }
                self.cursor = var.oid.clone();
                self.rows += 1;
                return Some(Ok(var));
            }

            match self.fetch().await {
                Ok(batch) if batch.is_empty() => return self.finish(None),
                Ok(batch) => self.buffer.extend(batch),
                // SNMPv1 agents signal end of MIB view this way
                Err(SnmpError::Agent { status: PDU_ERR_NO_SUCH_NAME, .. }) => return self.finish(None),
                Err(e) => {
                    debug!(target: "snmp::walk", root = %self.root, peer = %self.transport.peer(), rows = self.rows, "walk aborted: {e}");
                    return self.finish(Some(Err(e)));
                }
            }
        }
    }

    async fn fetch(&self) -> SnmpResult<Vec<SnmpVariable>> {
        let transport = self.transport;
        let cursor = &self.cursor;
        if self.use_bulk() {
            let repetitions = self.options.max_repetitions.max(1);
            with_retries(self.options.max_retries, || transport.get_bulk(cursor, repetitions)).await
        } else {
            with_retries(self.options.max_retries, || transport.get_next(cursor))
                .await
                .map(|var| vec![var])
        }
    }
}

/// Walks `root`, handing every variable to `callback`.
///
/// Returns the number of rows delivered. A walk-level failure is returned as is;
/// the callback has already seen every row fetched before it.
pub async fn snmp_walk<F>(
    transport: &dyn SnmpTransport,
    root: &ObjectId,
    options: &WalkOptions,
    cancel: Option<&CancellationToken>,
    mut callback: F,
) -> SnmpResult<usize>
where
    F: FnMut(&SnmpVariable) -> WalkControl,
{
    let mut walk = SnmpWalk::new(transport, root.clone(), options.clone());
    if let Some(token) = cancel {
        walk = walk.with_cancellation(token.clone());
    }
    while let Some(var) = walk.next().await {
        if callback(&var?) == WalkControl::Stop {
            break;
        }
    }
    Ok(walk.rows())
}

/// Single GET for `oids` with the walker's retry policy.
pub async fn snmp_get(
    transport: &dyn SnmpTransport,
    oids: &[ObjectId],
    max_retries: u32,
) -> SnmpResult<Vec<SnmpVariable>> {
    with_retries(max_retries, || transport.get(oids)).await
}
