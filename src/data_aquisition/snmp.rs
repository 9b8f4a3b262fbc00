use super::core::{ObjectId, PDU_ERR_NO_SUCH_NAME, SnmpError, SnmpResult, SnmpTransport, SnmpValue, SnmpVariable};
use async_trait::async_trait;
use snmp2::{AsyncSession, Pdu, Version, v3::Security};
use std::{net::SocketAddr, time::Duration};
use tokio::sync::{Mutex, OnceCell};
use tracing::trace;

/// Default per-request timeout when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1500);

/// SNMP client for a single network device, backed by an `snmp2` async session.
///
/// The session is opened lazily on first use and shared by every request; a
/// request that exceeds `timeout` yields [`SnmpError::Timeout`] and leaves the
/// session usable for the next attempt.
pub struct SnmpClient {
    address: SocketAddr,
    community: String,
    snmp_version: Version,
    security: Option<Security>,
    timeout: Duration,
    session: OnceCell<Mutex<AsyncSession>>,
}

impl SnmpClient {
    /// Creates a new SNMP client for a single network device.
    pub fn new(
        address: SocketAddr,
        community: &str,
        snmp_version: Version,
        security: Option<Security>,
    ) -> Self {
        Self {
            address,
            community: community.to_string(),
            snmp_version,
            security,
            timeout: DEFAULT_TIMEOUT,
            session: OnceCell::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Retrieves (opening if needed) the SNMP session for the client.
    async fn get_session(&self) -> SnmpResult<&Mutex<AsyncSession>> {
        self.session
            .get_or_try_init(|| async {
                let session = match self.snmp_version {
                    Version::V1 => {
                        AsyncSession::new_v1(self.address, self.community.as_bytes(), 0).await
                    }
                    Version::V2C => {
                        AsyncSession::new_v2c(self.address, self.community.as_bytes(), 0).await
                    }
                    Version::V3 => match &self.security {
                        Some(security) => AsyncSession::new_v3(self.address, 0, security.clone()).await,
                        None => return Err(SnmpError::NoV3Security),
                    },
                };
                session
                    .map(Mutex::new)
                    .map_err(|e| SnmpError::Socket(e.to_string()))
            })
            .await
    }

    fn timed_out(&self) -> SnmpError {
        trace!(target: "snmp::client", peer = %self.address, "request timed out");
        SnmpError::Timeout
    }
}

fn map_snmp2_error(e: snmp2::Error) -> SnmpError {
    SnmpError::Comm(format!("{e:?}"))
}

/// Converts a response PDU into owned variables, surfacing the PDU error status.
fn collect_varbinds(response: Pdu<'_>) -> SnmpResult<Vec<SnmpVariable>> {
    if response.error_status != 0 {
        return Err(SnmpError::Agent {
            status: response.error_status,
            index: response.error_index,
        });
    }
    response
        .varbinds
        .map(|(oid, value)| Ok(SnmpVariable::new(ObjectId::from_snmp2(&oid)?, SnmpValue::from(&value))))
        .collect()
}

#[async_trait]
impl SnmpTransport for SnmpClient {
    async fn get(&self, oids: &[ObjectId]) -> SnmpResult<Vec<SnmpVariable>> {
        if oids.is_empty() {
            return Err(SnmpError::Param("GET without variables".to_string()));
        }
        // snmp2 binds one variable per GET, so multi-variable requests are issued back to back.
        let mut out = Vec::with_capacity(oids.len());
        for oid in oids {
            let request = oid.to_snmp2()?;
            let vars = {
                let session = self.get_session().await?;
                let mut session = session.lock().await;
                match tokio::time::timeout(self.timeout, session.get(&request)).await {
                    Ok(response) => response.map_err(map_snmp2_error).and_then(collect_varbinds),
                    Err(_) => Err(self.timed_out()),
                }
            };
            match vars {
                Ok(mut vars) if vars.len() == 1 => out.push(vars.remove(0)),
                Ok(vars) => {
                    return Err(SnmpError::BadResponse(format!(
                        "GET {oid} returned {} variables",
                        vars.len()
                    )));
                }
                // v1 agents report a missing instance through the PDU status.
                Err(SnmpError::Agent { status: PDU_ERR_NO_SUCH_NAME, .. }) => {
                    out.push(SnmpVariable::new(oid.clone(), SnmpValue::NoSuchObject))
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    async fn get_next(&self, oid: &ObjectId) -> SnmpResult<SnmpVariable> {
        let request = oid.to_snmp2()?;
        let session = self.get_session().await?;
        let mut session = session.lock().await;
        let response = tokio::time::timeout(self.timeout, session.getnext(&request))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(map_snmp2_error)?;
        let mut vars = collect_varbinds(response)?;
        if vars.len() != 1 {
            return Err(SnmpError::BadResponse(format!(
                "GETNEXT {oid} returned {} variables",
                vars.len()
            )));
        }
        Ok(vars.remove(0))
    }

    async fn get_bulk(&self, oid: &ObjectId, max_repetitions: u32) -> SnmpResult<Vec<SnmpVariable>> {
        if !self.supports_bulk() {
            return Err(SnmpError::Param("GETBULK is not available in SNMPv1".to_string()));
        }
        let request = oid.to_snmp2()?;
        let session = self.get_session().await?;
        let mut session = session.lock().await;
        let response = tokio::time::timeout(self.timeout, session.getbulk(&[&request], 0, max_repetitions))
            .await
            .map_err(|_| self.timed_out())?
            .map_err(map_snmp2_error)?;
        collect_varbinds(response)
    }

    fn supports_bulk(&self) -> bool {
        !matches!(self.snmp_version, Version::V1)
    }

    fn peer(&self) -> String {
        self.address.to_string()
    }
}
