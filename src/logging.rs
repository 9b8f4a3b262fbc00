use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Installs the global tracing subscriber writing compact lines to stderr.
///
/// `RUST_LOG` takes precedence over `default_filter`, e.g.
/// `RUST_LOG=topology::cdp=trace,snmp::walk=debug`.
/// An already installed subscriber is left in place.
pub fn init_logging(default_filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| Error::Config(format!("invalid log filter `{default_filter}`: {e}")))?;

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .compact();

    if let Err(e) = tracing_subscriber::registry().with(filter).with(console).try_init() {
        tracing::debug!("logging already initialised: {e}");
    }
    Ok(())
}
