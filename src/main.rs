use std::{collections::BTreeMap, path::PathBuf, process::ExitCode, sync::Arc};

use clap::Parser;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use netxms_topology::{
    config::DiscoveryConfig,
    inventory::Inventory,
    logging::init_logging,
    topology::{DiscoveryContext, NeighborInfo, TopologyPoller},
};

/// Collects link-layer neighbors of inventory nodes over SNMP.
#[derive(Parser, Debug)]
#[command(name = "netxms-topology")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Discovery settings (JSON); defaults are used when the file does not exist
    #[arg(short, long, default_value = "netxms-topology.json")]
    config: PathBuf,

    /// Node and interface inventory (JSON)
    #[arg(short, long)]
    inventory: PathBuf,

    /// Overrides the configured log filter
    #[arg(short, long)]
    log_filter: Option<String>,

    /// Pretty-print the JSON result
    #[arg(long)]
    pretty: bool,
}

#[derive(Serialize)]
struct NodeReport {
    name: String,
    neighbors: Vec<NeighborInfo>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("netxms-topology: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> netxms_topology::Result<()> {
    let config = DiscoveryConfig::load(&args.config)?;
    init_logging(args.log_filter.as_deref().unwrap_or(&config.log_filter))?;

    let registry = Inventory::load(&args.inventory)?.build_registry(config.snmp.timeout)?;

    let cancel = CancellationToken::new();
    let ctx = DiscoveryContext::new(Arc::clone(&registry))
        .with_options(config.snmp.walk_options())
        .with_cancellation(cancel.clone());
    let poller = TopologyPoller::new(ctx)
        .with_protocols(config.protocols.clone())
        .with_host_connections(config.host_connections);

    let signal_cancel = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("cancellation requested, stopping after the current request");
            signal_cancel.cancel();
        }
    });

    let mut report = BTreeMap::new();
    for (node, neighbors) in poller.poll_all(registry.nodes(), config.max_parallel_polls).await {
        info!(node = %node, neighbors = neighbors.size(), "topology poll finished");
        report.insert(
            node.id(),
            NodeReport {
                name: node.name().to_string(),
                neighbors: neighbors.connections().to_vec(),
            },
        );
    }
    signal_task.abort();

    let json = if args.pretty {
        serde_json::to_string_pretty(&report)?
    } else {
        serde_json::to_string(&report)?
    };
    println!("{json}");
    Ok(())
}
