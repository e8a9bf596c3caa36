//! Worker process entry point.
//!
//! # Boot Sequence
//!
//! ```text
//!   --conf source[:group] ...
//!          │
//!          ▼
//!   ┌──────────────┐  invalid   ┌──────────────────────────┐
//!   │ ConfigStore  │──────────▶ │ report every key, exit 1 │
//!   └──────┬───────┘            └──────────────────────────┘
//!          │ runtime section
//!          ▼
//!   ┌──────────────┐    ┌────────────────────────────────────┐
//!   │ logging      │    │ Orchestrator                       │
//!   │ metrics      │───▶│  intervals(-10) → ... → Running    │
//!   └──────────────┘    └──────────────┬─────────────────────┘
//!                                      │ SIGINT / SIGTERM
//!                                      ▼
//!                       stop(): drain critical section,
//!                       reverse teardown, save status
//! ```

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use worker_runtime::config::{ConfigStore, Rules, RuntimeConfig};
use worker_runtime::facility::FacilityCatalog;
use worker_runtime::lifecycle::{signals, Orchestrator, ProcessContext};
use worker_runtime::observability::logging::{bootstrap_subscriber, error_chain, init_logging};
use worker_runtime::observability::metrics::init_metrics;

#[derive(Parser)]
#[command(name = "worker-runtime")]
#[command(about = "Runs a worker process assembled from facilities", long_about = None)]
struct Cli {
    /// Process root holding `config/` and the status directory.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Environment name; selects `<source>.<env>.json` variants.
    #[arg(long, env = "WORKER_ENV", default_value = "development")]
    env: String,

    /// Process type, used as the status file prefix.
    #[arg(long, default_value = "worker")]
    wtype: String,

    /// Configuration source to load, optionally scoped to a group.
    #[arg(long = "conf", value_name = "SOURCE[:GROUP]")]
    conf: Vec<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Start the worker and run until signalled (default)
    Run,
    /// Load and validate configuration, then exit
    Check,
}

/// Load every `--conf` source. Exits the process on the first failure.
fn load_config(cli: &Cli) -> ConfigStore {
    let mut store = ConfigStore::new(&cli.root, cli.env.clone());
    for conf in &cli.conf {
        let (source, group) = match conf.split_once(':') {
            Some((source, group)) => (source, Some(group)),
            None => (conf.as_str(), None),
        };
        store.load_or_exit(source, group, &Rules::new());
    }
    store
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();

    let store = tracing::subscriber::with_default(bootstrap_subscriber(), || load_config(&cli));

    let runtime = match RuntimeConfig::from_tree(store.tree()) {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("invalid runtime config: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(Command::Check) = cli.command {
        println!("configuration OK ({} sources)", cli.conf.len());
        return Ok(());
    }

    init_logging(&runtime);
    tracing::info!(env = %cli.env, wtype = %cli.wtype, root = %cli.root.display(), "worker-runtime starting");

    if let Some(addr) = &runtime.metrics_address {
        match addr.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %addr, "Failed to parse metrics address"),
        }
    }

    let ctx = ProcessContext::new(cli.root.clone(), cli.env.clone(), cli.wtype.clone());
    let mut orchestrator = Orchestrator::new(ctx, store.snapshot(), FacilityCatalog::builtin())?;

    let shutdown = orchestrator.shutdown_handle();
    signals::forward_to(shutdown.clone());

    if let Err(e) = orchestrator.start().await {
        tracing::error!(error = %error_chain(&e), "Startup failed, exiting");
        return Err(e.into());
    }

    shutdown.requested().await;

    if let Err(e) = orchestrator.stop().await {
        tracing::error!(error = %error_chain(&e), "Shutdown failed");
        return Err(e.into());
    }

    if let Err(e) = orchestrator.save_status() {
        tracing::error!(error = %error_chain(&e), "Failed to save status");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
