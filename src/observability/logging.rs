//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once per process
//! - Honour `RUST_LOG`, falling back to the configured level
//! - Report config loading on stderr before the global subscriber exists
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, human format for development

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::RuntimeConfig;

/// Build the filter: `RUST_LOG` when set, otherwise `level` for this crate.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("worker_runtime={level},{level}")))
}

/// Plain stderr subscriber for the boot phase, before the `runtime`
/// section is known. Meant for `tracing::subscriber::with_default`.
pub fn bootstrap_subscriber() -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter("info"))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish()
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_logging(config: &RuntimeConfig) {
    let registry = tracing_subscriber::registry().with(env_filter(&config.log_level));

    let res = if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    if res.is_ok() {
        tracing::debug!(level = %config.log_level, json = config.log_json, "Logging initialized");
    }
}

/// Render an error and every `source()` below it on one line.
///
/// A cause whose text the message already ends with is not repeated.
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.ends_with(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}
