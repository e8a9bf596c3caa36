//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! orchestrator, config, status
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (facility counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Prometheus scrape (optional)
//! ```
//!
//! # Design Decisions
//! - Every facility event carries `facility`/`key` fields
//! - Metric labels use the facility key, as log fields do

pub mod logging;
pub mod metrics;
