//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (orchestrator.rs + startup.rs):
//!     Declare table → Sort by priority → For each: resolve deferred
//!     namespace/options → construct → register → start → Running
//!
//! Shutdown (orchestrator.rs + critical.rs):
//!     stop() → Stopping → Wait for critical section → Stop facilities
//!     in reverse launch order → Stopped
//!
//! Signals (signals.rs + shutdown.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger → caller runs stop()
//! ```
//!
//! # Design Decisions
//! - Ordered startup: lower priority first, declaration order on ties
//! - Fail fast: any load or start error aborts startup, no rollback
//! - Stop errors fail fast by default; a later `stop` resumes teardown
//! - Shutdown waits for in-flight work, with no deadline unless configured

pub mod critical;
pub mod error;
pub mod hooks;
pub mod orchestrator;
pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod state;

pub use critical::{CriticalGuard, CriticalSection};
pub use error::LifecycleError;
pub use hooks::{LifecycleHooks, NoHooks};
pub use orchestrator::{Orchestrator, ProcessContext, StopPolicy};
pub use shutdown::Shutdown;
pub use state::{LifecycleState, StartedSignal};
