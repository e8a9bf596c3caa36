//! Orchestrator state machine.
//!
//! # State Transitions
//! ```text
//! Created → Starting: start()
//! Starting → Running: every facility started
//! Starting → Failed: a facility failed to load or start
//! Running | Failed → Stopping: stop()
//! Stopping → Stopping: stop() again after a facility failed to stop
//! Stopping → Stopped: every facility stopped
//! ```
//!
//! # Design Decisions
//! - No restart from Stopped
//! - Stopping is terminal for "accepting new work" even if teardown fails

use std::fmt;

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Starting,
    Running,
    Failed,
    Stopping,
    Stopped,
}

impl LifecycleState {
    /// Facilities are up and the process is serving.
    pub fn is_active(self) -> bool {
        self == LifecycleState::Running
    }

    /// Shutdown has begun; never reverts.
    pub fn is_stopping(self) -> bool {
        matches!(self, LifecycleState::Stopping | LifecycleState::Stopped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Starting => "starting",
            LifecycleState::Running => "running",
            LifecycleState::Failed => "failed",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-shot "started" notification.
///
/// Resolves once the orchestrator finishes `start()`. Subscribing after the
/// fact still observes the outcome.
#[derive(Debug, Clone)]
pub struct StartedSignal {
    rx: watch::Receiver<Option<bool>>,
}

impl StartedSignal {
    pub(crate) fn new(rx: watch::Receiver<Option<bool>>) -> Self {
        Self { rx }
    }

    /// `true` if startup completed, `false` if it was aborted or the
    /// orchestrator was dropped first.
    pub async fn wait(mut self) -> bool {
        match self.rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).unwrap_or(false),
            Err(_) => false,
        }
    }

    /// Outcome without waiting; `None` while startup is pending.
    pub fn outcome(&self) -> Option<bool> {
        *self.rx.borrow()
    }
}
