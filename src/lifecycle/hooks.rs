//! Process-specific extension points around start and stop.

use async_trait::async_trait;

use crate::facility::FacilityError;
use crate::lifecycle::orchestrator::Orchestrator;

/// Hooks a concrete worker plugs into the lifecycle.
///
/// Call order:
/// ```text
/// start: facilities → before_active → (Running) → after_start → started signal
/// stop:  (Stopping) → critical section clear → before_stop → facilities
///        → (Stopped) → after_stop
/// ```
#[async_trait]
pub trait LifecycleHooks: Send + Sync {
    async fn before_active(&self, _owner: &Orchestrator) -> Result<(), FacilityError> {
        Ok(())
    }

    async fn after_start(&self, _owner: &Orchestrator) -> Result<(), FacilityError> {
        Ok(())
    }

    async fn before_stop(&self, _owner: &Orchestrator) -> Result<(), FacilityError> {
        Ok(())
    }

    async fn after_stop(&self, _owner: &Orchestrator) -> Result<(), FacilityError> {
        Ok(())
    }
}

/// No-op hooks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}
