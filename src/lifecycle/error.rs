//! Errors surfaced by the orchestrator.

use thiserror::Error;

use crate::facility::{FacilityError, FacilityKey};
use crate::lifecycle::state::LifecycleState;

#[derive(Debug, Error)]
pub enum LifecycleError {
    /// The operation is not allowed in the current state.
    #[error("cannot {op} while {state}")]
    InvalidTransition {
        op: &'static str,
        state: LifecycleState,
    },

    /// Shutdown has begun; no new facilities are accepted.
    #[error("runtime is shutting down")]
    ShuttingDown,

    /// No factory registered under this name.
    #[error("no facility implementation named `{0}`")]
    UnknownFacility(String),

    /// The factory rejected the setup.
    #[error("facility `{name}` failed to load: {source}")]
    FacilityLoad {
        name: String,
        #[source]
        source: FacilityError,
    },

    /// Two descriptors resolve to the same identity key.
    #[error("duplicate facility key `{0}`")]
    DuplicateKey(FacilityKey),

    /// A facility's own start or stop reported failure.
    #[error("facility `{key}` failed to {op}: {source}")]
    FacilityRuntime {
        key: FacilityKey,
        op: &'static str,
        #[source]
        source: FacilityError,
    },

    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: &'static str,
        #[source]
        source: FacilityError,
    },

    #[error("invalid runtime config: {0}")]
    RuntimeConfig(#[from] serde_json::Error),
}

impl LifecycleError {
    /// Implementation missing or failed to construct.
    pub fn is_load_error(&self) -> bool {
        matches!(
            self,
            LifecycleError::UnknownFacility(_) | LifecycleError::FacilityLoad { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LifecycleError::InvalidTransition {
            op: "start",
            state: LifecycleState::Stopped,
        };
        assert_eq!(err.to_string(), "cannot start while stopped");

        let err = LifecycleError::FacilityRuntime {
            key: FacilityKey::new("db", "main"),
            op: "stop",
            source: FacilityError::failed("socket closed"),
        };
        assert_eq!(err.to_string(), "facility `db_main` failed to stop: socket closed");
    }

    #[test]
    fn load_errors_are_classified() {
        assert!(LifecycleError::UnknownFacility("x".into()).is_load_error());
        assert!(!LifecycleError::ShuttingDown.is_load_error());
    }
}
