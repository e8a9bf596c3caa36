//! Facility subsystem.
//!
//! # Data Flow
//! ```text
//! FacilityDescriptor (declared before start)
//!     → orchestrator resolves deferred namespace/options
//!     → catalog.rs (name → factory) constructs Box<dyn Facility>
//!     → registry.rs (identity key → live instance)
//!     → Facility::start / Facility::stop
//! ```
//!
//! # Design Decisions
//! - Implementations come from a closed catalog built with the binary
//! - One live instance per (normalized name, label)
//! - Facilities only see the owner through `FacilityContext`
//! - Earlier facilities are reached through handles they publish

pub mod catalog;
pub mod descriptor;
pub mod handles;
pub mod intervals;
pub mod registry;

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::lifecycle::{CriticalSection, Shutdown};
use crate::status::StatusSnapshot;

pub use catalog::{FacilityCatalog, FacilityFactory};
pub use descriptor::{Deferred, FacilityDescriptor, DEFAULT_PRIORITY};
pub use handles::FacilityHandles;
pub use intervals::{Intervals, IntervalsFacility};
pub use registry::{FacilityKey, FacilityRegistry};

/// Errors reported by a facility's constructor or lifecycle calls.
#[derive(Debug, Error)]
pub enum FacilityError {
    #[error("invalid options: {0}")]
    Options(#[from] serde_json::Error),

    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl FacilityError {
    pub fn failed(reason: impl Into<String>) -> Self {
        FacilityError::Failed(reason.into())
    }
}

/// Downcast support for `dyn Facility`.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// A pluggable unit of the process with an async start/stop contract.
#[async_trait]
pub trait Facility: AsAny + Send + Sync {
    async fn start(&mut self) -> Result<(), FacilityError>;

    async fn stop(&mut self) -> Result<(), FacilityError>;
}

/// The part of the owner a facility may use.
#[derive(Debug, Clone)]
pub struct FacilityContext {
    pub env: String,
    pub root: PathBuf,
    pub config: Arc<Value>,
    pub status: StatusSnapshot,
    pub critical: CriticalSection,
    /// Handles published by facilities launched earlier.
    pub handles: FacilityHandles,
    /// Requests a graceful process shutdown.
    pub shutdown: Shutdown,
}

/// Everything a factory needs to construct one facility instance.
#[derive(Debug, Clone)]
pub struct FacilitySetup {
    /// Identity the instance will be registered under.
    pub key: FacilityKey,
    pub kind: String,
    pub name: String,
    pub namespace: String,
    pub label: String,
    /// Resolved options with `ns`, `label`, `root` and `dirConf` injected.
    pub options: Value,
    pub context: FacilityContext,
}

impl FacilitySetup {
    /// Deserialize the options object into a facility-specific type.
    pub fn options<T: DeserializeOwned>(&self) -> Result<T, FacilityError> {
        Ok(serde_json::from_value(self.options.clone())?)
    }

    /// Share a handle to the instance being built with later facilities.
    ///
    /// Withdrawn when the instance is stopped.
    pub fn publish<T: Any + Send + Sync>(&self, handle: T) {
        self.context.handles.publish(self.key.clone(), handle);
    }
}
