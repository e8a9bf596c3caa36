//! Facility lifecycle runtime library.
//!
//! Assembles a worker process out of pluggable facilities, starts them in
//! priority order, tears them down in reverse and validates configuration at
//! boot.

pub mod config;
pub mod facility;
pub mod lifecycle;
pub mod observability;
pub mod status;

pub use config::{ConfigStore, RuntimeConfig};
pub use facility::{Facility, FacilityCatalog, FacilityDescriptor};
pub use lifecycle::{Orchestrator, ProcessContext};
