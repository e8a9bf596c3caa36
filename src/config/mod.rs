//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config/<source>.json  (or config/<source>.<env>.json)
//!     → loader.rs (read, scope to group)
//!     → validation.rs (compare with <source>.json.example + rules)
//!     → tree.rs (deep-merge into the global tree)
//!     → Arc<Value> snapshot shared with facilities
//!
//! The `runtime` section of the tree:
//!     → schema.rs (RuntimeConfig, typed, defaulted)
//! ```
//!
//! # Design Decisions
//! - Config is built once at boot; there is no hot reload
//! - Validation failures are fatal: the process exits with status 1
//! - All offending keys are reported together

pub mod loader;
pub mod schema;
pub mod tree;
pub mod validation;

pub use loader::{ConfigError, ConfigStore};
pub use schema::RuntimeConfig;
pub use validation::{Rule, Rules, ValidationError, ValidationReport};
