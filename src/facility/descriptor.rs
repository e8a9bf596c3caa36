//! Declarative facility descriptors.

use std::fmt;

use serde_json::{Map, Value};

use crate::lifecycle::Orchestrator;

/// Priority used when a descriptor does not set one.
pub const DEFAULT_PRIORITY: i32 = 0;

/// A value known up front or computed from the orchestrator at start time.
///
/// The lazy arm runs exactly once, when its descriptor is processed, so it
/// can read state left behind by facilities started earlier.
pub enum Deferred<T> {
    Ready(T),
    Lazy(Box<dyn FnOnce(&Orchestrator) -> T + Send + Sync>),
}

impl<T> Deferred<T> {
    pub fn lazy<F>(f: F) -> Self
    where
        F: FnOnce(&Orchestrator) -> T + Send + Sync + 'static,
    {
        Deferred::Lazy(Box::new(f))
    }

    pub fn resolve(self, owner: &Orchestrator) -> T {
        match self {
            Deferred::Ready(value) => value,
            Deferred::Lazy(f) => f(owner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Deferred::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Deferred::Lazy(_) => f.write_str("Lazy(..)"),
        }
    }
}

impl<T> From<T> for Deferred<T> {
    fn from(value: T) -> Self {
        Deferred::Ready(value)
    }
}

/// One entry of the facility table.
#[derive(Debug)]
pub struct FacilityDescriptor {
    /// Category tag, informational only.
    pub kind: String,
    /// Catalog name of the implementation.
    pub name: String,
    pub namespace: Deferred<String>,
    /// Disambiguates instances of the same `name`.
    pub label: String,
    pub options: Deferred<Value>,
    /// Lower starts first, stops last.
    pub priority: i32,
}

impl FacilityDescriptor {
    /// Descriptor with empty options, namespace equal to the label and the
    /// default priority.
    pub fn new(kind: impl Into<String>, name: impl Into<String>, label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            kind: kind.into(),
            name: name.into(),
            namespace: Deferred::Ready(label.clone()),
            label,
            options: Deferred::Ready(Value::Object(Map::new())),
            priority: DEFAULT_PRIORITY,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Deferred::Ready(namespace.into());
        self
    }

    pub fn lazy_namespace<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Orchestrator) -> String + Send + Sync + 'static,
    {
        self.namespace = Deferred::lazy(f);
        self
    }

    pub fn options(mut self, options: Value) -> Self {
        self.options = Deferred::Ready(options);
        self
    }

    pub fn lazy_options<F>(mut self, f: F) -> Self
    where
        F: FnOnce(&Orchestrator) -> Value + Send + Sync + 'static,
    {
        self.options = Deferred::lazy(f);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}
