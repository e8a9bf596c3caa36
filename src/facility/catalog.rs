//! Closed table of facility implementations.
//!
//! Maps a facility name to the factory that builds it. The table is filled
//! when the process is assembled; an unknown name is a load error at start.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::facility::intervals::IntervalsFacility;
use crate::facility::registry::normalize_name;
use crate::facility::{Facility, FacilityError, FacilitySetup};

/// Constructor for one facility implementation.
pub type FacilityFactory =
    Arc<dyn Fn(FacilitySetup) -> Result<Box<dyn Facility>, FacilityError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FacilityCatalog {
    factories: BTreeMap<String, FacilityFactory>,
}

impl FacilityCatalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in facilities.
    ///
    /// `intervals` publishes its [`Intervals`](crate::facility::Intervals)
    /// handle for later facilities.
    pub fn builtin() -> Self {
        Self::new().with("intervals", |setup| {
            let intervals = IntervalsFacility::new(setup.namespace.clone());
            setup.publish(intervals.handle());
            Ok(Box::new(intervals) as Box<dyn Facility>)
        })
    }

    /// Register a factory, replacing any previous one for the same name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(FacilitySetup) -> Result<Box<dyn Facility>, FacilityError> + Send + Sync + 'static,
    {
        self.factories.insert(normalize_name(name), Arc::new(factory));
    }

    pub fn with<F>(mut self, name: &str, factory: F) -> Self
    where
        F: Fn(FacilitySetup) -> Result<Box<dyn Facility>, FacilityError> + Send + Sync + 'static,
    {
        self.register(name, factory);
        self
    }

    pub fn get(&self, name: &str) -> Option<FacilityFactory> {
        self.factories.get(&normalize_name(name)).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(&normalize_name(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl fmt::Debug for FacilityCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
