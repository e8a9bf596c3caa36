//! Shared utilities for orchestrator integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use worker_runtime::facility::{Facility, FacilityCatalog, FacilityError, FacilitySetup};
use worker_runtime::lifecycle::{Orchestrator, ProcessContext};

/// Ordered record of lifecycle events across facilities and hooks.
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Events starting with `prefix`, prefix removed.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
            .collect()
    }
}

/// Facility that journals its start/stop and fails on request.
///
/// Options `fail_start` / `fail_stop` make the matching call return an error;
/// `fail_stop_once` fails only the first stop.
pub struct Recorder {
    id: String,
    journal: Journal,
    fail_start: bool,
    fail_stop: bool,
    fail_stop_once: bool,
}

impl Recorder {
    pub fn from_setup(setup: &FacilitySetup, journal: Journal) -> Self {
        let flag = |name: &str| setup.options.get(name).and_then(Value::as_bool).unwrap_or(false);
        Self {
            id: format!("{}:{}", setup.name, setup.label),
            journal,
            fail_start: flag("fail_start"),
            fail_stop: flag("fail_stop"),
            fail_stop_once: flag("fail_stop_once"),
        }
    }
}

#[async_trait]
impl Facility for Recorder {
    async fn start(&mut self) -> Result<(), FacilityError> {
        self.journal.push(format!("start:{}", self.id));
        if self.fail_start {
            return Err(FacilityError::failed(format!("{} refused to start", self.id)));
        }
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), FacilityError> {
        self.journal.push(format!("stop:{}", self.id));
        if std::mem::take(&mut self.fail_stop_once) || self.fail_stop {
            return Err(FacilityError::failed(format!("{} refused to stop", self.id)));
        }
        Ok(())
    }
}

/// Built-in catalog plus a recorder under each of `names`.
pub fn recording_catalog(journal: &Journal, names: &[&str]) -> FacilityCatalog {
    let mut catalog = FacilityCatalog::builtin();
    for name in names {
        let journal = journal.clone();
        catalog.register(name, move |setup| {
            Ok(Box::new(Recorder::from_setup(&setup, journal.clone())) as Box<dyn Facility>)
        });
    }
    catalog
}

pub fn orchestrator(root: &Path, catalog: FacilityCatalog) -> Orchestrator {
    orchestrator_with_config(root, json!({}), catalog)
}

pub fn orchestrator_with_config(root: &Path, config: Value, catalog: FacilityCatalog) -> Orchestrator {
    let ctx = ProcessContext::new(root, "test", "wrk-test");
    Orchestrator::new(ctx, Arc::new(config), catalog).unwrap()
}
