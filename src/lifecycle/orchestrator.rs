//! The facility lifecycle orchestrator.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::watch;

use crate::config::RuntimeConfig;
use crate::facility::{
    Facility, FacilityCatalog, FacilityContext, FacilityDescriptor, FacilityHandles, FacilityKey,
    FacilityRegistry, FacilitySetup,
};
use crate::lifecycle::critical::CriticalSection;
use crate::lifecycle::error::LifecycleError;
use crate::lifecycle::hooks::{LifecycleHooks, NoHooks};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::startup::{inject_bookkeeping, order_by_priority, PlannedFacility};
use crate::lifecycle::state::{LifecycleState, StartedSignal};
use crate::observability::metrics;
use crate::status::{StatusError, StatusSnapshot, StatusStore};

#[derive(Debug, Clone, Copy)]
enum Hook {
    BeforeActive,
    AfterStart,
    BeforeStop,
    AfterStop,
}

impl Hook {
    fn as_str(self) -> &'static str {
        match self {
            Hook::BeforeActive => "before_active",
            Hook::AfterStart => "after_start",
            Hook::BeforeStop => "before_stop",
            Hook::AfterStop => "after_stop",
        }
    }
}

/// What `stop` does when a facility fails to stop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StopPolicy {
    /// Return the error at once; facilities not yet reached keep running.
    #[default]
    FailFast,
    /// Stop every remaining facility, then return the first error.
    ContinueOnError,
}

/// Identity of the running process.
#[derive(Debug, Clone)]
pub struct ProcessContext {
    /// Directory holding `config/` and the status directory.
    pub root: PathBuf,
    pub env: String,
    /// Process type; prefixes the status file.
    pub wtype: String,
}

impl ProcessContext {
    pub fn new(root: impl Into<PathBuf>, env: impl Into<String>, wtype: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            env: env.into(),
            wtype: wtype.into(),
        }
    }
}

/// Starts facilities in priority order and stops them in reverse.
///
/// `start` and `stop` take `&mut self`: facility calls are awaited one at a
/// time and never overlap.
pub struct Orchestrator {
    ctx: ProcessContext,
    config: Arc<Value>,
    runtime: RuntimeConfig,
    shutdown_timeout: Option<Duration>,
    stop_policy: StopPolicy,
    catalog: FacilityCatalog,
    table: Vec<FacilityDescriptor>,
    launched: Vec<PlannedFacility>,
    registry: FacilityRegistry,
    handles: FacilityHandles,
    status: StatusSnapshot,
    status_store: StatusStore,
    critical: CriticalSection,
    shutdown: Shutdown,
    hooks: Box<dyn LifecycleHooks>,
    state_tx: watch::Sender<LifecycleState>,
    started_tx: watch::Sender<Option<bool>>,
}

impl Orchestrator {
    /// Build an orchestrator over a loaded configuration tree.
    ///
    /// Reads the `runtime` section, loads the prior status snapshot and
    /// declares the built-in `intervals` facility at priority -10.
    pub fn new(
        ctx: ProcessContext,
        config: Arc<Value>,
        catalog: FacilityCatalog,
    ) -> Result<Self, LifecycleError> {
        let runtime = RuntimeConfig::from_tree(&config)?;
        let status_store = StatusStore::new(ctx.root.join(&runtime.status_dir), ctx.wtype.clone());

        let status = StatusSnapshot::new();
        if let Some(prior) = status_store.read() {
            tracing::info!(entries = prior.len(), path = %status_store.path().display(), "Status loaded");
            status.extend(prior);
        }

        let (state_tx, _) = watch::channel(LifecycleState::Created);
        let (started_tx, _) = watch::channel(None);

        let mut orchestrator = Self {
            ctx,
            config,
            shutdown_timeout: runtime.shutdown_timeout(),
            runtime,
            stop_policy: StopPolicy::default(),
            catalog,
            table: Vec::new(),
            launched: Vec::new(),
            registry: FacilityRegistry::new(),
            handles: FacilityHandles::new(),
            status,
            status_store,
            critical: CriticalSection::new(),
            shutdown: Shutdown::new(),
            hooks: Box::new(NoHooks),
            state_tx,
            started_tx,
        };
        orchestrator.declare([FacilityDescriptor::new("fac", "intervals", "0")
            .namespace("0")
            .priority(-10)])?;

        metrics::record_lifecycle_state(LifecycleState::Created);
        Ok(orchestrator)
    }

    pub fn with_hooks(mut self, hooks: impl LifecycleHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    /// Override the configured bound on waiting for in-flight work.
    pub fn with_shutdown_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_stop_policy(mut self, policy: StopPolicy) -> Self {
        self.stop_policy = policy;
        self
    }

    /// Append descriptors to the facility table. Only valid before `start`.
    pub fn declare(
        &mut self,
        descriptors: impl IntoIterator<Item = FacilityDescriptor>,
    ) -> Result<(), LifecycleError> {
        self.expect_state("declare", &[LifecycleState::Created])?;
        self.table.extend(descriptors);
        Ok(())
    }

    /// Start every declared facility in priority order.
    ///
    /// The first load, duplicate or start failure aborts the sequence:
    /// later facilities are never started, earlier ones stay registered
    /// until `stop`.
    pub async fn start(&mut self) -> Result<(), LifecycleError> {
        self.expect_state("start", &[LifecycleState::Created])?;
        self.set_state(LifecycleState::Starting);

        let mut table = std::mem::take(&mut self.table);
        order_by_priority(&mut table);
        tracing::info!(facilities = table.len(), "Starting facilities");

        for descriptor in table {
            if let Err(e) = self.launch(descriptor).await {
                self.abort_start(&e);
                return Err(e);
            }
        }

        if let Err(e) = self.run_hook(Hook::BeforeActive).await {
            self.abort_start(&e);
            return Err(e);
        }
        self.set_state(LifecycleState::Running);
        if let Err(e) = self.run_hook(Hook::AfterStart).await {
            self.abort_start(&e);
            return Err(e);
        }

        self.started_tx.send_replace(Some(true));
        tracing::info!(facilities = self.registry.len(), "Runtime started");
        Ok(())
    }

    /// Stop every live facility in reverse start order.
    ///
    /// Waits for the critical section to clear first. A facility stop error
    /// is handled per [`StopPolicy`] and leaves the state at `Stopping`;
    /// calling `stop` again resumes the walk with the facilities still live.
    /// `before_stop` runs on the first call only.
    pub async fn stop(&mut self) -> Result<(), LifecycleError> {
        self.expect_state(
            "stop",
            &[LifecycleState::Running, LifecycleState::Failed, LifecycleState::Stopping],
        )?;
        let resuming = self.state() == LifecycleState::Stopping;
        if resuming {
            tracing::info!(live = self.registry.len(), "Resuming stop");
        } else {
            self.set_state(LifecycleState::Stopping);
            self.critical.close();
        }

        self.drain_critical_section().await;
        if !resuming {
            self.run_hook(Hook::BeforeStop).await?;
        }

        let mut first_error = None;
        for index in (0..self.launched.len()).rev() {
            let key = self.launched[index].key.clone();
            if let Err(e) = self.halt(&key).await {
                match self.stop_policy {
                    StopPolicy::FailFast => return Err(e),
                    StopPolicy::ContinueOnError => {
                        tracing::error!(error = %e, "Facility stop failed, continuing");
                        first_error.get_or_insert(e);
                    }
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        self.set_state(LifecycleState::Stopped);
        self.run_hook(Hook::AfterStop).await?;
        tracing::info!("Runtime stopped");
        Ok(())
    }

    /// Start one more facility while running.
    pub async fn add_facility(&mut self, descriptor: FacilityDescriptor) -> Result<(), LifecycleError> {
        if self.is_stopping() {
            return Err(LifecycleError::ShuttingDown);
        }
        self.expect_state("add facility", &[LifecycleState::Running])?;
        self.launch(descriptor).await
    }

    /// Stop and unregister one facility while running.
    ///
    /// Returns `false` if no such facility is live.
    pub async fn remove_facility(&mut self, name: &str, label: &str) -> Result<bool, LifecycleError> {
        if self.is_stopping() {
            return Err(LifecycleError::ShuttingDown);
        }
        self.expect_state("remove facility", &[LifecycleState::Running])?;

        let key = FacilityKey::new(name, label);
        let existed = self.halt(&key).await?;
        self.launched.retain(|p| p.key != key);
        Ok(existed)
    }

    /// Resolve, construct, register and start one descriptor.
    async fn launch(&mut self, descriptor: FacilityDescriptor) -> Result<(), LifecycleError> {
        let planned = PlannedFacility::of(&descriptor);
        let FacilityDescriptor {
            kind,
            name,
            namespace,
            label,
            options,
            priority,
        } = descriptor;

        if self.registry.contains(&planned.key) {
            metrics::record_facility_failure(planned.key.as_str(), "register");
            return Err(LifecycleError::DuplicateKey(planned.key));
        }

        let namespace = namespace.resolve(self);
        let options = options.resolve(self);
        let options = inject_bookkeeping(options, &namespace, &label, &self.ctx.root).map_err(|source| {
            LifecycleError::FacilityLoad {
                name: name.clone(),
                source,
            }
        })?;

        let factory = self.catalog.get(&name).ok_or_else(|| {
            metrics::record_facility_failure(&name, "load");
            LifecycleError::UnknownFacility(name.clone())
        })?;

        let setup = FacilitySetup {
            key: planned.key.clone(),
            kind,
            name: name.clone(),
            namespace,
            label,
            options,
            context: self.facility_context(),
        };
        let facility = factory(setup).map_err(|source| {
            self.handles.withdraw(&planned.key);
            metrics::record_facility_failure(&name, "load");
            LifecycleError::FacilityLoad {
                name: name.clone(),
                source,
            }
        })?;

        let key = planned.key.clone();
        self.launched.push(planned);
        let facility = self
            .registry
            .register(key.clone(), facility)
            .map_err(|dup| LifecycleError::DuplicateKey(dup.0))?;

        let started_at = Instant::now();
        if let Err(source) = facility.start().await {
            metrics::record_facility_failure(key.as_str(), "start");
            return Err(LifecycleError::FacilityRuntime {
                key,
                op: "start",
                source,
            });
        }

        let elapsed = started_at.elapsed();
        metrics::record_facility_started(&key, elapsed);
        metrics::record_active_facilities(self.registry.len());
        tracing::info!(
            facility = %name,
            key = %key,
            priority,
            elapsed_ms = elapsed.as_millis() as u64,
            "Facility started"
        );
        Ok(())
    }

    /// Stop and unregister one facility. `Ok(false)` when it is not live.
    async fn halt(&mut self, key: &FacilityKey) -> Result<bool, LifecycleError> {
        let Some(facility) = self.registry.lookup_mut(key) else {
            tracing::debug!(key = %key, "Facility not live, skipping stop");
            return Ok(false);
        };

        if let Err(source) = facility.stop().await {
            metrics::record_facility_failure(key.as_str(), "stop");
            return Err(LifecycleError::FacilityRuntime {
                key: key.clone(),
                op: "stop",
                source,
            });
        }

        self.registry.unregister(key);
        self.handles.withdraw(key);
        metrics::record_active_facilities(self.registry.len());
        tracing::info!(key = %key, "Facility stopped");
        Ok(true)
    }

    async fn drain_critical_section(&self) {
        if self.critical.is_busy() {
            tracing::info!(in_flight = self.critical.active(), "Waiting for in-flight work");
        }

        match self.shutdown_timeout {
            None => self.critical.wait_clear().await,
            Some(limit) => {
                if tokio::time::timeout(limit, self.critical.wait_clear()).await.is_err() {
                    tracing::warn!(
                        in_flight = self.critical.active(),
                        timeout_ms = limit.as_millis() as u64,
                        "Shutdown timeout elapsed with work in flight, stopping anyway"
                    );
                }
            }
        }
    }

    async fn run_hook(&self, stage: Hook) -> Result<(), LifecycleError> {
        let res = match stage {
            Hook::BeforeActive => self.hooks.before_active(self).await,
            Hook::AfterStart => self.hooks.after_start(self).await,
            Hook::BeforeStop => self.hooks.before_stop(self).await,
            Hook::AfterStop => self.hooks.after_stop(self).await,
        };
        res.map_err(|source| LifecycleError::Hook {
            stage: stage.as_str(),
            source,
        })
    }

    fn abort_start(&mut self, err: &LifecycleError) {
        tracing::error!(error = %err, live = self.registry.len(), "Startup aborted");
        self.set_state(LifecycleState::Failed);
        self.started_tx.send_replace(Some(false));
    }

    fn expect_state(&self, op: &'static str, allowed: &[LifecycleState]) -> Result<(), LifecycleError> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition { op, state })
        }
    }

    fn set_state(&self, next: LifecycleState) {
        let prev = self.state_tx.send_replace(next);
        metrics::record_lifecycle_state(next);
        tracing::debug!(from = %prev, to = %next, "Lifecycle transition");
    }

    fn facility_context(&self) -> FacilityContext {
        FacilityContext {
            env: self.ctx.env.clone(),
            root: self.ctx.root.clone(),
            config: Arc::clone(&self.config),
            status: self.status.clone(),
            critical: self.critical.clone(),
            handles: self.handles.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn state(&self) -> LifecycleState {
        *self.state_tx.borrow()
    }

    /// Facilities are up (`active = 1`).
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Shutdown has begun.
    pub fn is_stopping(&self) -> bool {
        self.state().is_stopping()
    }

    /// Watch every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<LifecycleState> {
        self.state_tx.subscribe()
    }

    /// One-shot notification that `start` completed.
    pub fn started(&self) -> StartedSignal {
        StartedSignal::new(self.started_tx.subscribe())
    }

    pub fn critical(&self) -> &CriticalSection {
        &self.critical
    }

    /// Handle that requests process shutdown.
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn config(&self) -> &Value {
        &self.config
    }

    pub fn runtime(&self) -> &RuntimeConfig {
        &self.runtime
    }

    pub fn context(&self) -> &ProcessContext {
        &self.ctx
    }

    pub fn root(&self) -> &Path {
        &self.ctx.root
    }

    pub fn status(&self) -> &StatusSnapshot {
        &self.status
    }

    /// Write the status snapshot back to disk.
    pub fn save_status(&self) -> Result<(), StatusError> {
        self.status_store.write(&self.status.to_map())
    }

    pub fn registry(&self) -> &FacilityRegistry {
        &self.registry
    }

    /// Handles published by live facilities.
    pub fn handles(&self) -> &FacilityHandles {
        &self.handles
    }

    /// Keys in the order they were launched; stop runs the reverse.
    pub fn launch_order(&self) -> Vec<FacilityKey> {
        self.launched.iter().map(|p| p.key.clone()).collect()
    }

    /// Live facility by name and label, downcast to its concrete type.
    pub fn facility<T: Facility>(&self, name: &str, label: &str) -> Option<&T> {
        self.registry
            .lookup(&FacilityKey::new(name, label))?
            .as_any()
            .downcast_ref::<T>()
    }

    pub fn facility_mut<T: Facility>(&mut self, name: &str, label: &str) -> Option<&mut T> {
        self.registry
            .lookup_mut(&FacilityKey::new(name, label))?
            .as_any_mut()
            .downcast_mut::<T>()
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("ctx", &self.ctx)
            .field("state", &self.state())
            .field("registry", &self.registry)
            .field("catalog", &self.catalog)
            .finish()
    }
}
