//! Built-in recurring timer facility.
//!
//! Declared by every orchestrator at priority -10. Its factory publishes an
//! [`Intervals`] handle, so facilities launched later can fetch it from
//! `FacilityContext::handles` and schedule periodic work.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::facility::{Facility, FacilityError};

#[derive(Debug, Default)]
struct Timers {
    tasks: DashMap<String, JoinHandle<()>>,
    closed: AtomicBool,
}

/// Cloneable handle to a timer table.
#[derive(Debug, Clone, Default)]
pub struct Intervals {
    timers: Arc<Timers>,
}

impl Intervals {
    /// Run `tick` every `period`, first after one full period.
    ///
    /// A timer with the same name is replaced. Ticks never overlap: a slow
    /// tick delays the next one. Fails for a zero period or once the owning
    /// facility has stopped. Must be called inside a tokio runtime.
    pub fn add<F, Fut>(
        &self,
        name: impl Into<String>,
        period: Duration,
        mut tick: F,
    ) -> Result<(), FacilityError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        if period.is_zero() {
            return Err(FacilityError::failed(format!(
                "interval `{name}` needs a non-zero period"
            )));
        }
        if self.is_closed() {
            return Err(FacilityError::failed(format!(
                "cannot add interval `{name}` after intervals stopped"
            )));
        }

        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let handle = tokio::spawn(async move {
            loop {
                ticker.tick().await;
                tick().await;
            }
        });

        tracing::debug!(timer = %name, period_ms = period.as_millis() as u64, "Interval added");
        if let Some(previous) = self.timers.tasks.insert(name.clone(), handle) {
            previous.abort();
        }

        // Lost a race with `close`.
        if self.is_closed() {
            self.remove(&name);
            return Err(FacilityError::failed(format!(
                "cannot add interval `{name}` after intervals stopped"
            )));
        }
        Ok(())
    }

    /// Cancel a timer. Returns whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        match self.timers.tasks.remove(name) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.timers.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.tasks.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.timers.closed.load(Ordering::SeqCst)
    }

    /// Refuse new timers and cancel the existing ones. Returns how many ran.
    fn close(&self) -> usize {
        self.timers.closed.store(true, Ordering::SeqCst);
        self.clear()
    }

    fn clear(&self) -> usize {
        let names: Vec<String> = self.timers.tasks.iter().map(|e| e.key().clone()).collect();
        names.iter().filter(|name| self.remove(name)).count()
    }
}

/// Named periodic tasks, all aborted on stop.
#[derive(Debug)]
pub struct IntervalsFacility {
    namespace: String,
    intervals: Intervals,
    running: bool,
}

impl IntervalsFacility {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            intervals: Intervals::default(),
            running: false,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Shared handle to this facility's timers.
    pub fn handle(&self) -> Intervals {
        self.intervals.clone()
    }

    /// See [`Intervals::add`].
    pub fn add<F, Fut>(
        &self,
        name: impl Into<String>,
        period: Duration,
        tick: F,
    ) -> Result<(), FacilityError>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.intervals.add(name, period, tick)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.intervals.remove(name)
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

#[async_trait]
impl Facility for IntervalsFacility {
    async fn start(&mut self) -> Result<(), FacilityError> {
        self.running = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), FacilityError> {
        let cancelled = self.intervals.close();
        self.running = false;
        tracing::debug!(namespace = %self.namespace, cancelled, "Intervals stopped");
        Ok(())
    }
}

impl Drop for IntervalsFacility {
    fn drop(&mut self) {
        self.intervals.close();
    }
}
