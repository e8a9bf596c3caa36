//! Orchestrator lifecycle integration tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use worker_runtime::facility::{
    Facility, FacilityDescriptor, FacilityError, FacilityKey, Intervals, IntervalsFacility,
};
use worker_runtime::lifecycle::{
    LifecycleError, LifecycleHooks, LifecycleState, Orchestrator, StopPolicy,
};
use worker_runtime::status::{StatusMap, StatusStore};

mod common;

use common::{orchestrator, orchestrator_with_config, recording_catalog, Journal, Recorder};

fn fac(name: &str, label: &str, priority: i32) -> FacilityDescriptor {
    FacilityDescriptor::new("fac", name, label).priority(priority)
}

#[tokio::test]
async fn test_start_and_stop_follow_priority() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["timer", "db", "api"]));

    orch.declare([fac("api", "0", 5), fac("db", "0", 0), fac("timer", "0", -10)])
        .unwrap();

    orch.start().await.unwrap();
    assert!(orch.is_active());
    assert_eq!(journal.with_prefix("start:"), vec!["timer:0", "db:0", "api:0"]);

    orch.stop().await.unwrap();
    assert_eq!(orch.state(), LifecycleState::Stopped);
    assert!(!orch.is_active());
    assert_eq!(journal.with_prefix("stop:"), vec!["api:0", "db:0", "timer:0"]);
    assert!(orch.registry().is_empty());
}

#[tokio::test]
async fn test_stop_is_exact_reverse_with_ties() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["a", "b", "c"]));

    orch.declare([
        fac("b", "1", 1),
        fac("a", "x", 0),
        fac("c", "0", -3),
        fac("a", "y", 0),
        fac("b", "2", 1),
        fac("c", "1", 7),
    ])
    .unwrap();

    orch.start().await.unwrap();
    let started = journal.with_prefix("start:");
    assert_eq!(started, vec!["c:0", "a:x", "a:y", "b:1", "b:2", "c:1"]);

    orch.stop().await.unwrap();
    let mut stopped = journal.with_prefix("stop:");
    stopped.reverse();
    assert_eq!(stopped, started);
}

#[tokio::test]
async fn test_builtin_intervals_starts_first() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db"]));
    orch.declare([fac("db", "0", -10)]).unwrap();

    orch.start().await.unwrap();
    let order: Vec<_> = orch.launch_order().iter().map(|k| k.to_string()).collect();
    assert_eq!(order, vec!["intervals_0", "db_0"]);

    let intervals = orch.facility::<IntervalsFacility>("intervals", "0").unwrap();
    assert!(intervals.is_running());
    assert_eq!(intervals.namespace(), "0");

    orch.stop().await.unwrap();
}

#[tokio::test]
async fn test_duplicate_key_aborts_start() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db", "api"]));
    let started = orch.started();

    orch.declare([fac("db", "main", 0), fac("Db", "main", 0), fac("api", "0", 5)])
        .unwrap();

    let err = orch.start().await.unwrap_err();
    assert!(matches!(err, LifecycleError::DuplicateKey(ref key) if key.as_str() == "db_main"));
    assert_eq!(journal.with_prefix("start:"), vec!["db:main"]);
    assert_eq!(orch.state(), LifecycleState::Failed);
    assert!(!orch.is_active());
    assert!(!started.wait().await);
}

#[tokio::test]
async fn test_failed_start_keeps_earlier_facilities() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["timer", "db", "api"]));

    orch.declare([
        fac("timer", "0", -10),
        fac("db", "0", 0).options(json!({"fail_start": true})),
        fac("api", "0", 5),
    ])
    .unwrap();

    let err = orch.start().await.unwrap_err();
    assert!(matches!(err, LifecycleError::FacilityRuntime { op: "start", .. }));
    assert_eq!(journal.with_prefix("start:"), vec!["timer:0", "db:0"]);

    assert!(orch.registry().contains(&FacilityKey::new("timer", "0")));
    assert!(!orch.registry().contains(&FacilityKey::new("api", "0")));

    // A failed start can still be torn down.
    orch.stop().await.unwrap();
    assert_eq!(journal.with_prefix("stop:"), vec!["db:0", "timer:0"]);
}

#[tokio::test]
async fn test_unknown_facility_is_load_error() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db"]));
    orch.declare([fac("db", "0", 0), fac("missing", "0", 1), fac("db", "1", 2)])
        .unwrap();

    let err = orch.start().await.unwrap_err();
    assert!(err.is_load_error());
    assert!(matches!(err, LifecycleError::UnknownFacility(ref name) if name == "missing"));
    assert_eq!(journal.with_prefix("start:"), vec!["db:0"]);
}

#[tokio::test]
async fn test_constructor_failure_is_load_error() {
    let root = tempfile::tempdir().unwrap();
    let catalog = recording_catalog(&Journal::new(), &[])
        .with("broken", |_| Err(FacilityError::failed("bad options")));
    let mut orch = orchestrator(root.path(), catalog);
    orch.declare([fac("broken", "0", 0)]).unwrap();

    let err = orch.start().await.unwrap_err();
    assert!(matches!(err, LifecycleError::FacilityLoad { ref name, .. } if name == "broken"));
    assert!(!orch.registry().contains(&FacilityKey::new("broken", "0")));
}

#[tokio::test]
async fn test_stop_waits_for_critical_section() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db"]));
    orch.declare([fac("db", "0", 0)]).unwrap();
    orch.start().await.unwrap();

    let guard = orch.critical().try_enter().unwrap();
    let critical = orch.critical().clone();
    let mut states = orch.subscribe_state();

    let stopping = tokio::spawn(async move {
        let res = orch.stop().await;
        (orch, res)
    });

    states
        .wait_for(|s| *s == LifecycleState::Stopping)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(journal.with_prefix("stop:").is_empty());
    assert!(critical.try_enter().is_none(), "new work must be refused while stopping");

    drop(guard);
    let (orch, res) = tokio::time::timeout(Duration::from_secs(2), stopping)
        .await
        .unwrap()
        .unwrap();
    res.unwrap();
    assert_eq!(journal.with_prefix("stop:"), vec!["db:0"]);
    assert_eq!(orch.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn test_shutdown_timeout_bounds_the_wait() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db"]))
        .with_shutdown_timeout(Some(Duration::from_millis(50)));
    orch.declare([fac("db", "0", 0)]).unwrap();
    orch.start().await.unwrap();

    let _held = orch.critical().try_enter().unwrap();
    tokio::time::timeout(Duration::from_secs(2), orch.stop())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(journal.with_prefix("stop:"), vec!["db:0"]);
}

#[tokio::test]
async fn test_shutdown_timeout_from_runtime_config() {
    let root = tempfile::tempdir().unwrap();
    let config = json!({"runtime": {"shutdown_timeout_secs": 1}});
    let orch = orchestrator_with_config(root.path(), config, recording_catalog(&Journal::new(), &[]));
    assert_eq!(orch.runtime().shutdown_timeout(), Some(Duration::from_secs(1)));
}

#[tokio::test]
async fn test_stop_failure_is_fail_fast() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db", "api"]));
    orch.declare([fac("db", "0", 0), fac("api", "0", 5).options(json!({"fail_stop": true}))])
        .unwrap();
    orch.start().await.unwrap();

    let err = orch.stop().await.unwrap_err();
    assert!(matches!(err, LifecycleError::FacilityRuntime { op: "stop", ref key, .. } if key.as_str() == "api_0"));
    assert_eq!(journal.with_prefix("stop:"), vec!["api:0"]);
    assert!(orch.registry().contains(&FacilityKey::new("db", "0")));
    assert!(orch.is_stopping());
    assert!(matches!(
        orch.remove_facility("db", "0").await,
        Err(LifecycleError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_stop_again_resumes_teardown() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db", "api"]));
    orch.declare([
        fac("db", "0", 0),
        fac("api", "0", 5).options(json!({"fail_stop_once": true})),
    ])
    .unwrap();
    orch.start().await.unwrap();

    assert!(orch.stop().await.is_err());
    assert_eq!(orch.state(), LifecycleState::Stopping);

    orch.stop().await.unwrap();
    assert_eq!(orch.state(), LifecycleState::Stopped);
    assert_eq!(journal.with_prefix("stop:"), vec!["api:0", "api:0", "db:0"]);
    assert!(orch.registry().is_empty());

    assert!(matches!(
        orch.stop().await,
        Err(LifecycleError::InvalidTransition { state: LifecycleState::Stopped, .. })
    ));
}

#[tokio::test]
async fn test_continue_on_error_stops_the_rest() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db", "api"]))
        .with_stop_policy(StopPolicy::ContinueOnError);
    orch.declare([
        fac("db", "0", 0),
        fac("api", "0", 5).options(json!({"fail_stop": true})),
    ])
    .unwrap();
    orch.start().await.unwrap();

    let err = orch.stop().await.unwrap_err();
    assert!(matches!(err, LifecycleError::FacilityRuntime { op: "stop", ref key, .. } if key.as_str() == "api_0"));
    assert_eq!(journal.with_prefix("stop:"), vec!["api:0", "db:0"]);
    assert_eq!(orch.registry().keys(), vec![FacilityKey::new("api", "0")]);
    assert!(orch.is_stopping());
}

/// Schedules a heartbeat on the built-in intervals facility when started.
struct Heartbeat {
    intervals: Intervals,
    beats: Arc<AtomicU32>,
}

#[async_trait]
impl Facility for Heartbeat {
    async fn start(&mut self) -> Result<(), FacilityError> {
        let beats = self.beats.clone();
        self.intervals.add("heartbeat", Duration::from_millis(100), move || {
            beats.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        })
    }

    async fn stop(&mut self) -> Result<(), FacilityError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_facility_schedules_on_builtin_intervals() {
    let root = tempfile::tempdir().unwrap();
    let beats = Arc::new(AtomicU32::new(0));
    let catalog = recording_catalog(&Journal::new(), &[]).with("heartbeat", {
        let beats = beats.clone();
        move |setup| {
            let intervals = setup
                .context
                .handles
                .get::<Intervals>("intervals", "0")
                .ok_or_else(|| FacilityError::failed("intervals not published"))?;
            Ok(Box::new(Heartbeat {
                intervals,
                beats: beats.clone(),
            }) as Box<dyn Facility>)
        }
    });
    let mut orch = orchestrator(root.path(), catalog);
    orch.declare([fac("heartbeat", "0", 0)]).unwrap();
    orch.start().await.unwrap();

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(beats.load(Ordering::SeqCst), 3);
    assert_eq!(orch.facility::<IntervalsFacility>("intervals", "0").unwrap().len(), 1);

    orch.stop().await.unwrap();
    assert!(!orch.handles().contains(&FacilityKey::new("intervals", "0")));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(beats.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_lazy_options_see_earlier_facilities() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let seen: Arc<Mutex<Option<Value>>> = Arc::default();

    let catalog = recording_catalog(&journal, &["timer"]).with("api", {
        let seen = seen.clone();
        let journal = journal.clone();
        move |setup| {
            *seen.lock().unwrap() = Some(setup.options.clone());
            Ok(Box::new(Recorder::from_setup(&setup, journal.clone())) as Box<dyn Facility>)
        }
    });
    let mut orch = orchestrator(root.path(), catalog);

    orch.declare([
        fac("api", "main", 5)
            .lazy_namespace(|owner| format!("ns-{}", owner.registry().len()))
            .lazy_options(|owner| {
                json!({
                    "timer_ready": owner.registry().contains(&FacilityKey::new("timer", "0")),
                    "intervals_ready": owner.facility::<IntervalsFacility>("intervals", "0").is_some(),
                })
            }),
        fac("timer", "0", -1),
    ])
    .unwrap();
    orch.start().await.unwrap();

    let opts = seen.lock().unwrap().clone().unwrap();
    assert_eq!(opts["timer_ready"], true);
    assert_eq!(opts["intervals_ready"], true);
    assert_eq!(opts["ns"], "ns-2");
    assert_eq!(opts["label"], "main");
    assert_eq!(opts["root"], root.path().display().to_string());
    assert!(opts["dirConf"].as_str().unwrap().ends_with("facs"));
}

#[tokio::test]
async fn test_invalid_transitions_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    let mut orch = orchestrator(root.path(), recording_catalog(&Journal::new(), &["db"]));

    assert!(matches!(
        orch.stop().await,
        Err(LifecycleError::InvalidTransition { op: "stop", state: LifecycleState::Created })
    ));

    orch.start().await.unwrap();
    assert!(matches!(
        orch.start().await,
        Err(LifecycleError::InvalidTransition { op: "start", .. })
    ));
    assert!(orch.declare([fac("db", "0", 0)]).is_err());

    orch.stop().await.unwrap();
    assert!(matches!(
        orch.stop().await,
        Err(LifecycleError::InvalidTransition { state: LifecycleState::Stopped, .. })
    ));
    assert!(orch.start().await.is_err());
}

#[tokio::test]
async fn test_runtime_add_and_remove() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db", "cache"]));
    orch.declare([fac("db", "0", 0)]).unwrap();

    assert!(matches!(
        orch.add_facility(fac("cache", "0", -50)).await,
        Err(LifecycleError::InvalidTransition { .. })
    ));

    orch.start().await.unwrap();
    orch.add_facility(fac("cache", "0", -50)).await.unwrap();
    orch.add_facility(fac("cache", "1", -50)).await.unwrap();
    assert!(matches!(
        orch.add_facility(fac("cache", "1", 0)).await,
        Err(LifecycleError::DuplicateKey(_))
    ));

    assert!(orch.remove_facility("cache", "1").await.unwrap());
    assert!(!orch.remove_facility("cache", "1").await.unwrap());

    orch.stop().await.unwrap();
    // Runtime additions stop first regardless of priority.
    assert_eq!(journal.with_prefix("stop:"), vec!["cache:1", "cache:0", "db:0"]);

    assert!(matches!(
        orch.add_facility(fac("cache", "2", 0)).await,
        Err(LifecycleError::ShuttingDown)
    ));
}

#[tokio::test]
async fn test_started_signal() {
    let root = tempfile::tempdir().unwrap();
    let mut orch = orchestrator(root.path(), recording_catalog(&Journal::new(), &["db"]));
    let early = orch.started();
    assert_eq!(early.outcome(), None);

    let waiter = tokio::spawn(early.wait());
    orch.start().await.unwrap();

    assert!(waiter.await.unwrap());
    assert!(orch.started().wait().await, "late listeners still observe it");
    orch.stop().await.unwrap();
}

struct JournalHooks(Journal);

#[async_trait]
impl LifecycleHooks for JournalHooks {
    async fn before_active(&self, owner: &Orchestrator) -> Result<(), FacilityError> {
        self.0.push(format!("hook:before_active:{}", owner.is_active()));
        Ok(())
    }

    async fn after_start(&self, owner: &Orchestrator) -> Result<(), FacilityError> {
        self.0.push(format!("hook:after_start:{}", owner.is_active()));
        Ok(())
    }

    async fn before_stop(&self, owner: &Orchestrator) -> Result<(), FacilityError> {
        self.0.push(format!("hook:before_stop:{}", owner.is_stopping()));
        Ok(())
    }

    async fn after_stop(&self, owner: &Orchestrator) -> Result<(), FacilityError> {
        self.0.push(format!("hook:after_stop:{}", owner.is_active()));
        Ok(())
    }
}

#[tokio::test]
async fn test_hooks_run_around_facilities() {
    let root = tempfile::tempdir().unwrap();
    let journal = Journal::new();
    let mut orch = orchestrator(root.path(), recording_catalog(&journal, &["db"]))
        .with_hooks(JournalHooks(journal.clone()));
    orch.declare([fac("db", "0", 0)]).unwrap();

    orch.start().await.unwrap();
    orch.stop().await.unwrap();

    assert_eq!(
        journal.events(),
        vec![
            "start:db:0",
            "hook:before_active:false",
            "hook:after_start:true",
            "hook:before_stop:true",
            "stop:db:0",
            "hook:after_stop:false",
        ]
    );
}

#[tokio::test]
async fn test_status_loaded_and_saved() {
    let root = tempfile::tempdir().unwrap();
    let store = StatusStore::new(root.path().join("status"), "wrk-test");
    let mut prior = StatusMap::new();
    prior.insert("height".into(), json!(10));
    store.write(&prior).unwrap();

    let catalog = recording_catalog(&Journal::new(), &[]).with("writer", |setup| {
        setup.context.status.set("writer", json!(setup.label));
        Ok(Box::new(IntervalsFacility::new(setup.namespace)) as Box<dyn Facility>)
    });
    let mut orch = orchestrator(root.path(), catalog);
    assert_eq!(orch.status().get("height"), Some(json!(10)));

    orch.declare([fac("writer", "w1", 0)]).unwrap();
    orch.start().await.unwrap();
    orch.status().set("height", json!(11));
    orch.stop().await.unwrap();
    orch.save_status().unwrap();

    let saved = store.read().unwrap();
    assert_eq!(saved.get("height"), Some(&json!(11)));
    assert_eq!(saved.get("writer"), Some(&json!("w1")));
}
