use super::*;
use crate::runner::RunnerError;
use crate::stage::SimRunner;
use crate::storage::Value;
use maplit::hashmap;
use std::time::Duration;

/// Delegates to a [`SimRunner`] but dawdles after reading the auto-start
/// flag, widening the window overlapping passes would race in.
struct SlowFlagRunner {
    inner: Arc<SimRunner>,
}

impl DialogueRunner for SlowFlagRunner {
    fn name(&self) -> String {
        self.inner.name()
    }

    fn variable_store(&self) -> Option<Arc<VariableStore>> {
        self.inner.variable_store()
    }

    fn set_variable_store(&self, store: Arc<VariableStore>) {
        self.inner.set_variable_store(store)
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }

    fn current_node(&self) -> Option<String> {
        self.inner.current_node()
    }

    fn auto_start(&self) -> bool {
        let flag = self.inner.auto_start();
        std::thread::sleep(Duration::from_millis(25));
        flag
    }

    fn set_auto_start(&self, enabled: bool) {
        self.inner.set_auto_start(enabled)
    }

    fn start_node(&self) -> Option<String> {
        self.inner.start_node()
    }

    fn start(&self, node: &str) -> Result<(), RunnerError> {
        self.inner.start(node)
    }

    fn rebuild_dialogue(&self) -> Result<(), RunnerError> {
        self.inner.rebuild_dialogue()
    }

    fn request_next_line(&self) {
        self.inner.request_next_line()
    }

    fn request_hurry_up(&self) {
        self.inner.request_hurry_up()
    }
}

fn synchronizer() -> (Arc<StateSynchronizer>, Arc<RunnerRegistry>) {
    let registry = RunnerRegistry::new();
    let sync = Arc::new(StateSynchronizer::new(registry.clone(), &Config::default()));
    (sync, registry)
}

#[test]
fn test_first_pass_binds_idle_runner() {
    let (sync, registry) = synchronizer();

    let runner = SimRunner::idle("main");
    let _guard = registry.register(runner.clone());
    assert!(runner.variable_store().is_none());

    let report = sync.rebind_all_runners();

    assert_eq!(report.examined, 1);
    assert_eq!(report.rebound, 1);
    assert_eq!(report.merged, 0);
    assert_eq!(report.failed, 0);

    let bound = runner.variable_store().expect("runner should be bound");
    assert!(Arc::ptr_eq(&bound, &sync.store()));
    assert_eq!(runner.rebuild_count(), 1);
}

#[test]
fn test_rebind_pass_is_idempotent() {
    let (sync, registry) = synchronizer();

    let runner = SimRunner::idle("main");
    let _guard = registry.register(runner.clone());

    sync.rebind_all_runners();
    let second = sync.rebind_all_runners();

    // Second pass sees the runner already bound and does nothing to it
    assert_eq!(second.examined, 1);
    assert_eq!(second.rebound, 0);
    assert_eq!(second.merged, 0);
    assert_eq!(second.auto_started, 0);
    assert_eq!(runner.rebuild_count(), 1);
    assert!(Arc::ptr_eq(
        &runner.variable_store().expect("still bound"),
        &sync.store()
    ));
}

#[test]
fn test_local_state_merges_before_rebind() {
    let (sync, registry) = synchronizer();
    sync.store().set_num("$a", 2.0);
    sync.store().set_num("$b", 3.0);

    // Runner ran ahead of initialization and accumulated $a on its own store
    let runner = SimRunner::idle("early");
    runner.seed_local_store(VariableSnapshot {
        numbers: hashmap! { "$a".to_string() => 1.0 },
        ..Default::default()
    });
    let _guard = registry.register(runner.clone());

    let report = sync.rebind_all_runners();
    assert_eq!(report.merged, 1);
    assert_eq!(report.rebound, 1);

    // Runner-local value wins the collision, unrelated canonical state stays
    let store = sync.store();
    assert_eq!(store.get("$a"), Some(Value::Num(1.0)));
    assert_eq!(store.get("$b"), Some(Value::Num(3.0)));
    assert!(Arc::ptr_eq(
        &runner.variable_store().expect("bound"),
        &store
    ));
}

#[test]
fn test_empty_local_store_rebinds_without_merge() {
    let (sync, registry) = synchronizer();
    sync.store().set_num("$kept", 7.0);

    let runner = SimRunner::idle("blank");
    runner.seed_local_store(VariableSnapshot::default());
    let _guard = registry.register(runner.clone());

    let report = sync.rebind_all_runners();

    assert_eq!(report.merged, 0);
    assert_eq!(report.rebound, 1);
    assert_eq!(sync.store().get("$kept"), Some(Value::Num(7.0)));
}

#[test]
fn test_auto_start_taken_over_exactly_once() {
    let (sync, registry) = synchronizer();

    let runner = SimRunner::auto_starting("auto", "Intro");
    let _guard = registry.register(runner.clone());

    let report = sync.rebind_all_runners();

    assert_eq!(report.auto_started, 1);
    assert!(!runner.auto_start());
    assert!(runner.is_running());
    assert_eq!(runner.current_node().as_deref(), Some("Intro"));
    assert_eq!(runner.start_count(), 1);

    // Later passes must not start it again
    sync.rebind_all_runners();
    assert_eq!(runner.start_count(), 1);
}

#[test]
fn test_auto_start_with_empty_node_only_clears_flag() {
    let (sync, registry) = synchronizer();

    let runner = SimRunner::idle("auto");
    runner.set_auto_start(true);
    runner.set_start_node("");
    let _guard = registry.register(runner.clone());

    let report = sync.rebind_all_runners();

    assert_eq!(report.auto_started, 0);
    assert!(!runner.auto_start());
    assert!(!runner.is_running());
}

#[test]
fn test_auto_start_on_running_runner_not_restarted() {
    let (sync, registry) = synchronizer();

    let runner = SimRunner::auto_starting("auto", "Intro");
    runner.start("Warmup").expect("direct start");
    let _guard = registry.register(runner.clone());

    sync.rebind_all_runners();

    // Flag is consumed but the running dialogue is left alone
    assert!(!runner.auto_start());
    assert_eq!(runner.start_count(), 1);
    assert_eq!(runner.current_node().as_deref(), Some("Warmup"));
}

#[test]
fn test_overlapping_rebind_passes_auto_start_once() {
    let (sync, registry) = synchronizer();

    let runner = SimRunner::auto_starting("auto", "Intro");
    let _guard = registry.register(Arc::new(SlowFlagRunner {
        inner: runner.clone(),
    }));

    // The director rebinds inline while the event listener rebinds on its
    // own worker thread; model that with two simultaneous passes.
    let first = {
        let sync = sync.clone();
        std::thread::spawn(move || sync.rebind_all_runners())
    };
    let second = {
        let sync = sync.clone();
        std::thread::spawn(move || sync.rebind_all_runners())
    };
    first.join().expect("first pass panicked");
    second.join().expect("second pass panicked");

    // One pass wins the takeover; the other finds the flag already cleared
    assert_eq!(runner.start_count(), 1);
    assert!(!runner.auto_start());
    assert!(runner.is_running());
    assert_eq!(runner.current_node().as_deref(), Some("Intro"));
}

#[test]
fn test_rebuild_failure_skips_runner_and_pass_continues() {
    let (sync, registry) = synchronizer();

    let bad = SimRunner::auto_starting("bad", "Intro");
    bad.set_fail_rebuild(true);
    let good = SimRunner::auto_starting("good", "Intro");
    let _g1 = registry.register(bad.clone());
    let _g2 = registry.register(good.clone());

    let report = sync.rebind_all_runners();

    assert_eq!(report.examined, 2);
    assert_eq!(report.rebound, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.auto_started, 1);

    // The failing runner was skipped before its auto-start was handled
    assert!(good.is_running());
    assert!(!bad.is_running());
    assert!(bad.auto_start());

    // It still ended up pointed at the canonical store, so the next pass
    // picks up its pending auto-start without re-merging anything.
    assert!(Arc::ptr_eq(
        &bad.variable_store().expect("store swapped before rebuild"),
        &sync.store()
    ));
    let second = sync.rebind_all_runners();
    assert_eq!(second.merged, 0);
    assert_eq!(second.auto_started, 1);
    assert!(bad.is_running());
}

#[test]
fn test_variables_survive_scene_turnover() {
    let (sync, registry) = synchronizer();

    // Scene 1 comes up and writes state through the canonical store
    let first = SimRunner::idle("scene1");
    let guard = registry.register(first.clone());
    sync.rebind_all_runners();

    let store = first.variable_store().expect("bound");
    store.set_num("$progress", 1.0);
    store.set_str("$last_scene", "Chapter1");

    // Scene teardown destroys the runner entirely
    drop(guard);
    drop(first);
    assert!(registry.is_empty());

    // Scene 2 brings a fresh runner that already collected its own state
    let second = SimRunner::idle("scene2");
    second.seed_local_store(VariableSnapshot {
        numbers: hashmap! { "$progress".to_string() => 2.0 },
        ..Default::default()
    });
    let _guard = registry.register(second.clone());
    sync.rebind_all_runners();

    let store = sync.store();
    assert_eq!(store.get("$progress"), Some(Value::Num(2.0)));
    assert_eq!(
        store.get("$last_scene"),
        Some(Value::Str("Chapter1".to_string()))
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scene_loaded_events_trigger_rebind() {
    let (sync, registry) = synchronizer();
    let events = SceneEvents::new(16);
    let _listener = sync.spawn_event_listener(&events);

    let runner = SimRunner::idle("late");
    let _guard = registry.register(runner.clone());
    assert!(runner.variable_store().is_none());

    events.publish("Chapter2");

    // The listener rebinds on its own task; poll until it has run.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while runner.variable_store().is_none() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "listener never rebound the runner"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(Arc::ptr_eq(
        &runner.variable_store().expect("bound by listener"),
        &sync.store()
    ));
}
