//! In-memory reference host
//!
//! A [`Stage`] stands in for the real engine: it "loads" scenes from a
//! declarative [`StagePlan`], tearing down the previous scene's runners and
//! spawning fresh [`SimRunner`]s exactly the way a real host destroys and
//! recreates its objects on every transition. The CLI demo runs against it,
//! and the test suites use `SimRunner` wherever they need a runner that
//! counts what was done to it.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tracing::debug;

use crate::registry::{RunnerRegistration, RunnerRegistry};
use crate::runner::{DialogueRunner, RunnerError};
use crate::scene::events::SceneEvents;
use crate::scene::loader::{SceneLoadFuture, SceneLoader};
use crate::storage::{VariableSnapshot, VariableStore};

/// Declarative description of every scene a [`Stage`] can load
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StagePlan {
    #[serde(default)]
    pub scenes: HashMap<String, ScenePlan>,
}

impl StagePlan {
    pub fn from_toml(source: &str) -> Result<Self> {
        toml::from_str(source).context("Failed to parse stage plan")
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read stage plan {}", path.display()))?;
        Self::from_toml(&source)
    }
}

/// One loadable scene: a simulated load delay and the runners it spawns
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScenePlan {
    /// Milliseconds the simulated load takes; models a multi-frame load.
    pub load_delay_ms: u64,
    pub runners: Vec<RunnerPlan>,
}

/// A runner the scene brings up when it loads
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerPlan {
    pub name: String,
    #[serde(default)]
    pub auto_start: bool,
    #[serde(default)]
    pub start_node: Option<String>,
    /// Variables the runner has already accumulated on a private store by the
    /// time the synchronizer sees it, as if it ran ahead of initialization.
    #[serde(default)]
    pub seed: Option<VariableSnapshot>,
}

struct CurrentScene {
    registrations: Vec<RunnerRegistration>,
    runners: Vec<Arc<SimRunner>>,
}

/// Engine stand-in that loads scenes from a [`StagePlan`]
///
/// Loading a scene drops the previous scene's runner registrations first
/// (scene teardown destroys runners), then registers the new plan's runners
/// and publishes a [`SceneLoaded`](crate::scene::SceneLoaded) event, in that
/// order, so the rebind triggered by the event sees the new membership.
pub struct Stage {
    plan: StagePlan,
    registry: Arc<RunnerRegistry>,
    events: Arc<SceneEvents>,
    current: Arc<Mutex<CurrentScene>>,
}

impl Stage {
    pub fn new(
        plan: StagePlan,
        registry: Arc<RunnerRegistry>,
        events: Arc<SceneEvents>,
    ) -> Arc<Self> {
        Arc::new(Self {
            plan,
            registry,
            events,
            current: Arc::new(Mutex::new(CurrentScene {
                registrations: Vec::new(),
                runners: Vec::new(),
            })),
        })
    }

    /// The runners of the currently loaded scene.
    pub fn current_runners(&self) -> Vec<Arc<SimRunner>> {
        self.current
            .lock()
            .expect("stage lock poisoned")
            .runners
            .clone()
    }

    /// Look up a current-scene runner by name.
    pub fn runner(&self, name: &str) -> Option<Arc<SimRunner>> {
        self.current_runners()
            .into_iter()
            .find(|runner| runner.name() == name)
    }
}

impl SceneLoader for Stage {
    fn begin_load(&self, scene: &str) -> Option<SceneLoadFuture> {
        let plan = self.plan.scenes.get(scene)?.clone();
        let scene = scene.to_string();
        let registry = self.registry.clone();
        let events = self.events.clone();
        let current = self.current.clone();

        Some(Box::pin(async move {
            if plan.load_delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(plan.load_delay_ms)).await;
            }

            // Tear the previous scene down before the new one comes up;
            // dropping the registrations deregisters its runners.
            {
                let mut guard = current.lock().expect("stage lock poisoned");
                guard.registrations.clear();
                guard.runners.clear();
            }

            let mut next = CurrentScene {
                registrations: Vec::new(),
                runners: Vec::new(),
            };
            for runner_plan in &plan.runners {
                let runner = SimRunner::from_plan(runner_plan);
                next.registrations.push(registry.register(runner.clone()));
                next.runners.push(runner);
            }

            {
                let mut guard = current.lock().expect("stage lock poisoned");
                *guard = next;
            }

            debug!(scene = %scene, runners = plan.runners.len(), "stage scene loaded");
            events.publish(scene);
        }))
    }
}

#[derive(Default)]
struct SimState {
    store: Option<Arc<VariableStore>>,
    running: bool,
    current_node: Option<String>,
    auto_start: bool,
    start_node: Option<String>,
    /// `None` accepts any node; `Some` restricts [`SimRunner::start`].
    known_nodes: Option<HashSet<String>>,
    fail_rebuild: bool,
    start_count: usize,
    rebuild_count: usize,
    next_line_count: usize,
    hurry_up_count: usize,
}

/// Reference [`DialogueRunner`] that records everything done to it
///
/// Every mutation is counted so tests can assert exactly-once behavior
/// (starts, rebuilds, line advances) instead of just final state.
pub struct SimRunner {
    name: String,
    state: RwLock<SimState>,
}

impl SimRunner {
    /// A runner with no store, not running, auto-start off.
    pub fn idle(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: RwLock::new(SimState::default()),
        })
    }

    /// A runner configured to start itself at `node` once its scene is up.
    pub fn auto_starting(name: impl Into<String>, node: impl Into<String>) -> Arc<Self> {
        let runner = Self::idle(name);
        {
            let mut state = runner.write();
            state.auto_start = true;
            state.start_node = Some(node.into());
        }
        runner
    }

    fn from_plan(plan: &RunnerPlan) -> Arc<Self> {
        let runner = Self::idle(plan.name.clone());
        {
            let mut state = runner.write();
            state.auto_start = plan.auto_start;
            state.start_node = plan.start_node.clone();
            if let Some(seed) = &plan.seed {
                let store = VariableStore::new();
                store.set_all(seed.clone(), true);
                state.store = Some(Arc::new(store));
            }
        }
        runner
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, SimState> {
        self.state.read().expect("sim runner lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, SimState> {
        self.state.write().expect("sim runner lock poisoned")
    }

    /// Give the runner a private store holding `snapshot`, as if it had been
    /// executing before the canonical store reached it.
    pub fn seed_local_store(&self, snapshot: VariableSnapshot) {
        let store = VariableStore::new();
        store.set_all(snapshot, true);
        self.write().store = Some(Arc::new(store));
    }

    /// Restrict which nodes [`SimRunner::start`] accepts.
    pub fn set_known_nodes<I, S>(&self, nodes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write().known_nodes = Some(nodes.into_iter().map(Into::into).collect());
    }

    /// Make the next [`SimRunner::rebuild_dialogue`] calls fail.
    pub fn set_fail_rebuild(&self, fail: bool) {
        self.write().fail_rebuild = fail;
    }

    pub fn set_start_node(&self, node: impl Into<String>) {
        self.write().start_node = Some(node.into());
    }

    pub fn name(&self) -> String {
        self.name.clone()
    }

    pub fn variable_store(&self) -> Option<Arc<VariableStore>> {
        self.read().store.clone()
    }

    pub fn set_variable_store(&self, store: Arc<VariableStore>) {
        self.write().store = Some(store);
    }

    pub fn is_running(&self) -> bool {
        self.read().running
    }

    pub fn current_node(&self) -> Option<String> {
        self.read().current_node.clone()
    }

    pub fn auto_start(&self) -> bool {
        self.read().auto_start
    }

    pub fn set_auto_start(&self, enabled: bool) {
        self.write().auto_start = enabled;
    }

    pub fn start_node(&self) -> Option<String> {
        self.read().start_node.clone()
    }

    pub fn start(&self, node: &str) -> Result<(), RunnerError> {
        let mut state = self.write();
        if let Some(known) = &state.known_nodes {
            if !known.contains(node) {
                return Err(RunnerError::NodeNotFound(node.to_string()));
            }
        }
        state.running = true;
        state.current_node = Some(node.to_string());
        state.start_count += 1;
        Ok(())
    }

    pub fn rebuild_dialogue(&self) -> Result<(), RunnerError> {
        let mut state = self.write();
        if state.fail_rebuild {
            return Err(RunnerError::RebuildFailed(
                "simulated internal reset failure".to_string(),
            ));
        }
        state.rebuild_count += 1;
        Ok(())
    }

    pub fn request_next_line(&self) {
        self.write().next_line_count += 1;
    }

    pub fn request_hurry_up(&self) {
        self.write().hurry_up_count += 1;
    }

    /// How many times [`SimRunner::start`] succeeded.
    pub fn start_count(&self) -> usize {
        self.read().start_count
    }

    /// How many times the dialogue was rebuilt.
    pub fn rebuild_count(&self) -> usize {
        self.read().rebuild_count
    }

    pub fn next_line_count(&self) -> usize {
        self.read().next_line_count
    }

    pub fn hurry_up_count(&self) -> usize {
        self.read().hurry_up_count
    }
}

impl DialogueRunner for SimRunner {
    fn name(&self) -> String {
        SimRunner::name(self)
    }

    fn variable_store(&self) -> Option<Arc<VariableStore>> {
        SimRunner::variable_store(self)
    }

    fn set_variable_store(&self, store: Arc<VariableStore>) {
        SimRunner::set_variable_store(self, store)
    }

    fn is_running(&self) -> bool {
        SimRunner::is_running(self)
    }

    fn current_node(&self) -> Option<String> {
        SimRunner::current_node(self)
    }

    fn auto_start(&self) -> bool {
        SimRunner::auto_start(self)
    }

    fn set_auto_start(&self, enabled: bool) {
        SimRunner::set_auto_start(self, enabled)
    }

    fn start_node(&self) -> Option<String> {
        SimRunner::start_node(self)
    }

    fn start(&self, node: &str) -> Result<(), RunnerError> {
        SimRunner::start(self, node)
    }

    fn rebuild_dialogue(&self) -> Result<(), RunnerError> {
        SimRunner::rebuild_dialogue(self)
    }

    fn request_next_line(&self) {
        SimRunner::request_next_line(self)
    }

    fn request_hurry_up(&self) {
        SimRunner::request_hurry_up(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Value;

    const PLAN: &str = r#"
[scenes.Chapter1]
load_delay_ms = 1

[[scenes.Chapter1.runners]]
name = "narrator"
auto_start = true
start_node = "Intro"

[scenes.Chapter1.runners.seed]
numbers = { "$affinity" = 2.0 }

[scenes.Chapter2]

[[scenes.Chapter2.runners]]
name = "narrator"
"#;

    fn stage_with(plan: &str) -> (Arc<Stage>, Arc<RunnerRegistry>, Arc<SceneEvents>) {
        let plan = StagePlan::from_toml(plan).expect("plan parses");
        let registry = RunnerRegistry::new();
        let events = SceneEvents::new(8);
        let stage = Stage::new(plan, registry.clone(), events.clone());
        (stage, registry, events)
    }

    #[test]
    fn test_plan_parses_runners_and_seed() {
        let plan = StagePlan::from_toml(PLAN).unwrap();

        let chapter1 = &plan.scenes["Chapter1"];
        assert_eq!(chapter1.load_delay_ms, 1);
        assert_eq!(chapter1.runners.len(), 1);
        assert!(chapter1.runners[0].auto_start);
        assert_eq!(chapter1.runners[0].start_node.as_deref(), Some("Intro"));

        let seed = chapter1.runners[0].seed.as_ref().unwrap();
        assert_eq!(seed.numbers["$affinity"], 2.0);

        assert!(plan.scenes["Chapter2"].runners[0].seed.is_none());
    }

    #[test]
    fn test_unknown_scene_is_refused() {
        let (stage, _registry, _events) = stage_with(PLAN);
        assert!(stage.begin_load("Missing").is_none());
    }

    #[tokio::test]
    async fn test_load_registers_runners_and_publishes() {
        let (stage, registry, events) = stage_with(PLAN);
        let mut rx = events.subscribe();

        stage.begin_load("Chapter1").unwrap().await;

        assert_eq!(registry.len(), 1);
        let runner = stage.runner("narrator").expect("runner spawned");
        assert!(runner.auto_start());
        assert_eq!(
            runner.variable_store().unwrap().get("$affinity"),
            Some(Value::Num(2.0))
        );

        let event = rx.recv().await.unwrap();
        assert_eq!(event.scene, "Chapter1");
    }

    #[tokio::test]
    async fn test_load_replaces_previous_scene_runners() {
        let (stage, registry, _events) = stage_with(PLAN);

        stage.begin_load("Chapter1").unwrap().await;
        let first = stage.runner("narrator").unwrap();

        stage.begin_load("Chapter2").unwrap().await;
        let second = stage.runner("narrator").unwrap();

        // Still exactly one registered runner, and it's the new one
        assert_eq!(registry.len(), 1);
        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.variable_store().is_none());
    }

    #[test]
    fn test_sim_runner_counts_line_advances() {
        let runner = SimRunner::idle("ui");
        runner.request_next_line();
        runner.request_next_line();
        runner.request_hurry_up();

        assert_eq!(runner.next_line_count(), 2);
        assert_eq!(runner.hurry_up_count(), 1);
    }
}
