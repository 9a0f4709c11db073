//! Scene transitions
//!
//! [`SceneDirector::switch_scene`] is the "switch scene, then start node X"
//! operation scripts reach through the `load_scene` command. It is async and
//! cancel-free: once a load is requested it runs to completion or fails
//! outright, and the director waits indefinitely for the host's completion
//! signal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::registry::RunnerRegistry;
use crate::scene::loader::SceneLoader;
use crate::sync::StateSynchronizer;

/// Reported, non-fatal transition failures
#[derive(Debug, Error)]
pub enum SceneError {
    /// The loader refused the scene id. The previous scene's state keeps
    /// running; nothing was torn down.
    #[error("scene '{0}' can't be loaded; is it registered with the scene loader?")]
    UnknownScene(String),
}

/// How a transition ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    /// Loader refused the scene id; no load happened.
    UnknownScene,
    /// Scene loaded but no runner was found to start.
    NoRunner,
    /// Scene loaded; no start node was requested, so nothing was started.
    Loaded,
    /// Scene loaded and the named node was started on a runner.
    Started(String),
    /// Scene loaded but the runner refused the start node.
    StartFailed(String),
}

/// One entry in the director's transition history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub scene: String,
    pub start_node: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub outcome: TransitionOutcome,
}

/// Drives scene switches and the post-switch start-node kickoff
pub struct SceneDirector {
    loader: Arc<dyn SceneLoader>,
    sync: Arc<StateSynchronizer>,
    registry: Arc<RunnerRegistry>,
    history: RwLock<Vec<TransitionRecord>>,
}

impl SceneDirector {
    pub fn new(
        loader: Arc<dyn SceneLoader>,
        sync: Arc<StateSynchronizer>,
        registry: Arc<RunnerRegistry>,
    ) -> Self {
        Self {
            loader,
            sync,
            registry,
            history: RwLock::new(Vec::new()),
        }
    }

    /// Switch to `scene`, rebind every runner to the canonical store, then
    /// start `start_node` on a discovered runner if one was given.
    ///
    /// Guarantees, in order:
    /// 1. An unknown scene id is reported and changes nothing.
    /// 2. The call suspends until the host finishes the load.
    /// 3. Runners are rebound before any node is started, so nothing executes
    ///    in the new scene against a store that is not the canonical one.
    /// 4. A missing runner or a refused start node is logged, not fatal.
    pub async fn switch_scene(
        &self,
        scene: &str,
        start_node: Option<&str>,
    ) -> Result<(), SceneError> {
        // An empty node name means "load only", same as no node at all.
        let start_node = start_node.filter(|node| !node.is_empty());
        let requested_at = Utc::now();

        info!(scene, start_node, "scene switch requested");

        let Some(load) = self.loader.begin_load(scene) else {
            error!(
                scene,
                "scene can't be loaded; is it registered with the scene loader?"
            );
            self.record(TransitionRecord {
                scene: scene.to_string(),
                start_node: start_node.map(str::to_string),
                requested_at,
                completed_at: None,
                outcome: TransitionOutcome::UnknownScene,
            });
            return Err(SceneError::UnknownScene(scene.to_string()));
        };

        load.await;

        // Rebind before anything can execute in the new scene.
        self.sync.rebind_all_runners();

        let outcome = match self.registry.find_one() {
            None => {
                warn!(scene, "no dialogue runner found after loading scene");
                TransitionOutcome::NoRunner
            }
            Some(runner) => match start_node {
                Some(node) => match runner.start(node) {
                    Ok(()) => {
                        info!(scene, node, runner = %runner.name(), "dialogue started");
                        TransitionOutcome::Started(node.to_string())
                    }
                    Err(err) => {
                        error!(scene, node, runner = %runner.name(), %err, "start node refused");
                        TransitionOutcome::StartFailed(node.to_string())
                    }
                },
                // No node requested; starting is the caller's business.
                None => TransitionOutcome::Loaded,
            },
        };

        self.record(TransitionRecord {
            scene: scene.to_string(),
            start_node: start_node.map(str::to_string),
            requested_at,
            completed_at: Some(Utc::now()),
            outcome,
        });

        Ok(())
    }

    fn record(&self, record: TransitionRecord) {
        self.history
            .write()
            .expect("transition history lock poisoned")
            .push(record);
    }

    /// The most recent transition, if any.
    pub fn last_transition(&self) -> Option<TransitionRecord> {
        self.history
            .read()
            .expect("transition history lock poisoned")
            .last()
            .cloned()
    }

    /// Every transition since process start, oldest first.
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history
            .read()
            .expect("transition history lock poisoned")
            .clone()
    }
}
