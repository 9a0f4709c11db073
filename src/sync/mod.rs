//! Shared state synchronization
//!
//! The host tears the whole scene down on every transition, dialogue runners
//! included, but the story's variables must act like one continuous store.
//! [`StateSynchronizer`] owns that canonical store and re-points every
//! registered runner at it after each scene load, folding in whatever state a
//! runner accumulated on a private store before the canonical one reached it.
//!
//! A rebind pass runs in three situations:
//! - once at composition-root initialization, for runners registered early
//! - inline after every director-driven scene switch, before any node starts
//! - from the background listener, for every scene-loaded event regardless of
//!   who triggered the load

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::registry::RunnerRegistry;
use crate::runner::DialogueRunner;
use crate::scene::events::SceneEvents;
use crate::storage::{VariableSnapshot, VariableStore};

#[cfg(test)]
mod tests;

/// Outcome counts for one rebind pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RebindReport {
    /// Runners the pass looked at.
    pub examined: usize,
    /// Runners newly pointed at the canonical store.
    pub rebound: usize,
    /// Runners whose local variables were merged into the canonical store.
    pub merged: usize,
    /// Runners whose suppressed auto-start was taken over and executed.
    pub auto_started: usize,
    /// Runners skipped because their dialogue rebuild failed.
    pub failed: usize,
}

/// Owner of the canonical variable store
///
/// Constructed once by the composition root and passed explicitly to
/// whoever needs it; the process-wide single-instance guarantee lives in
/// [`crate::client::Client`], not here.
pub struct StateSynchronizer {
    store: Arc<VariableStore>,
    registry: Arc<RunnerRegistry>,
    verbose_variables: bool,
    // Serializes whole rebind passes. The director's inline pass and the
    // listener task can run on different worker threads at once; without
    // serialization both could see a runner's auto-start flag set and start
    // it twice.
    pass_lock: std::sync::Mutex<()>,
}

impl StateSynchronizer {
    /// Create the synchronizer and, with it, the canonical store. The store
    /// lives as long as the synchronizer, which in practice means the process.
    pub fn new(registry: Arc<RunnerRegistry>, config: &Config) -> Self {
        Self {
            store: Arc::new(VariableStore::new()),
            registry,
            verbose_variables: config.verbose_variables,
            pass_lock: std::sync::Mutex::new(()),
        }
    }

    /// Handle to the canonical store.
    pub fn store(&self) -> Arc<VariableStore> {
        self.store.clone()
    }

    /// Snapshot of the canonical store, for diagnostics and hosts.
    pub fn snapshot(&self) -> VariableSnapshot {
        self.store.get_all()
    }

    /// Point every registered runner at the canonical store.
    ///
    /// Per runner: skip if already bound (idempotent); otherwise merge any
    /// runner-local variables into the canonical store (incoming values win),
    /// swap the store reference, and force a dialogue rebuild so no cached
    /// interpreter keeps reading the old store. Runners holding a suppressed
    /// auto-start are started explicitly once the store is attached.
    ///
    /// Every step is best-effort: a runner that cannot complete the pass is
    /// logged and skipped, the rest are still processed.
    ///
    /// Passes never overlap: a caller that arrives while another pass is in
    /// flight waits for it, then runs its own. The pass contains no awaits,
    /// so the wait is short.
    pub fn rebind_all_runners(&self) -> RebindReport {
        let _pass = self.pass_lock.lock().expect("rebind pass lock poisoned");
        let mut report = RebindReport::default();

        for runner in self.registry.runners() {
            report.examined += 1;
            self.rebind_runner(&runner, &mut report);
        }

        if report.rebound > 0 || report.merged > 0 || report.auto_started > 0 || report.failed > 0
        {
            info!(
                examined = report.examined,
                rebound = report.rebound,
                merged = report.merged,
                auto_started = report.auto_started,
                failed = report.failed,
                "rebind pass complete"
            );
        } else {
            debug!(examined = report.examined, "rebind pass complete; nothing to do");
        }

        if self.verbose_variables {
            self.log_snapshot("rebind");
        }

        report
    }

    fn rebind_runner(&self, runner: &Arc<dyn DialogueRunner>, report: &mut RebindReport) {
        let bound = runner.variable_store();
        let already_canonical = bound
            .as_ref()
            .map_or(false, |store| Arc::ptr_eq(store, &self.store));

        if !already_canonical {
            // The runner may have begun executing against a private store
            // before the canonical one was attached (e.g. it auto-started
            // ahead of initialization). That state must not be dropped.
            if let Some(local) = bound {
                if local.has_any_variables() {
                    self.store.set_all(local.get_all(), false);
                    report.merged += 1;
                    debug!(
                        runner = %runner.name(),
                        "merged runner-local variables into canonical store"
                    );
                }
            }

            // The reference swaps before the rebuild: a runner whose rebuild
            // fails is already on the canonical store, so a later pass never
            // re-merges its stale local values over fresher canonical ones.
            runner.set_variable_store(self.store.clone());

            if let Err(err) = runner.rebuild_dialogue() {
                warn!(
                    runner = %runner.name(),
                    %err,
                    "dialogue rebuild failed; skipping runner this pass"
                );
                report.failed += 1;
                return;
            }

            report.rebound += 1;
            debug!(runner = %runner.name(), "runner bound to canonical store");
        }

        // Take over auto-start so nothing begins against a store that is
        // still being swapped in. Runs for already-bound runners too.
        if runner.auto_start() {
            runner.set_auto_start(false);

            let node = runner.start_node().filter(|node| !node.is_empty());
            if !runner.is_running() {
                if let Some(node) = node {
                    match runner.start(&node) {
                        Ok(()) => {
                            report.auto_started += 1;
                            info!(
                                runner = %runner.name(),
                                node = %node,
                                "auto-start taken over; dialogue started"
                            );
                        }
                        Err(err) => {
                            warn!(
                                runner = %runner.name(),
                                node = %node,
                                %err,
                                "auto-start node refused"
                            );
                            report.failed += 1;
                        }
                    }
                }
            }
        }
    }

    /// Keep rebinding for as long as the host publishes scene-loaded events.
    ///
    /// The subscription is established synchronously, so events published
    /// right after this call are never missed. The task ends only when the
    /// event bus is dropped, which does not happen in normal operation.
    pub fn spawn_event_listener(self: &Arc<Self>, events: &SceneEvents) -> JoinHandle<()> {
        let mut rx = events.subscribe();
        let sync = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        debug!(scene = %event.scene, "scene loaded; rebinding runners");
                        sync.rebind_all_runners();
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // A rebind repairs whatever the missed events wanted.
                        warn!(missed, "scene event subscription lagged; rebinding to catch up");
                        sync.rebind_all_runners();
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn log_snapshot(&self, context: &str) {
        let snapshot = self.store.get_all();
        debug!(
            context,
            variables = snapshot.len(),
            snapshot = %serde_json::to_string(&snapshot).unwrap_or_default(),
            "canonical store snapshot"
        );
    }
}
