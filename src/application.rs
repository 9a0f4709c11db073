//! Application composition root
//!
//! Builds the whole engine-side object graph (registry, event bus,
//! synchronizer, director, command registry) and wires it together
//! explicitly. Nothing in this crate looks anything up ambiently; components
//! receive their collaborators here and hold them for the process lifetime.
//! The client module is responsible for storing the singleton.

use anyhow::Result;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::commands::{register_load_scene, CommandError, CommandRegistry};
use crate::config::Config;
use crate::registry::RunnerRegistry;
use crate::scene::{SceneDirector, SceneError, SceneEvents, SceneLoader};
use crate::storage::{VariableSnapshot, VariableStore};
use crate::sync::{RebindReport, StateSynchronizer};

/// The fully wired engine instance
///
/// Owns the canonical store (through the synchronizer) and the background
/// scene-event listener. Hosts embed one of these for the process lifetime;
/// it must never be owned by anything scene-scoped, or the store dies with
/// the scene it was supposed to outlive.
pub struct Application {
    config: Config,
    registry: Arc<RunnerRegistry>,
    events: Arc<SceneEvents>,
    synchronizer: Arc<StateSynchronizer>,
    director: Arc<SceneDirector>,
    commands: Arc<CommandRegistry>,
    listener: JoinHandle<()>,
}

impl Application {
    /// Wire an application from its parts. Must run inside a tokio runtime;
    /// the scene-event listener task is spawned here.
    pub fn new(
        config: Config,
        loader: Arc<dyn SceneLoader>,
        registry: Arc<RunnerRegistry>,
        events: Arc<SceneEvents>,
    ) -> Self {
        let synchronizer = Arc::new(StateSynchronizer::new(registry.clone(), &config));
        let listener = synchronizer.spawn_event_listener(&events);

        let director = Arc::new(SceneDirector::new(
            loader,
            synchronizer.clone(),
            registry.clone(),
        ));

        let commands = CommandRegistry::new();
        register_load_scene(&commands, director.clone()).expect("command registry starts empty");

        Self {
            config,
            registry,
            events,
            synchronizer,
            director,
            commands,
            listener,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> Arc<RunnerRegistry> {
        self.registry.clone()
    }

    pub fn events(&self) -> Arc<SceneEvents> {
        self.events.clone()
    }

    pub fn synchronizer(&self) -> Arc<StateSynchronizer> {
        self.synchronizer.clone()
    }

    pub fn director(&self) -> Arc<SceneDirector> {
        self.director.clone()
    }

    pub fn commands(&self) -> Arc<CommandRegistry> {
        self.commands.clone()
    }

    /// The canonical variable store.
    pub fn store(&self) -> Arc<VariableStore> {
        self.synchronizer.store()
    }

    /// Snapshot of the canonical store.
    pub fn snapshot(&self) -> VariableSnapshot {
        self.synchronizer.snapshot()
    }

    /// Switch scenes and optionally start a node, per the director contract.
    pub async fn switch_scene(
        &self,
        scene: &str,
        start_node: Option<&str>,
    ) -> Result<(), SceneError> {
        self.director.switch_scene(scene, start_node).await
    }

    /// Dispatch one script command line.
    pub async fn dispatch(&self, line: &str) -> Result<(), CommandError> {
        self.commands.dispatch(line).await
    }

    /// Run a rebind pass immediately.
    pub fn rebind_now(&self) -> RebindReport {
        self.synchronizer.rebind_all_runners()
    }
}

impl Drop for Application {
    fn drop(&mut self) {
        // Normal operation never drops the application; this exists so a
        // would-be duplicate can self-destruct without leaking its listener.
        self.listener.abort();
    }
}

/// Options for initializing an [`Application`]
pub struct InitOptions {
    /// The host's scene loading layer.
    pub loader: Arc<dyn SceneLoader>,

    /// Already-loaded configuration. When present, the file/env search is
    /// skipped entirely; callers that load config themselves pass it here
    /// instead of having it re-read.
    pub config: Option<Config>,

    /// Config file path (overrides default search).
    pub config_path: Option<String>,

    /// Override the config's verbose-variables flag.
    pub verbose_variables: Option<bool>,

    /// Override the config's scene-event channel capacity.
    pub event_capacity: Option<usize>,

    /// Pre-built runner registry, for hosts that register runners before
    /// initialization. A fresh one is created when absent.
    pub registry: Option<Arc<RunnerRegistry>>,

    /// Pre-built scene event bus. A fresh one is created when absent.
    pub events: Option<Arc<SceneEvents>>,
}

impl InitOptions {
    pub fn new(loader: Arc<dyn SceneLoader>) -> Self {
        Self {
            loader,
            config: None,
            config_path: None,
            verbose_variables: None,
            event_capacity: None,
            registry: None,
            events: None,
        }
    }
}

/// Builder for constructing [`InitOptions`]
pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new(loader: Arc<dyn SceneLoader>) -> Self {
        Self {
            options: InitOptions::new(loader),
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.options.config = Some(config);
        self
    }

    pub fn config_path(mut self, path: impl Into<String>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn verbose_variables(mut self, verbose: bool) -> Self {
        self.options.verbose_variables = Some(verbose);
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.options.event_capacity = Some(capacity);
        self
    }

    pub fn registry(mut self, registry: Arc<RunnerRegistry>) -> Self {
        self.options.registry = Some(registry);
        self
    }

    pub fn events(mut self, events: Arc<SceneEvents>) -> Self {
        self.options.events = Some(events);
        self
    }

    /// Initialize an application with the configured options.
    pub fn init(self) -> Result<Application> {
        initialize(self.options)
    }
}

/// Initialize and return an [`Application`] instance
///
/// Thin wrapper for direct usage (without the Client singleton); embedding
/// hosts that already manage a composition root call this. Must run inside a
/// tokio runtime.
pub fn initialize(options: InitOptions) -> Result<Application> {
    // Bootstrap: take the caller's config, or load one
    let mut config = match options.config {
        Some(config) => config,
        None => Config::builder()
            .config_path(options.config_path.map(std::path::PathBuf::from))
            .build()?,
    };
    if let Some(verbose) = options.verbose_variables {
        config.verbose_variables = verbose;
    }
    if let Some(capacity) = options.event_capacity {
        config.event_capacity = capacity;
    }

    let registry = options.registry.unwrap_or_else(RunnerRegistry::new);
    let events = options
        .events
        .unwrap_or_else(|| SceneEvents::new(config.event_capacity));

    // Instantiate
    let app = Application::new(config, options.loader, registry, events);

    // Initial rebind pass, for runners registered ahead of initialization
    app.rebind_now();

    Ok(app)
}
