//! Script-facing command dispatch
//!
//! Scripts reach engine behavior through named commands (`<<load_scene
//! Chapter2 Chapter2Start>>`). The registry maps a command name to an async
//! handler; dispatch parses the line, looks up the handler, and awaits it.
//! The dialogue that issued the command stays paused for the whole await,
//! which is what lets `load_scene` finish the scene switch before the next
//! line runs.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::debug;

use crate::scene::SceneDirector;

/// Boxed future returned by command handlers.
pub type CommandFuture = Pin<Box<dyn Future<Output = Result<(), CommandError>> + Send>>;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("command line is empty")]
    Empty,
    #[error("no command named '{0}' is registered")]
    UnknownCommand(String),
    #[error("a command named '{0}' is already registered")]
    DuplicateCommand(String),
    #[error("command '{name}' expects {expected}, got {got} argument(s)")]
    BadArity {
        name: String,
        expected: String,
        got: usize,
    },
    #[error("command '{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// An async command implementation.
///
/// `invoke` must clone whatever it needs out of `args` before building its
/// future; the future owns its captures and outlives the call.
pub trait CommandHandler: Send + Sync {
    fn invoke(&self, args: &[String]) -> CommandFuture;
}

struct FnHandler<F>(F);

impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(&[String]) -> CommandFuture + Send + Sync,
{
    fn invoke(&self, args: &[String]) -> CommandFuture {
        (self.0)(args)
    }
}

/// Name-to-handler table for script commands
#[derive(Default)]
pub struct CommandRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn CommandHandler>>>,
}

impl CommandRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Bind a handler to a command name. Names are single tokens; a name can
    /// only be bound once.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), CommandError> {
        let name = name.into();
        let mut handlers = self
            .handlers
            .write()
            .expect("command registry lock poisoned");

        if handlers.contains_key(&name) {
            return Err(CommandError::DuplicateCommand(name));
        }

        debug!(command = %name, "command registered");
        handlers.insert(name, handler);
        Ok(())
    }

    /// [`CommandRegistry::register`] for plain closures.
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F) -> Result<(), CommandError>
    where
        F: Fn(&[String]) -> CommandFuture + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnHandler(f)))
    }

    /// Parse a command line and await its handler.
    ///
    /// Accepts both the bare form (`load_scene Chapter2`) and the script form
    /// with angle brackets (`<<load_scene Chapter2>>`). Arguments are
    /// whitespace-separated tokens.
    pub async fn dispatch(&self, line: &str) -> Result<(), CommandError> {
        let line = line.trim();
        let line = line
            .strip_prefix("<<")
            .and_then(|inner| inner.strip_suffix(">>"))
            .unwrap_or(line)
            .trim();

        let mut parts = line.split_whitespace();
        let name = match parts.next() {
            Some(name) => name,
            None => return Err(CommandError::Empty),
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        // Clone the handler out so the table lock never spans the await.
        let handler = {
            self.handlers
                .read()
                .expect("command registry lock poisoned")
                .get(name)
                .cloned()
        };

        let handler = match handler {
            Some(handler) => handler,
            None => return Err(CommandError::UnknownCommand(name.to_string())),
        };

        debug!(command = name, ?args, "dispatching command");
        handler.invoke(&args).await
    }

    /// Registered command names, unordered.
    pub fn names(&self) -> Vec<String> {
        self.handlers
            .read()
            .expect("command registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

/// Bind the built-in `load_scene <scene> [<start node>]` command.
///
/// The handler forwards to [`SceneDirector::switch_scene`] and resolves only
/// when the switch has fully finished, so the issuing dialogue cannot run its
/// next line against a half-loaded scene.
pub fn register_load_scene(
    commands: &CommandRegistry,
    director: Arc<SceneDirector>,
) -> Result<(), CommandError> {
    commands.register_fn("load_scene", move |args| {
        let director = director.clone();
        let args = args.to_vec();

        Box::pin(async move {
            let (scene, node) = match args.len() {
                1 => (args[0].clone(), None),
                2 => (args[0].clone(), Some(args[1].clone())),
                got => {
                    return Err(CommandError::BadArity {
                        name: "load_scene".to_string(),
                        expected: "a scene and an optional start node".to_string(),
                        got,
                    });
                }
            };

            director
                .switch_scene(&scene, node.as_deref())
                .await
                .map_err(|err| CommandError::Failed {
                    name: "load_scene".to_string(),
                    message: err.to_string(),
                })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::registry::RunnerRegistry;
    use crate::scene::loader::{SceneLoadFuture, SceneLoader};
    use crate::stage::SimRunner;
    use crate::sync::StateSynchronizer;
    use std::sync::Mutex;

    struct OneSceneLoader;

    impl SceneLoader for OneSceneLoader {
        fn begin_load(&self, scene: &str) -> Option<SceneLoadFuture> {
            if scene == "Chapter2" {
                Some(Box::pin(async {}))
            } else {
                None
            }
        }
    }

    fn wired_commands() -> (Arc<CommandRegistry>, Arc<RunnerRegistry>) {
        let registry = RunnerRegistry::new();
        let sync = Arc::new(StateSynchronizer::new(registry.clone(), &Config::default()));
        let director = Arc::new(SceneDirector::new(
            Arc::new(OneSceneLoader),
            sync,
            registry.clone(),
        ));
        let commands = CommandRegistry::new();
        register_load_scene(&commands, director).expect("fresh registry");
        (commands, registry)
    }

    #[tokio::test]
    async fn test_dispatch_parses_name_and_args() {
        let commands = CommandRegistry::new();
        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        commands
            .register_fn("probe", move |args| {
                let sink = sink.clone();
                let args = args.to_vec();
                Box::pin(async move {
                    *sink.lock().unwrap() = args;
                    Ok(())
                })
            })
            .unwrap();

        commands.dispatch("probe one two").await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_angle_bracket_form_accepted() {
        let commands = CommandRegistry::new();
        let hits = Arc::new(Mutex::new(0usize));

        let sink = hits.clone();
        commands
            .register_fn("probe", move |_args| {
                let sink = sink.clone();
                Box::pin(async move {
                    *sink.lock().unwrap() += 1;
                    Ok(())
                })
            })
            .unwrap();

        commands.dispatch("<<probe>>").await.unwrap();
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unknown_and_empty_lines_are_reported() {
        let commands = CommandRegistry::new();

        let err = commands.dispatch("nope").await.unwrap_err();
        assert!(matches!(err, CommandError::UnknownCommand(name) if name == "nope"));

        let err = commands.dispatch("   ").await.unwrap_err();
        assert!(matches!(err, CommandError::Empty));
    }

    #[tokio::test]
    async fn test_duplicate_registration_rejected() {
        let commands = CommandRegistry::new();
        commands
            .register_fn("probe", |_| Box::pin(async { Ok(()) }))
            .unwrap();

        let err = commands
            .register_fn("probe", |_| Box::pin(async { Ok(()) }))
            .unwrap_err();
        assert!(matches!(err, CommandError::DuplicateCommand(name) if name == "probe"));
    }

    #[tokio::test]
    async fn test_load_scene_switches_and_starts_node() {
        let (commands, registry) = wired_commands();
        let runner = SimRunner::idle("main");
        let _guard = registry.register(runner.clone());

        commands
            .dispatch("<<load_scene Chapter2 Chapter2Start>>")
            .await
            .unwrap();

        assert!(runner.is_running());
        assert_eq!(runner.current_node().as_deref(), Some("Chapter2Start"));
        assert!(runner.variable_store().is_some());
    }

    #[tokio::test]
    async fn test_load_scene_without_node_only_loads() {
        let (commands, registry) = wired_commands();
        let runner = SimRunner::idle("main");
        let _guard = registry.register(runner.clone());

        commands.dispatch("load_scene Chapter2").await.unwrap();

        assert!(!runner.is_running());
        assert!(runner.variable_store().is_some());
    }

    #[tokio::test]
    async fn test_load_scene_arity_checked() {
        let (commands, _registry) = wired_commands();

        let err = commands.dispatch("load_scene").await.unwrap_err();
        assert!(matches!(err, CommandError::BadArity { got: 0, .. }));

        let err = commands.dispatch("load_scene a b c").await.unwrap_err();
        assert!(matches!(err, CommandError::BadArity { got: 3, .. }));
    }

    #[tokio::test]
    async fn test_load_scene_unknown_scene_fails_gracefully() {
        let (commands, registry) = wired_commands();
        let runner = SimRunner::idle("main");
        let _guard = registry.register(runner.clone());

        let err = commands.dispatch("load_scene Missing").await.unwrap_err();

        assert!(matches!(err, CommandError::Failed { .. }));
        assert!(!runner.is_running());
    }
}
