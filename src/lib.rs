pub mod application;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod registry;
pub mod runner;
pub mod scene;
pub mod stage;
pub mod storage;
pub mod sync;

// Re-export main types
pub use registry::{RunnerRegistration, RunnerRegistry};
pub use runner::{DialogueRunner, RunnerError};
pub use scene::{SceneDirector, SceneError, SceneEvents, SceneLoadFuture, SceneLoader};
pub use storage::{Value, VariableSnapshot, VariableStore};
pub use sync::{RebindReport, StateSynchronizer};

// Re-export init API for convenience
pub use application::{initialize, Application, InitBuilder, InitOptions};
pub use client::Client;
