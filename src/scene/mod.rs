// Scene transition module
//
// This module covers everything between "a script asked for another scene"
// and "the new scene is ready to execute":
// - The loader boundary the host engine implements
// - The process-wide scene-loaded notification bus
// - The director that drives switch-and-start transitions

pub mod director;
pub mod events;
pub mod loader;

// Re-export public API
pub use director::{SceneDirector, SceneError, TransitionOutcome, TransitionRecord};
pub use events::{SceneEvents, SceneLoaded};
pub use loader::{SceneLoadFuture, SceneLoader};
