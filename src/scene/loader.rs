//! Scene loading boundary
//!
//! The host engine owns scene loading; this crate only needs a way to kick a
//! load off and suspend until the engine reports it done.

use std::future::Future;
use std::pin::Pin;

/// A pending scene load. Resolves when the host finishes bringing the scene
/// up, possibly many frames later. There is no cancellation path and no
/// timeout; the director waits as long as the host takes.
pub type SceneLoadFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Implemented by the host's scene/level loading layer
pub trait SceneLoader: Send + Sync {
    /// Begin asynchronously loading the named scene.
    ///
    /// Returns `None` when the loader does not recognize the scene id; the
    /// caller reports that and leaves the current scene untouched.
    fn begin_load(&self, scene: &str) -> Option<SceneLoadFuture>;
}
