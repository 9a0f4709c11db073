//! Dialogue runner collaborator contract
//!
//! A runner drives the dialogue interpreter for one scene. Runners are
//! created and destroyed by the host whenever scenes load and unload; the
//! synchronizer never owns them, it only re-points their store reference and
//! asks them to drop interpreter state cached against a stale store.

use std::sync::Arc;
use thiserror::Error;

use crate::storage::VariableStore;

/// Errors a runner can report back to the synchronizer
///
/// All of these are non-fatal: the rebind pass logs them and moves on to the
/// next runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("node '{0}' not found in the loaded program")]
    NodeNotFound(String),

    #[error("dialogue rebuild failed: {0}")]
    RebuildFailed(String),
}

/// The surface every dialogue runner must expose to the synchronizer
///
/// Implementations live on the host side (the interpreter itself is not part
/// of this crate). Methods take `&self`: runners are shared as
/// `Arc<dyn DialogueRunner>` and are expected to use interior mutability.
pub trait DialogueRunner: Send + Sync {
    /// Human-readable runner name, used in diagnostics only.
    fn name(&self) -> String;

    /// The store this runner currently reads and writes, if any.
    fn variable_store(&self) -> Option<Arc<VariableStore>>;

    /// Re-point the runner at a different store. Takes effect for the next
    /// interpreter step; pair with [`rebuild_dialogue`](Self::rebuild_dialogue)
    /// to drop state already built against the old store.
    fn set_variable_store(&self, store: Arc<VariableStore>);

    /// Whether the runner is currently executing script nodes.
    fn is_running(&self) -> bool;

    /// The node currently executing, if running.
    fn current_node(&self) -> Option<String>;

    /// Whether the runner wants to start itself as soon as its scene is up.
    fn auto_start(&self) -> bool;

    /// Set or clear the auto-start flag. The synchronizer clears it so a
    /// runner never starts against a store that is still being swapped in.
    fn set_auto_start(&self, enabled: bool);

    /// The node auto-start would begin at. `None` when unconfigured.
    fn start_node(&self) -> Option<String>;

    /// Begin script execution at the named node.
    fn start(&self, node: &str) -> Result<(), RunnerError>;

    /// Discard any cached interpreter instance so the next execution step is
    /// built fresh against the current store. Required side effect of
    /// rebinding; runners that cache interpreter state keyed to their store
    /// at construction time would otherwise keep reading the old one.
    fn rebuild_dialogue(&self) -> Result<(), RunnerError>;

    /// Advance to the next line (the click-to-continue path).
    fn request_next_line(&self);

    /// Hurry the current line to completion (e.g. skip a typewriter effect).
    fn request_hurry_up(&self);
}
