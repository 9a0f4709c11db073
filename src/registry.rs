//! Runner membership
//!
//! Runners announce themselves here when a scene brings them up and are
//! dropped from the list when the scene tears them down. The synchronizer
//! walks the current membership instead of scanning the host's live objects,
//! so a rebind pass sees exactly the runners that exist right now.
//!
//! Registration is RAII: [`RunnerRegistry::register`] returns a
//! [`RunnerRegistration`] guard and dropping the guard deregisters the
//! runner. Results of [`RunnerRegistry::runners`] are a point-in-time
//! snapshot in no particular order; re-fetch after every scene transition.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use tracing::debug;
use uuid::Uuid;

use crate::runner::DialogueRunner;

/// Opaque registry-assigned runner identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RunnerId(String);

impl RunnerId {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RunnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Membership list of every live dialogue runner
#[derive(Default)]
pub struct RunnerRegistry {
    entries: RwLock<HashMap<RunnerId, Arc<dyn DialogueRunner>>>,
}

impl RunnerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Add a runner to the membership list.
    ///
    /// The returned guard deregisters the runner when dropped; hosts keep it
    /// alive for as long as the runner's scene is loaded.
    pub fn register(self: &Arc<Self>, runner: Arc<dyn DialogueRunner>) -> RunnerRegistration {
        let id = RunnerId::generate();
        debug!(runner = %runner.name(), id = %id, "runner registered");

        self.entries
            .write()
            .expect("runner registry lock poisoned")
            .insert(id.clone(), runner);

        RunnerRegistration {
            registry: Arc::downgrade(self),
            id,
        }
    }

    fn deregister(&self, id: &RunnerId) {
        let removed = self
            .entries
            .write()
            .expect("runner registry lock poisoned")
            .remove(id);

        if let Some(runner) = removed {
            debug!(runner = %runner.name(), id = %id, "runner deregistered");
        }
    }

    /// Every currently registered runner, in no particular order.
    pub fn runners(&self) -> Vec<Arc<dyn DialogueRunner>> {
        self.entries
            .read()
            .expect("runner registry lock poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// An arbitrary single runner, for callers that expect at most one.
    pub fn find_one(&self) -> Option<Arc<dyn DialogueRunner>> {
        self.entries
            .read()
            .expect("runner registry lock poisoned")
            .values()
            .next()
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .expect("runner registry lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// RAII membership guard; dropping it removes the runner from the registry
pub struct RunnerRegistration {
    registry: Weak<RunnerRegistry>,
    id: RunnerId,
}

impl RunnerRegistration {
    pub fn id(&self) -> &RunnerId {
        &self.id
    }
}

impl Drop for RunnerRegistration {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(&self.id);
        }
    }
}
