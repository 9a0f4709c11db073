//! Scene-loaded notifications
//!
//! The synchronizer must react to every completed scene load, including loads
//! the host triggered on its own (not through the director). Hosts publish a
//! [`SceneLoaded`] event here after each load; the synchronizer holds a
//! process-lifetime subscription.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

/// Published by the host once a scene has finished loading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneLoaded {
    pub scene: String,
    pub at: DateTime<Utc>,
}

/// Process-wide scene event bus
///
/// A thin wrapper over a tokio broadcast channel. Publishing with no live
/// subscribers is fine (the event is simply dropped); a subscriber that lags
/// behind sees a `Lagged` error and catches up on the next event, which is
/// safe here because rebinding is idempotent.
pub struct SceneEvents {
    tx: broadcast::Sender<SceneLoaded>,
}

impl SceneEvents {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _) = broadcast::channel(capacity);
        Arc::new(Self { tx })
    }

    /// Announce that `scene` finished loading.
    pub fn publish(&self, scene: impl Into<String>) {
        let event = SceneLoaded {
            scene: scene.into(),
            at: Utc::now(),
        };
        debug!(scene = %event.scene, "scene loaded event published");

        // Err only means nobody is subscribed yet; nothing to do about that.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SceneLoaded> {
        self.tx.subscribe()
    }

    /// Number of live subscriptions, for diagnostics.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
