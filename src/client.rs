//! Client - process-wide facade
//!
//! This is the ONLY stateful module in the crate. It holds the global
//! [`Application`] singleton and provides static methods that delegate to it.
//! Everything else is plain dependency-injected objects; hosts that manage
//! their own composition root can skip this module entirely and call
//! [`crate::application::initialize`] directly.

use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

use crate::application::{self, Application, InitOptions};
use crate::storage::{VariableSnapshot, VariableStore};
use crate::sync::RebindReport;

/// Global application instance (ONLY place with static state)
static APP: std::sync::OnceLock<Application> = std::sync::OnceLock::new();

/// Lock to prevent concurrent initialization
static INIT_LOCK: Mutex<()> = Mutex::const_new(());

/// Static entry points over the process-wide [`Application`]
pub struct Client;

impl Client {
    /// Initialize the process-wide application (call once at startup)
    ///
    /// Idempotent: if an application already exists, the call is a no-op and
    /// the existing instance, and with it the existing canonical store,
    /// stays in place. Losing the startup race is expected, not an error;
    /// the newcomer's would-be application is simply dropped.
    pub async fn initialize(options: InitOptions) -> Result<()> {
        let _guard = INIT_LOCK.lock().await;

        if APP.get().is_some() {
            debug!("application already initialized; deferring to the first instance");
            return Ok(());
        }

        let app = application::initialize(options)?;

        if APP.set(app).is_err() {
            // Unreachable while the init lock is held; kept so a losing
            // instance is dropped rather than leaked if that ever changes.
            debug!("lost initialization race; dropping the duplicate application");
        }

        Ok(())
    }

    /// Check if the client has been initialized
    pub fn is_initialized() -> bool {
        APP.get().is_some()
    }

    /// Switch scenes and optionally start a node.
    pub async fn switch_scene(scene: &str, start_node: Option<&str>) -> Result<()> {
        let app = Self::get_app()?;
        app.switch_scene(scene, start_node).await?;
        Ok(())
    }

    /// Dispatch one script command line.
    pub async fn dispatch(line: &str) -> Result<()> {
        let app = Self::get_app()?;
        app.dispatch(line).await?;
        Ok(())
    }

    /// Run a rebind pass immediately.
    pub fn rebind_now() -> Result<RebindReport> {
        Ok(Self::get_app()?.rebind_now())
    }

    /// The canonical variable store.
    pub fn store() -> Result<Arc<VariableStore>> {
        Ok(Self::get_app()?.store())
    }

    /// Snapshot of the canonical store.
    pub fn snapshot() -> Result<VariableSnapshot> {
        Ok(Self::get_app()?.snapshot())
    }

    fn get_app() -> Result<&'static Application> {
        APP.get()
            .ok_or_else(|| anyhow!("Client not initialized; call Client::initialize first"))
    }
}
