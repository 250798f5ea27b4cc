//! Application state and composition.

use std::sync::Arc;

use crate::api::ConnectionManager;
use crate::extensions::{ExtensionError, ExtensionHost};
use crate::infrastructure::{
    clock::SystemClock,
    config::EngineConfig,
    ports::{ClockPort, SnapshotStore},
};
use crate::lifecycle::LifecycleRegistry;
use crate::pipeline::PipelineDeps;
use crate::registry::HandlerRegistry;
use crate::sessions::SessionManager;

/// Main application state.
///
/// Owns the handler registry, the extension host and the running sessions.
/// Passed to WebSocket handlers via Axum state.
pub struct App {
    pub config: EngineConfig,
    pub registry: Arc<HandlerRegistry>,
    pub lifecycle: Arc<LifecycleRegistry>,
    pub extensions: ExtensionHost,
    pub connections: Arc<ConnectionManager>,
    pub sessions: SessionManager,
    pub clock: Arc<dyn ClockPort>,
}

impl App {
    /// Compose the engine with the core handlers installed.
    pub fn new(config: EngineConfig, snapshots: Arc<dyn SnapshotStore>) -> Result<Self, ExtensionError> {
        Self::with_clock(config, snapshots, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: EngineConfig,
        snapshots: Arc<dyn SnapshotStore>,
        clock: Arc<dyn ClockPort>,
    ) -> Result<Self, ExtensionError> {
        let registry = Arc::new(HandlerRegistry::new());
        let lifecycle = Arc::new(LifecycleRegistry::new());
        let extensions = ExtensionHost::new(registry.clone(), lifecycle.clone());
        extensions.install_core()?;

        let connections = Arc::new(ConnectionManager::new());
        let deps = PipelineDeps {
            registry: registry.clone(),
            broadcaster: connections.clone(),
            snapshots,
            clock: clock.clone(),
        };
        let sessions = SessionManager::new(deps, config.pipeline.clone());

        Ok(Self {
            config,
            registry,
            lifecycle,
            extensions,
            connections,
            sessions,
            clock,
        })
    }
}
