//! Extension registration API.
//!
//! Extensions never touch the registry or the lifecycle manager directly:
//! they receive an [`ExtensionContext`] stamped with their owner id and
//! register through it. Unloading removes everything that owner contributed.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::lifecycle::{LifecycleRegistry, LifecycleResets};
use crate::registry::{
    ActionHandler, HandlerOwner, HandlerRegistration, HandlerRegistry, RegistryError,
};
use crate::use_cases;

const CORE_ID: &str = "core";

/// Code contributed by a content package (a rule system, a house-rules pack).
pub trait Extension: Send + Sync {
    /// Stable id; handler and lifecycle registrations are tagged with it.
    fn id(&self) -> &str;

    fn register(&self, ctx: &mut ExtensionContext) -> Result<(), RegistryError>;
}

/// Owner-scoped view of the registries handed to an extension while it loads.
pub struct ExtensionContext {
    owner: HandlerOwner,
    registry: Arc<HandlerRegistry>,
    lifecycle: Arc<LifecycleRegistry>,
    handlers: usize,
}

impl ExtensionContext {
    fn new(
        owner: HandlerOwner,
        registry: Arc<HandlerRegistry>,
        lifecycle: Arc<LifecycleRegistry>,
    ) -> Self {
        Self {
            owner,
            registry,
            lifecycle,
            handlers: 0,
        }
    }

    pub fn owner(&self) -> &HandlerOwner {
        &self.owner
    }

    pub fn register_handler(
        &mut self,
        action_type: &str,
        priority: i32,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), RegistryError> {
        self.registry.register(
            action_type,
            HandlerRegistration::new(self.owner.clone(), priority, handler),
        )?;
        self.handlers += 1;
        Ok(())
    }

    pub fn register_lifecycle(&mut self, resets: LifecycleResets) {
        self.lifecycle
            .register_lifecycle(self.owner.clone(), resets);
    }

    /// Shared lifecycle manager, for handlers that apply resets themselves.
    pub fn lifecycle(&self) -> Arc<LifecycleRegistry> {
        self.lifecycle.clone()
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ExtensionError {
    #[error("Extension '{0}' is already loaded")]
    AlreadyLoaded(String),
    #[error("Extension '{0}' is not loaded")]
    NotLoaded(String),
    #[error("Extension id '{0}' is reserved")]
    ReservedId(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// What an unload removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unloaded {
    pub handlers: usize,
    pub lifecycle: usize,
}

pub struct ExtensionHost {
    registry: Arc<HandlerRegistry>,
    lifecycle: Arc<LifecycleRegistry>,
    loaded: Mutex<BTreeSet<String>>,
}

impl ExtensionHost {
    pub fn new(registry: Arc<HandlerRegistry>, lifecycle: Arc<LifecycleRegistry>) -> Self {
        Self {
            registry,
            lifecycle,
            loaded: Mutex::new(BTreeSet::new()),
        }
    }

    /// Register the engine's own handlers and defaults under `HandlerOwner::Core`.
    pub fn install_core(&self) -> Result<(), ExtensionError> {
        let mut ctx = self.context(HandlerOwner::Core);
        if let Err(e) = use_cases::register_core(&mut ctx) {
            self.remove(&HandlerOwner::Core);
            return Err(e.into());
        }
        tracing::info!(handlers = ctx.handlers, "Core handlers installed");
        Ok(())
    }

    /// Load an extension. A failed registration is rolled back completely.
    pub fn load(&self, extension: &dyn Extension) -> Result<(), ExtensionError> {
        let id = extension.id().to_string();
        if id == CORE_ID {
            return Err(ExtensionError::ReservedId(id));
        }
        if !self.loaded.lock().insert(id.clone()) {
            return Err(ExtensionError::AlreadyLoaded(id));
        }

        let owner = HandlerOwner::extension(id.clone());
        let mut ctx = self.context(owner.clone());
        if let Err(e) = extension.register(&mut ctx) {
            tracing::warn!(extension = %id, error = %e, "Extension failed to register; rolling back");
            self.remove(&owner);
            self.loaded.lock().remove(&id);
            return Err(e.into());
        }

        tracing::info!(extension = %id, handlers = ctx.handlers, "Extension loaded");
        Ok(())
    }

    /// Remove every handler and lifecycle registration the extension made.
    pub fn unload(&self, id: &str) -> Result<Unloaded, ExtensionError> {
        if !self.loaded.lock().remove(id) {
            return Err(ExtensionError::NotLoaded(id.to_string()));
        }
        let unloaded = self.remove(&HandlerOwner::extension(id));
        tracing::info!(
            extension = %id,
            handlers = unloaded.handlers,
            lifecycle = unloaded.lifecycle,
            "Extension unloaded"
        );
        Ok(unloaded)
    }

    pub fn loaded(&self) -> Vec<String> {
        self.loaded.lock().iter().cloned().collect()
    }

    fn context(&self, owner: HandlerOwner) -> ExtensionContext {
        ExtensionContext::new(owner, self.registry.clone(), self.lifecycle.clone())
    }

    fn remove(&self, owner: &HandlerOwner) -> Unloaded {
        Unloaded {
            handlers: self.registry.unregister_all(owner),
            lifecycle: self.lifecycle.unregister_lifecycle(owner),
        }
    }
}
