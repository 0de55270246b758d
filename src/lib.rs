//! Bundle Host - deployment coordination core for dynamically loaded modules
//!
//! This crate coordinates the deployment and startup lifecycle of dynamically
//! loaded modules ("bundles") inside a long-running container process. Modules
//! arrive and depart asynchronously; their startup is externally observable,
//! orderable, and safely batched.
//!
//! ## Components
//!
//! 1. [`DeploymentRegistry`]: copy-on-write registry of deployed modules,
//!    read lock-free far more often than it is written
//! 2. [`ModuleResolver`]: lazy resolution layer indirecting module lookups
//!    through addressable, possibly-not-yet-resolved service cells
//! 3. [`StartTracker`]: startup barrier that fires a batched start action
//!    exactly once per cohort of completed units
//!
//! ## Design Principles
//!
//! 1. **Lock-free read path**: the registry's snapshot is an atomically
//!    swapped immutable value; a published snapshot is never mutated
//! 2. **Structural race prevention**: the barrier's trigger logic is guarded
//!    by critical sections, not by after-the-fact error handling
//! 3. **Failure isolation**: a failing listener or unit never takes down its
//!    peers; failures are logged and delivery continues
//! 4. **Collaborators behind traits**: the surrounding service container is
//!    reached only through the contracts in [`deploy::traits`]

pub mod config;
pub mod deploy;

// Re-export config module
pub use config::*;

// Re-export commonly used deployment types
pub use deploy::{
    DeployError, Deployment, DeploymentListener, DeploymentRegistry, DescriptorKind,
    ListenerRegistration, ModuleDescriptor, ModuleIdentity, ModuleInstance, ModuleLoader,
    ModuleResolver, ResolvedModule, ServiceContainer, ServiceKey, ServiceValue, StartExecutor,
    StartFlags, StartTracker, UnitController, UnitListener, UnitState,
};

use std::sync::Arc;

/// Main deployment coordinator wiring the three components together.
pub struct BundleHost {
    registry: Arc<DeploymentRegistry>,
    resolver: Arc<ModuleResolver>,
    tracker: Arc<StartTracker>,
}

impl BundleHost {
    /// Create a coordinator over the given collaborators.
    pub fn new(
        config: &DeployConfig,
        container: Arc<dyn ServiceContainer>,
        loader: Arc<dyn ModuleLoader>,
        executor: Arc<dyn StartExecutor>,
    ) -> Self {
        Self {
            registry: Arc::new(DeploymentRegistry::new()),
            resolver: Arc::new(ModuleResolver::with_config(container, loader, config)),
            tracker: Arc::new(StartTracker::new(executor, config)),
        }
    }

    /// The deployment registry.
    pub fn registry(&self) -> &Arc<DeploymentRegistry> {
        &self.registry
    }

    /// The module resolution layer.
    pub fn resolver(&self) -> &Arc<ModuleResolver> {
        &self.resolver
    }

    /// The startup barrier.
    pub fn tracker(&self) -> &Arc<StartTracker> {
        &self.tracker
    }
}
