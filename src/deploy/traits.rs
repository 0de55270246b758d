//! Core types and collaborator contracts for the deployment subsystem
//!
//! Defines the data model shared by the registry, resolver, and tracker,
//! and the traits through which this core talks to the surrounding service
//! container. The container owns threads, processes, and service graphs;
//! this crate only relies on the lookup and lifecycle contracts below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

use crate::deploy::identity::{ModuleIdentity, ServiceKey};

/// Deployment metadata for a deployable unit.
///
/// Immutable once created; shared as `Arc<Deployment>` between the registry,
/// the tracker, and the deployer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deployment {
    /// Identity of the deployed module
    pub identity: ModuleIdentity,
    /// Originating artifact location
    pub location: String,
    /// Start the unit automatically once its cohort completes
    pub auto_start: bool,
    /// Fragment units attach to a host module and are never started directly
    pub fragment: bool,
}

impl Deployment {
    /// Create deployment metadata with auto-start enabled.
    pub fn new(identity: ModuleIdentity, location: impl Into<String>) -> Self {
        Self {
            identity,
            location: location.into(),
            auto_start: true,
            fragment: false,
        }
    }
}

/// Unit lifecycle state as reported by the collaborator container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitState {
    /// Unit is installed but has not begun starting
    Installed,
    /// Unit is starting
    Starting,
    /// Unit start completed
    Started,
    /// Unit start failed
    StartFailed,
}

impl UnitState {
    /// Whether the state is terminal for startup tracking purposes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnitState::Started | UnitState::StartFailed)
    }
}

/// Not-yet-instantiated specification of a module.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    identity: ModuleIdentity,
    kind: DescriptorKind,
}

/// What a descriptor resolves to.
#[derive(Debug, Clone)]
pub enum DescriptorKind {
    /// Concrete module contents, instantiated lazily by the module loader
    Concrete,
    /// Forwards lookups to another identity
    Alias { target: ModuleIdentity },
}

impl ModuleDescriptor {
    /// Descriptor for a concrete module.
    pub fn concrete(identity: ModuleIdentity) -> Self {
        Self {
            identity,
            kind: DescriptorKind::Concrete,
        }
    }

    /// Descriptor that forwards `identity` to `target`.
    pub fn alias(identity: ModuleIdentity, target: ModuleIdentity) -> Self {
        Self {
            identity,
            kind: DescriptorKind::Alias { target },
        }
    }

    /// Identity this descriptor is published under.
    pub fn identity(&self) -> &ModuleIdentity {
        &self.identity
    }

    /// Descriptor kind.
    pub fn kind(&self) -> &DescriptorKind {
        &self.kind
    }

    /// Target identity when this is an alias descriptor.
    pub fn alias_target(&self) -> Option<&ModuleIdentity> {
        match &self.kind {
            DescriptorKind::Alias { target } => Some(target),
            DescriptorKind::Concrete => None,
        }
    }
}

/// A live, resolved module instance.
#[derive(Debug, Clone)]
pub struct ModuleInstance {
    /// Canonical identity of the module
    pub identity: ModuleIdentity,
    /// Originating artifact location, if known
    pub location: Option<String>,
    /// Fragment modules are never started directly
    pub fragment: bool,
}

impl ModuleInstance {
    /// Create a non-fragment instance.
    pub fn new(identity: ModuleIdentity) -> Self {
        Self {
            identity,
            location: None,
            fragment: false,
        }
    }
}

/// Externally-resolved module representation, input to identity derivation.
#[derive(Debug, Clone)]
pub struct ResolvedModule {
    /// Module name as known to the resolver
    pub name: String,
    /// Module version
    pub version: String,
    /// Resolution revision; zero for the first resolution
    pub revision: u32,
    /// Origin marker (originating artifact location), if carried
    pub location: Option<String>,
}

/// Payload of an addressable service cell.
#[derive(Debug, Clone)]
pub enum ServiceValue {
    /// A published module descriptor
    Descriptor(Arc<ModuleDescriptor>),
    /// A published resolved instance
    Instance(Arc<ModuleInstance>),
    /// Side-channel alias name published by identity derivation
    AliasName(String),
}

/// Collaborator service container holding addressable, lazily-populated cells.
///
/// `install` must not replace an existing cell; the first registration under
/// a key stays installed until removal is requested and processed.
pub trait ServiceContainer: Send + Sync {
    /// Install a value under `key`.
    ///
    /// Returns [`DeployError::DuplicateService`] when a cell already exists
    /// under that key, leaving the existing cell untouched.
    fn install(&self, key: ServiceKey, value: ServiceValue) -> Result<(), DeployError>;

    /// Current value under `key`, if any.
    fn lookup(&self, key: &ServiceKey) -> Option<ServiceValue>;

    /// Request asynchronous removal of the cell under `key`.
    ///
    /// Removal is requested, not necessarily synchronous. No-op when absent.
    fn request_removal(&self, key: &ServiceKey);
}

/// Collaborator that performs the actual lazy module resolution.
pub trait ModuleLoader: Send + Sync {
    /// Descriptor for `identity`, or `None` when the loader has no entry.
    fn find_descriptor(&self, identity: &ModuleIdentity) -> Option<Arc<ModuleDescriptor>>;

    /// Resolve `identity` to a live instance, or `None` when unknown.
    fn load_instance(&self, identity: &ModuleIdentity) -> Option<Arc<ModuleInstance>>;
}

/// Handle to a tracked unit's controller in the collaborator container.
#[async_trait]
pub trait UnitController: Send + Sync {
    /// Current lifecycle state.
    fn state(&self) -> UnitState;

    /// Register a lifecycle listener, returning its registration handle.
    fn add_listener(&self, listener: Arc<dyn UnitListener>) -> Arc<dyn ListenerRegistration>;

    /// Resolve the controller to its live module instance.
    async fn resolve(&self) -> Option<Arc<ModuleInstance>>;
}

/// Observer for unit lifecycle transitions.
#[async_trait]
pub trait UnitListener: Send + Sync {
    /// Invoked by the container on each state transition of the unit.
    async fn transition(&self, controller: &Arc<dyn UnitController>, from: UnitState, to: UnitState);
}

/// Handle to a registered unit listener.
pub trait ListenerRegistration: Send + Sync {
    /// Remove the registration; the listener receives no further transitions.
    fn revoke(&self);
}

/// Flags for a unit start request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartFlags {
    /// Do not persist the started state across container restarts
    pub transient: bool,
    /// Honor the unit's lazy activation policy
    pub activation_policy: bool,
}

/// Collaborator that executes unit start requests.
#[async_trait]
pub trait StartExecutor: Send + Sync {
    /// Request that `instance` start with the given flags.
    async fn start(&self, instance: &ModuleInstance, flags: StartFlags) -> Result<(), DeployError>;
}

/// Deployment subsystem errors.
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("service already registered: {0}")]
    DuplicateService(ServiceKey),

    #[error("unit start failed: {0}")]
    StartFailed(String),

    #[error("deployment operation failed: {0}")]
    OperationError(String),

    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<anyhow::Error> for DeployError {
    fn from(e: anyhow::Error) -> Self {
        DeployError::OperationError(e.to_string())
    }
}
