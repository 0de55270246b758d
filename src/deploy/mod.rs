//! Deployment coordination subsystem
//!
//! Coordinates the deployment and startup lifecycle of dynamically loaded
//! modules inside a long-running container process.
//!
//! ## Architecture
//!
//! - **Registry**: copy-on-write map of deployed modules; lock-free reads,
//!   serialized writes, synchronous ordered listener notification
//! - **Resolver**: loader facade publishing descriptors and instances as
//!   addressable service cells, with identity aliasing
//! - **Tracker**: startup barrier that batches unit starts once a cohort of
//!   lifecycle completions is observed, dispatching each batch exactly once

pub mod identity;
pub mod registry;
pub mod resolver;
pub mod tracker;
pub mod traits;

pub use identity::{ModuleIdentity, ServiceKey, DEFAULT_SLOT, MODULE_PREFIX};
pub use registry::{DeploymentListener, DeploymentRegistry};
pub use resolver::ModuleResolver;
pub use tracker::StartTracker;
pub use traits::{
    DeployError, Deployment, DescriptorKind, ListenerRegistration, ModuleDescriptor,
    ModuleInstance, ModuleLoader, ResolvedModule, ServiceContainer, ServiceValue, StartExecutor,
    StartFlags, UnitController, UnitListener, UnitState,
};
