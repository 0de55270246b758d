//! Deployment registry
//!
//! Authoritative, point-in-time mapping from module identity to deployment
//! metadata, with change notification.

pub mod repository;

pub use repository::{DeploymentListener, DeploymentRegistry};
