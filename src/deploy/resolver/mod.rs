//! Lazy module resolution
//!
//! Publishes module descriptors and resolved instances as service cells and
//! delegates actual resolution to the collaborator loader.

pub mod integration;

pub use integration::ModuleResolver;
