//! Module identity and derived service keys
//!
//! Every deployable module is addressed by a [`ModuleIdentity`] (name plus
//! version slot). Service cells in the collaborator container are addressed
//! by [`ServiceKey`]s derived from an identity, one key family per concern
//! (descriptor, instance, alias side channel).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name prefix for modules owned by the deployment layer.
pub const MODULE_PREFIX: &str = "deployment.";

/// Slot used when an identity is created from a bare name.
pub const DEFAULT_SLOT: &str = "main";

/// Immutable identity of a deployable module.
///
/// Equality is structural; identities are used as map keys everywhere.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleIdentity {
    name: String,
    slot: String,
}

impl ModuleIdentity {
    /// Create an identity from a name and version slot.
    pub fn new(name: impl Into<String>, slot: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slot: slot.into(),
        }
    }

    /// Create an identity from a bare name, using [`DEFAULT_SLOT`].
    pub fn from_name(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_SLOT)
    }

    /// Derive the canonical identity for an externally-resolved module.
    ///
    /// The name carries the [`MODULE_PREFIX`]; the slot is the version,
    /// with a `-rev{n}` suffix when `revision` is nonzero. Identical inputs
    /// always yield identical identities.
    pub fn derived(name: &str, version: &str, revision: u32) -> Self {
        let mut slot = version.to_string();
        if revision > 0 {
            slot.push_str("-rev");
            slot.push_str(&revision.to_string());
        }
        Self::new(format!("{}{}", MODULE_PREFIX, name), slot)
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version slot.
    pub fn slot(&self) -> &str {
        &self.slot
    }
}

impl fmt::Display for ModuleIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.slot)
    }
}

/// Address of a service cell in the collaborator container.
///
/// Keys are derived from module identities; the derivation is deterministic
/// so independent components arrive at the same cell for the same module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey(String);

impl ServiceKey {
    const DESCRIPTOR_PREFIX: &'static str = "module.spec.service";
    const INSTANCE_PREFIX: &'static str = "module.service";
    const ALIAS_PREFIX: &'static str = "module.spec.alias-for";

    /// Key of the descriptor cell for `identity`.
    pub fn descriptor(identity: &ModuleIdentity) -> Self {
        Self::derive(Self::DESCRIPTOR_PREFIX, identity)
    }

    /// Key of the resolved-instance cell for `identity`.
    pub fn instance(identity: &ModuleIdentity) -> Self {
        Self::derive(Self::INSTANCE_PREFIX, identity)
    }

    /// Key of the alias side-channel cell for `identity`.
    pub fn alias_for(identity: &ModuleIdentity) -> Self {
        Self::derive(Self::ALIAS_PREFIX, identity)
    }

    fn derive(prefix: &str, identity: &ModuleIdentity) -> Self {
        Self(format!("{}.{}.{}", prefix, identity.name(), identity.slot()))
    }

    /// Key as a dotted path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
