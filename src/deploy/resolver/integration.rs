//! Module resolution facade
//!
//! The single loader the deployment layer uses to resolve module identities
//! to descriptors or live instances. Descriptors and instances are published
//! as service cells in the collaborator container so lookups can be
//! indirected through possibly-not-yet-resolved cells; the actual lazy
//! instantiation is delegated to the injected loader.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::DeployConfig;
use crate::deploy::identity::{ModuleIdentity, ServiceKey, MODULE_PREFIX};
use crate::deploy::traits::{
    DeployError, ModuleDescriptor, ModuleInstance, ModuleLoader, ResolvedModule, ServiceContainer,
    ServiceValue,
};

/// Loader facade publishing modules as service cells.
pub struct ModuleResolver {
    container: Arc<dyn ServiceContainer>,
    inner: Arc<dyn ModuleLoader>,
    /// Tolerate duplicate descriptor registration during redeployment races
    ignore_redeploy_conflicts: bool,
}

impl ModuleResolver {
    /// Create a resolver over the given container and loader.
    pub fn new(container: Arc<dyn ServiceContainer>, inner: Arc<dyn ModuleLoader>) -> Self {
        Self {
            container,
            inner,
            ignore_redeploy_conflicts: false,
        }
    }

    /// Create a resolver configured from `config`.
    pub fn with_config(
        container: Arc<dyn ServiceContainer>,
        inner: Arc<dyn ModuleLoader>,
        config: &DeployConfig,
    ) -> Self {
        Self {
            container,
            inner,
            ignore_redeploy_conflicts: config.ignore_redeploy_conflicts,
        }
    }

    /// Publish a module descriptor so it can later be looked up by the loader.
    ///
    /// When an alias mapping was pre-registered for the descriptor's identity,
    /// a second, forwarding descriptor is published under the alias identity.
    /// The alias step is best-effort and never fails the primary publish.
    pub fn add_descriptor(&self, spec: Arc<ModuleDescriptor>) -> Result<(), DeployError> {
        let identity = spec.identity().clone();
        self.install_descriptor(spec)?;

        match self.container.lookup(&ServiceKey::alias_for(&identity)) {
            Some(ServiceValue::AliasName(alias)) => {
                info!("found alias '{}' for module '{}'", alias, identity);
                let alias_spec = Arc::new(ModuleDescriptor::alias(
                    ModuleIdentity::from_name(alias),
                    identity,
                ));
                if let Err(e) = self.install_descriptor(alias_spec) {
                    warn!("cannot publish alias descriptor: {}", e);
                }
            }
            Some(_) => {
                warn!("alias cell for '{}' holds an unexpected value", identity);
            }
            None => {}
        }
        Ok(())
    }

    fn install_descriptor(&self, spec: Arc<ModuleDescriptor>) -> Result<(), DeployError> {
        let identity = spec.identity().clone();
        info!("add module descriptor to loader: {}", identity);

        let key = ServiceKey::descriptor(&identity);
        match self.container.install(key, ServiceValue::Descriptor(spec)) {
            Err(duplicate @ DeployError::DuplicateService(_)) if self.ignore_redeploy_conflicts => {
                // Redeployment race; the first registration stays installed.
                warn!("ignoring duplicate descriptor registration: {}", duplicate);
                Ok(())
            }
            other => other,
        }
    }

    /// Publish an already-resolved instance discovered by the container.
    ///
    /// No-op when an instance cell is already published for its identity; the
    /// loader cannot instantiate these modules, so only the cell is installed.
    pub fn add_instance(&self, module: Arc<ModuleInstance>) {
        let key = ServiceKey::instance(&module.identity);
        if self.container.lookup(&key).is_none() {
            debug!("add module to loader: {}", module.identity);
            if let Err(e) = self.container.install(key, ServiceValue::Instance(module)) {
                // Lost an install race with another discovery path; first wins.
                debug!("module already installed: {}", e);
            }
        }
    }

    /// Request removal of the descriptor and instance cells for `identity`.
    ///
    /// Removal is asynchronous at the container's leisure. Safe no-op when
    /// neither cell exists.
    pub fn remove_module(&self, identity: &ModuleIdentity) {
        let spec_key = ServiceKey::descriptor(identity);
        if self.container.lookup(&spec_key).is_some() {
            debug!("remove module descriptor from loader: {}", spec_key);
            self.container.request_removal(&spec_key);
        }
        let module_key = ServiceKey::instance(identity);
        if self.container.lookup(&module_key).is_some() {
            debug!("remove module from loader: {}", module_key);
            self.container.request_removal(&module_key);
        }
    }

    /// Derive the canonical identity for an externally-resolved module.
    ///
    /// The derivation is deterministic: identical inputs yield identical
    /// identities. When the resolved module carries an origin marker, the
    /// origin-derived alias name is transported into a side-channel cell so a
    /// later [`add_descriptor`](Self::add_descriptor) call can publish a
    /// forwarding alias for it.
    pub fn module_identity_for(&self, resolved: &ResolvedModule) -> ModuleIdentity {
        let identity = ModuleIdentity::derived(&resolved.name, &resolved.version, resolved.revision);

        if let Some(location) = &resolved.location {
            let alias_key = ServiceKey::alias_for(&identity);
            if self.container.lookup(&alias_key).is_none() {
                let alias = format!("{}{}", MODULE_PREFIX, location);
                info!("registering alias '{}' for module '{}'", alias, identity);
                if let Err(e) = self
                    .container
                    .install(alias_key, ServiceValue::AliasName(alias))
                {
                    debug!("alias cell already installed: {}", e);
                }
            }
        }
        identity
    }

    /// Rewriting dependency links after publication is unsupported.
    pub fn set_dependencies(
        &self,
        _module: &ModuleInstance,
        _dependencies: Vec<ModuleIdentity>,
    ) -> Result<(), DeployError> {
        Err(DeployError::NotImplemented(
            "post-publication dependency rewrite",
        ))
    }
}

impl ModuleLoader for ModuleResolver {
    fn find_descriptor(&self, identity: &ModuleIdentity) -> Option<Arc<ModuleDescriptor>> {
        let spec = self.inner.find_descriptor(identity);
        if spec.is_none() {
            debug!("cannot obtain module descriptor for: {}", identity);
        }
        spec
    }

    fn load_instance(&self, identity: &ModuleIdentity) -> Option<Arc<ModuleInstance>> {
        let module = self.inner.load_instance(identity);
        if module.is_none() {
            debug!("cannot obtain module for: {}", identity);
        }
        module
    }
}
