//! Repository of deployed modules
//!
//! Copy-on-write map from module identity to deployment metadata. The map is
//! updated infrequently and read often: readers load the current snapshot
//! without taking a lock, writers serialize against each other and publish a
//! full replacement snapshot. Listeners are notified synchronously, in
//! registration order, from a private copy of the listener list taken under
//! the writer lock.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use tracing::{debug, error};

use crate::deploy::identity::ModuleIdentity;
use crate::deploy::traits::Deployment;

/// Listener for deployment registry changes.
pub trait DeploymentListener: Send + Sync {
    /// Invoked once when the listener is registered, outside any registry
    /// lock, so the listener can read current state through `registry`.
    fn attached(&self, registry: &DeploymentRegistry);

    /// A deployment became available.
    fn deployment_available(&self, identity: &ModuleIdentity, deployment: &Arc<Deployment>);

    /// A deployment was withdrawn.
    fn deployment_removed(&self, identity: &ModuleIdentity);
}

/// Deployment plus registry-internal bookkeeping.
struct DeploymentHolder {
    deployment: Arc<Deployment>,
    started: AtomicBool,
}

type Snapshot = HashMap<ModuleIdentity, Arc<DeploymentHolder>>;

/// Repository of deployed modules.
pub struct DeploymentRegistry {
    /// Current snapshot; replaced wholesale on every write, never mutated.
    snapshot: ArcSwap<Snapshot>,
    /// Registered listeners in registration order. Doubles as the writer
    /// lock: the map copy and the listener-list snapshot happen under it.
    listeners: Mutex<Vec<Arc<dyn DeploymentListener>>>,
}

impl DeploymentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(HashMap::new()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Install or replace the deployment for `identity`.
    ///
    /// Listeners registered at the moment of the write are notified
    /// synchronously, in registration order, after the snapshot is published.
    pub fn add(&self, identity: ModuleIdentity, deployment: Arc<Deployment>) {
        debug!("deployment available: {}", identity);
        let listeners = {
            let guard = self.lock_listeners();
            let mut next: Snapshot = (**self.snapshot.load()).clone();
            next.insert(
                identity.clone(),
                Arc::new(DeploymentHolder {
                    deployment: Arc::clone(&deployment),
                    started: AtomicBool::new(false),
                }),
            );
            self.snapshot.store(Arc::new(next));
            guard.clone()
        };
        for listener in listeners {
            isolate(|| listener.deployment_available(&identity, &deployment));
        }
    }

    /// Remove the deployment for `identity`. No-op when absent.
    pub fn remove(&self, identity: &ModuleIdentity) {
        debug!("deployment removed: {}", identity);
        let listeners = {
            let guard = self.lock_listeners();
            let mut next: Snapshot = (**self.snapshot.load()).clone();
            next.remove(identity);
            self.snapshot.store(Arc::new(next));
            guard.clone()
        };
        for listener in listeners {
            isolate(|| listener.deployment_removed(identity));
        }
    }

    /// Register `listener` and invoke its `attached` callback.
    ///
    /// The callback runs outside the registry lock; the listener can read
    /// current state without missing the transition to the next write.
    pub fn add_listener(&self, listener: Arc<dyn DeploymentListener>) {
        self.lock_listeners().push(Arc::clone(&listener));
        isolate(|| listener.attached(self));
    }

    /// Remove `listener`. No callback fires.
    pub fn remove_listener(&self, listener: &Arc<dyn DeploymentListener>) {
        self.lock_listeners()
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    /// Point-in-time view of deployed modules, metadata only.
    ///
    /// Reads the current snapshot reference; never blocks on writers.
    pub fn modules(&self) -> HashMap<ModuleIdentity, Arc<Deployment>> {
        let snapshot = self.snapshot.load_full();
        snapshot
            .iter()
            .map(|(identity, holder)| (identity.clone(), Arc::clone(&holder.deployment)))
            .collect()
    }

    /// Record that a module's startup completed. Bookkeeping only; the flag
    /// is not reflected in [`modules`](Self::modules).
    ///
    /// Returns `true` when the flag was newly set, `false` when the identity
    /// is unknown or the module was already marked.
    pub fn mark_started(&self, identity: &ModuleIdentity) -> bool {
        match self.snapshot.load().get(identity) {
            Some(holder) => !holder.started.swap(true, Ordering::AcqRel),
            None => false,
        }
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<Arc<dyn DeploymentListener>>> {
        // Listener callbacks run outside this lock, so a poisoned guard only
        // means a writer panicked between pure map operations.
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DeploymentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a listener callback, reporting a panic instead of propagating it.
fn isolate<F: FnOnce()>(callback: F) {
    if let Err(panic) = catch_unwind(AssertUnwindSafe(callback)) {
        error!("deployment listener panicked: {}", panic_message(&panic));
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
