//! Shared fixtures for deployment integration tests
//!
//! In-memory collaborator implementations: a service container, a module
//! loader, unit controllers whose transitions tests fire by hand, and a
//! recording start executor.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use bundle_host::{
    DeployError, Deployment, DeploymentListener, DeploymentRegistry, ListenerRegistration,
    ModuleDescriptor, ModuleIdentity, ModuleInstance, ModuleLoader, ServiceContainer, ServiceKey,
    ServiceValue, StartExecutor, StartFlags, UnitController, UnitListener, UnitState,
};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub fn identity(name: &str) -> ModuleIdentity {
    ModuleIdentity::new(format!("deployment.{}", name), "1.0.0")
}

pub fn deployment(name: &str) -> (ModuleIdentity, Arc<Deployment>) {
    let id = identity(name);
    let dep = Arc::new(Deployment::new(id.clone(), format!("{}.jar", name)));
    (id, dep)
}

pub fn instance(id: &ModuleIdentity) -> Arc<ModuleInstance> {
    Arc::new(ModuleInstance::new(id.clone()))
}

/// In-memory service container. Removal requests are recorded, not applied,
/// until `process_removals` runs.
pub struct MemoryContainer {
    cells: Mutex<HashMap<ServiceKey, ServiceValue>>,
    removal_requests: Mutex<Vec<ServiceKey>>,
}

impl MemoryContainer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            cells: Mutex::new(HashMap::new()),
            removal_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn removal_requests(&self) -> Vec<ServiceKey> {
        self.removal_requests.lock().unwrap().clone()
    }

    /// Apply all recorded removal requests.
    pub fn process_removals(&self) {
        let requests: Vec<ServiceKey> = self.removal_requests.lock().unwrap().drain(..).collect();
        let mut cells = self.cells.lock().unwrap();
        for key in requests {
            cells.remove(&key);
        }
    }

    pub fn descriptor_at(&self, key: &ServiceKey) -> Option<Arc<ModuleDescriptor>> {
        match self.cells.lock().unwrap().get(key) {
            Some(ServiceValue::Descriptor(spec)) => Some(Arc::clone(spec)),
            _ => None,
        }
    }
}

impl ServiceContainer for MemoryContainer {
    fn install(&self, key: ServiceKey, value: ServiceValue) -> Result<(), DeployError> {
        let mut cells = self.cells.lock().unwrap();
        if cells.contains_key(&key) {
            return Err(DeployError::DuplicateService(key));
        }
        cells.insert(key, value);
        Ok(())
    }

    fn lookup(&self, key: &ServiceKey) -> Option<ServiceValue> {
        self.cells.lock().unwrap().get(key).cloned()
    }

    fn request_removal(&self, key: &ServiceKey) {
        self.removal_requests.lock().unwrap().push(key.clone());
    }
}

/// Map-backed module loader.
pub struct MapLoader {
    descriptors: Mutex<HashMap<ModuleIdentity, Arc<ModuleDescriptor>>>,
    instances: Mutex<HashMap<ModuleIdentity, Arc<ModuleInstance>>>,
}

impl MapLoader {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            descriptors: Mutex::new(HashMap::new()),
            instances: Mutex::new(HashMap::new()),
        })
    }

    pub fn insert_descriptor(&self, spec: Arc<ModuleDescriptor>) {
        self.descriptors
            .lock()
            .unwrap()
            .insert(spec.identity().clone(), spec);
    }

    pub fn insert_instance(&self, module: Arc<ModuleInstance>) {
        self.instances
            .lock()
            .unwrap()
            .insert(module.identity.clone(), module);
    }
}

impl ModuleLoader for MapLoader {
    fn find_descriptor(&self, identity: &ModuleIdentity) -> Option<Arc<ModuleDescriptor>> {
        self.descriptors.lock().unwrap().get(identity).cloned()
    }

    fn load_instance(&self, identity: &ModuleIdentity) -> Option<Arc<ModuleInstance>> {
        self.instances.lock().unwrap().get(identity).cloned()
    }
}

/// Controller whose lifecycle transitions are fired by the test.
pub struct MockController {
    self_ref: Weak<MockController>,
    state: Mutex<UnitState>,
    listeners: Mutex<Vec<(u64, Arc<dyn UnitListener>)>>,
    next_id: AtomicU64,
    instance: Mutex<Option<Arc<ModuleInstance>>>,
}

impl MockController {
    pub fn new(state: UnitState) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            state: Mutex::new(state),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            instance: Mutex::new(None),
        })
    }

    pub fn with_instance(state: UnitState, module: Arc<ModuleInstance>) -> Arc<Self> {
        let controller = Self::new(state);
        controller.set_instance(module);
        controller
    }

    pub fn set_instance(&self, module: Arc<ModuleInstance>) {
        *self.instance.lock().unwrap() = Some(module);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().unwrap().len()
    }

    /// Deliver a transition to every registered listener.
    ///
    /// Listeners are invoked from a snapshot of the registration list, so a
    /// listener revoking itself mid-delivery is safe.
    pub async fn fire(&self, from: UnitState, to: UnitState) {
        *self.state.lock().unwrap() = to;
        let snapshot: Vec<Arc<dyn UnitListener>> = self
            .listeners
            .lock()
            .unwrap()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        let controller: Arc<dyn UnitController> =
            self.self_ref.upgrade().expect("controller alive");
        for listener in snapshot {
            listener.transition(&controller, from, to).await;
        }
    }
}

#[async_trait]
impl UnitController for MockController {
    fn state(&self) -> UnitState {
        *self.state.lock().unwrap()
    }

    fn add_listener(&self, listener: Arc<dyn UnitListener>) -> Arc<dyn ListenerRegistration> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().unwrap().push((id, listener));
        Arc::new(MockRegistration {
            controller: self.self_ref.clone(),
            id,
        })
    }

    async fn resolve(&self) -> Option<Arc<ModuleInstance>> {
        self.instance.lock().unwrap().clone()
    }
}

pub struct MockRegistration {
    controller: Weak<MockController>,
    id: u64,
}

impl ListenerRegistration for MockRegistration {
    fn revoke(&self) {
        if let Some(controller) = self.controller.upgrade() {
            controller
                .listeners
                .lock()
                .unwrap()
                .retain(|(id, _)| *id != self.id);
        }
    }
}

/// Start executor recording every request it receives.
pub struct RecordingExecutor {
    started: Mutex<Vec<(ModuleIdentity, StartFlags)>>,
    fail_for: Mutex<HashSet<ModuleIdentity>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Mutex::new(Vec::new()),
            fail_for: Mutex::new(HashSet::new()),
        })
    }

    /// Make start requests for `identity` fail.
    pub fn fail_for(&self, identity: ModuleIdentity) {
        self.fail_for.lock().unwrap().insert(identity);
    }

    /// Identities started so far, in request order.
    pub fn started(&self) -> Vec<ModuleIdentity> {
        self.started
            .lock()
            .unwrap()
            .iter()
            .map(|(identity, _)| identity.clone())
            .collect()
    }

    pub fn started_with_flags(&self) -> Vec<(ModuleIdentity, StartFlags)> {
        self.started.lock().unwrap().clone()
    }
}

#[async_trait]
impl StartExecutor for RecordingExecutor {
    async fn start(&self, module: &ModuleInstance, flags: StartFlags) -> Result<(), DeployError> {
        if self.fail_for.lock().unwrap().contains(&module.identity) {
            return Err(DeployError::StartFailed(module.identity.to_string()));
        }
        self.started
            .lock()
            .unwrap()
            .push((module.identity.clone(), flags));
        Ok(())
    }
}

/// Registry listener appending its observations to a shared, ordered log.
pub struct RecordingListener {
    label: String,
    log: Arc<Mutex<Vec<String>>>,
}

impl RecordingListener {
    pub fn new(label: &str, log: Arc<Mutex<Vec<String>>>) -> Arc<Self> {
        Arc::new(Self {
            label: label.to_string(),
            log,
        })
    }
}

impl DeploymentListener for RecordingListener {
    fn attached(&self, registry: &DeploymentRegistry) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:attached:{}", self.label, registry.modules().len()));
    }

    fn deployment_available(&self, identity: &ModuleIdentity, _deployment: &Arc<Deployment>) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:available:{}", self.label, identity));
    }

    fn deployment_removed(&self, identity: &ModuleIdentity) {
        self.log
            .lock()
            .unwrap()
            .push(format!("{}:removed:{}", self.label, identity));
    }
}

/// Registry listener that panics on every change notification.
pub struct PanickingListener;

impl DeploymentListener for PanickingListener {
    fn attached(&self, _registry: &DeploymentRegistry) {}

    fn deployment_available(&self, _identity: &ModuleIdentity, _deployment: &Arc<Deployment>) {
        panic!("listener failure");
    }

    fn deployment_removed(&self, _identity: &ModuleIdentity) {
        panic!("listener failure");
    }
}
