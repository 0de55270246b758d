//! Startup barrier for deployed units
//!
//! Collects units as the container installs them, observes their lifecycle
//! transitions, and starts the accumulated batch once the whole cohort has
//! reached a terminal state. Cohort completion is either counted against an
//! externally configured total or inferred by exhaustion of a pending set;
//! in both modes a batch is dispatched at most once.

use std::collections::{HashMap, HashSet};
use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::DeployConfig;
use crate::deploy::identity::ServiceKey;
use crate::deploy::traits::{
    Deployment, ListenerRegistration, StartExecutor, StartFlags, UnitController, UnitListener,
    UnitState,
};

/// Tracks installed units and starts them in batches.
pub struct StartTracker {
    shared: Arc<TrackerShared>,
}

/// A unit that reached `Started` but has not been dispatched.
struct TrackedUnit {
    controller: Arc<dyn UnitController>,
    deployment: Arc<Deployment>,
}

/// How cohort completion is detected. Selected once at construction.
enum CompletionStrategy {
    /// Externally configured number of units to expect.
    Counted {
        expected: u64,
        completed: AtomicU64,
    },
    /// Infer completion by exhaustion of the pending set.
    Exhaustive {
        pending: Mutex<HashSet<ServiceKey>>,
    },
}

struct TrackerShared {
    strategy: CompletionStrategy,
    /// Accumulated cohort, drained exactly once per completion.
    started: Mutex<HashMap<ServiceKey, TrackedUnit>>,
    /// Serializes batch dispatch; the collaborator container does not
    /// tolerate concurrent start requests.
    dispatch_lock: tokio::sync::Mutex<()>,
    executor: Arc<dyn StartExecutor>,
}

impl StartTracker {
    /// Create a tracker. The completion strategy is selected here, once,
    /// from [`DeployConfig::expected_unit_count`].
    pub fn new(executor: Arc<dyn StartExecutor>, config: &DeployConfig) -> Self {
        let strategy = match config.expected_unit_count {
            Some(expected) => {
                info!("tracking startup of {} expected units", expected);
                CompletionStrategy::Counted {
                    expected,
                    completed: AtomicU64::new(0),
                }
            }
            None => {
                debug!("no expected unit count configured, tracking by exhaustion");
                CompletionStrategy::Exhaustive {
                    pending: Mutex::new(HashSet::new()),
                }
            }
        };
        Self {
            shared: Arc::new(TrackerShared {
                strategy,
                started: Mutex::new(HashMap::new()),
                dispatch_lock: tokio::sync::Mutex::new(()),
                executor,
            }),
        }
    }

    /// Track an installed unit until it reaches a terminal state.
    ///
    /// Registers a one-shot observer with the unit's controller. When the
    /// unit is already in a terminal state, the completion is processed
    /// immediately instead of waiting for a transition that already happened.
    pub async fn track(
        &self,
        key: ServiceKey,
        controller: Arc<dyn UnitController>,
        deployment: Arc<Deployment>,
    ) {
        debug!("tracking unit: {}", key);
        if let CompletionStrategy::Exhaustive { pending } = &self.shared.strategy {
            lock(pending).insert(key.clone());
        }

        let observer = Arc::new(UnitObserver {
            shared: Arc::clone(&self.shared),
            key,
            deployment,
            fired: AtomicBool::new(false),
            registration: OnceLock::new(),
        });

        let listener: Arc<dyn UnitListener> = Arc::clone(&observer) as Arc<dyn UnitListener>;
        let registration = controller.add_listener(listener);
        let _ = observer.registration.set(Arc::clone(&registration));

        let state = controller.state();
        if state.is_terminal() {
            observer.complete(&controller, state).await;
        }
        // A transition delivered before the registration handle was stored
        // leaves the observer fired but still registered.
        if observer.fired.load(Ordering::Acquire) {
            registration.revoke();
        }
    }
}

impl TrackerShared {
    async fn unit_completed(
        &self,
        key: &ServiceKey,
        controller: &Arc<dyn UnitController>,
        state: UnitState,
        deployment: &Arc<Deployment>,
    ) {
        debug!("unit {} reached {:?}", key, state);
        let batch = match &self.strategy {
            CompletionStrategy::Counted {
                expected,
                completed,
            } => {
                if state == UnitState::Started {
                    lock(&self.started).insert(
                        key.clone(),
                        TrackedUnit {
                            controller: Arc::clone(controller),
                            deployment: Arc::clone(deployment),
                        },
                    );
                }
                // Exactly one increment observes the threshold.
                let done = completed.fetch_add(1, Ordering::AcqRel) + 1;
                if done == *expected {
                    Some(mem::take(&mut *lock(&self.started)))
                } else {
                    if done < *expected {
                        let waiting = *expected - done;
                        if waiting % 50 == 0 {
                            debug!(
                                "waiting for {} more units to complete, {} expected in total",
                                waiting, expected
                            );
                        }
                    }
                    None
                }
            }
            CompletionStrategy::Exhaustive { pending } => {
                // Cohort insert, pending removal, emptiness check and drain
                // form one critical section: exactly one completing thread
                // can observe the set becoming empty. Lock order is pending,
                // then started.
                let mut pending = lock(pending);
                if state == UnitState::Started {
                    lock(&self.started).insert(
                        key.clone(),
                        TrackedUnit {
                            controller: Arc::clone(controller),
                            deployment: Arc::clone(deployment),
                        },
                    );
                }
                let removed = pending.remove(key);
                if removed && pending.is_empty() {
                    Some(mem::take(&mut *lock(&self.started)))
                } else {
                    None
                }
            }
        };

        if let Some(batch) = batch {
            self.dispatch(batch).await;
        }
    }

    /// Start every auto-start, non-fragment unit in the drained cohort.
    /// A start failure for one unit does not abort the rest of the batch.
    async fn dispatch(&self, batch: HashMap<ServiceKey, TrackedUnit>) {
        if batch.is_empty() {
            return;
        }
        let _guard = self.dispatch_lock.lock().await;
        info!("starting batch of {} units", batch.len());
        for (key, unit) in batch {
            if !unit.deployment.auto_start {
                debug!("unit {} is not auto-start, skipping", key);
                continue;
            }
            if unit.deployment.fragment {
                debug!("skipping fragment unit: {}", key);
                continue;
            }
            let instance = match unit.controller.resolve().await {
                Some(instance) => instance,
                None => {
                    warn!("cannot resolve module for unit: {}", key);
                    continue;
                }
            };
            if instance.fragment {
                debug!("skipping fragment module: {}", instance.identity);
                continue;
            }
            let flags = StartFlags {
                transient: true,
                activation_policy: true,
            };
            if let Err(e) = self.executor.start(&instance, flags).await {
                warn!("cannot start unit {}: {}", key, e);
            }
        }
    }
}

/// One-shot observer for a single tracked unit.
struct UnitObserver {
    shared: Arc<TrackerShared>,
    key: ServiceKey,
    deployment: Arc<Deployment>,
    /// Set by the first terminal observation; later ones are ignored.
    fired: AtomicBool,
    registration: OnceLock<Arc<dyn ListenerRegistration>>,
}

impl UnitObserver {
    async fn complete(&self, controller: &Arc<dyn UnitController>, state: UnitState) {
        if self.fired.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(registration) = self.registration.get() {
            registration.revoke();
        }
        self.shared
            .unit_completed(&self.key, controller, state, &self.deployment)
            .await;
    }
}

#[async_trait]
impl UnitListener for UnitObserver {
    async fn transition(
        &self,
        controller: &Arc<dyn UnitController>,
        from: UnitState,
        to: UnitState,
    ) {
        if from == UnitState::Starting && to.is_terminal() {
            self.complete(controller, to).await;
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
