use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;

use crate::lifecycle::Teardown;
use crate::{DiError, Instance, MetricsCollector, ServiceId};

/// Instances retained by a container (singletons) or a scope (scoped services).
#[derive(Clone)]
pub(crate) struct InstanceCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    ready: DashMap<ServiceId, Instance>,
    gates: DashMap<ServiceId, Arc<Gate>>,
    retained: Mutex<Vec<Retained>>,
    metrics: Arc<MetricsCollector>,
}

struct Retained {
    identifier: ServiceId,
    instance: Instance,
    teardown: Teardown,
}

impl InstanceCache {
    pub(crate) fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                ready: DashMap::new(),
                gates: DashMap::new(),
                retained: Mutex::new(Vec::new()),
                metrics,
            }),
        }
    }

    pub(crate) fn get(&self, identifier: &ServiceId) -> Option<Instance> {
        self.inner
            .ready
            .get(identifier)
            .map(|entry| entry.value().clone())
    }

    pub(crate) fn contains(&self, identifier: &ServiceId) -> bool {
        self.inner.ready.contains_key(identifier)
    }

    /// Construction gate of `identifier`, created on first use.
    pub(crate) fn gate(&self, identifier: &ServiceId) -> Arc<Gate> {
        self.inner
            .gates
            .entry(identifier.clone())
            .or_insert_with(|| Arc::new(Gate::new(identifier.clone())))
            .clone()
    }

    /// Stores a constructed instance. Replacing an existing entry keeps the
    /// previous instance retained for disposal.
    pub(crate) fn insert(&self, identifier: ServiceId, instance: Instance, teardown: Teardown) {
        self.lock_retained().push(Retained {
            identifier: identifier.clone(),
            instance: instance.clone(),
            teardown,
        });
        self.inner.ready.insert(identifier.clone(), instance);
        self.inner.metrics.instance_retained();
        tracing::debug!(service = %identifier, "Instance cached");
    }

    /// Stops serving the cached instance of `identifier`. It is still
    /// disposed with the cache.
    pub(crate) fn forget(&self, identifier: &ServiceId) {
        if self.inner.ready.remove(identifier).is_some() {
            tracing::debug!(service = %identifier, "Cached instance replaced");
        }
    }

    /// Removes `instance` entirely, without running its teardown.
    pub(crate) fn evict(&self, identifier: &ServiceId, instance: &Instance) {
        self.inner
            .ready
            .remove_if(identifier, |_, cached| cached.ptr_eq(instance));
        let mut retained = self.lock_retained();
        let before = retained.len();
        retained.retain(|entry| !entry.instance.ptr_eq(instance));
        self.inner.metrics.instances_released(before - retained.len());
    }

    pub(crate) fn len(&self) -> usize {
        self.inner.ready.len()
    }

    /// Empties the cache and runs every teardown in reverse construction order.
    ///
    /// Constructions holding a gate finish first, so their instances are
    /// retained before the cache is drained.
    pub(crate) async fn dispose(&self) {
        let gates: Vec<_> = self
            .inner
            .gates
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        for gate in gates {
            drop(gate.enter().await);
        }
        let retained = std::mem::take(&mut *self.lock_retained());
        self.inner.ready.clear();
        self.inner.gates.clear();
        self.inner.metrics.instances_released(retained.len());
        for entry in retained.into_iter().rev() {
            tracing::debug!(service = %entry.identifier, "Disposing instance");
            entry.teardown.run(&entry.identifier).await;
        }
    }

    fn lock_retained(&self) -> MutexGuard<'_, Vec<Retained>> {
        self.inner
            .retained
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serializes construction of one cached identifier.
///
/// Asynchronous resolutions wait for the gate. Synchronous resolutions
/// never suspend: they wait only for a holder that is itself synchronous on
/// another thread, and report [`DiError::ConstructionInProgress`] otherwise.
pub(crate) struct Gate {
    identifier: ServiceId,
    lock: Arc<tokio::sync::Mutex<()>>,
    // Thread of a synchronous holder. `None` while held means an asynchronous holder.
    owner: Mutex<Option<ThreadId>>,
    // Gate the holder of this gate is waiting for.
    blocked_on: Mutex<Option<Arc<Gate>>>,
}

// Serializes updates of the wait-for edges between gates.
static WAITS: Mutex<()> = Mutex::new(());

/// Wait-for edges recorded by [`Gate::wait`], removed on drop.
pub(crate) struct Wait {
    held: Vec<Arc<Gate>>,
}

pub(crate) struct GateGuard {
    gate: Arc<Gate>,
    permit: Option<OwnedMutexGuard<()>>,
}

impl Gate {
    fn new(identifier: ServiceId) -> Self {
        Self {
            identifier,
            lock: Arc::new(tokio::sync::Mutex::new(())),
            owner: Mutex::new(None),
            blocked_on: Mutex::new(None),
        }
    }

    pub(crate) fn identifier(&self) -> &ServiceId {
        &self.identifier
    }

    /// Records that the resolution holding `held` is about to wait for this
    /// gate.
    ///
    /// Fails with the held gate this gate transitively waits for: the holders
    /// would wait for each other forever.
    pub(crate) fn wait(self: &Arc<Self>, held: Vec<Arc<Gate>>) -> Result<Wait, Arc<Gate>> {
        let _waits = WAITS.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = Some(self.clone());
        while let Some(gate) = next {
            if let Some(cycle) = held.iter().find(|held| Arc::ptr_eq(held, &gate)) {
                return Err(cycle.clone());
            }
            next = gate.lock_blocked_on().clone();
        }
        for gate in &held {
            *gate.lock_blocked_on() = Some(self.clone());
        }
        Ok(Wait { held })
    }

    pub(crate) async fn enter(self: Arc<Self>) -> GateGuard {
        let permit = self.lock.clone().lock_owned().await;
        GateGuard {
            gate: self,
            permit: Some(permit),
        }
    }

    pub(crate) fn enter_sync(self: Arc<Self>, identifier: &ServiceId) -> Result<GateGuard, DiError> {
        let current = thread::current().id();
        loop {
            {
                let mut owner = self.lock_owner();
                match self.lock.clone().try_lock_owned() {
                    Ok(permit) => {
                        *owner = Some(current);
                        drop(owner);
                        return Ok(GateGuard {
                            gate: self,
                            permit: Some(permit),
                        });
                    }
                    Err(_) if owner.is_some_and(|holder| holder != current) => {}
                    Err(_) => {
                        return Err(DiError::ConstructionInProgress {
                            identifier: identifier.clone(),
                        });
                    }
                }
            }
            thread::yield_now();
        }
    }

    fn lock_owner(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_blocked_on(&self) -> MutexGuard<'_, Option<Arc<Gate>>> {
        self.blocked_on.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("identifier", &self.identifier)
            .finish_non_exhaustive()
    }
}

impl Drop for Wait {
    fn drop(&mut self) {
        let _waits = WAITS.lock().unwrap_or_else(PoisonError::into_inner);
        for gate in &self.held {
            gate.lock_blocked_on().take();
        }
    }
}

impl Drop for GateGuard {
    fn drop(&mut self) {
        let mut owner = self.gate.lock_owner();
        *owner = None;
        self.permit.take();
    }
}
