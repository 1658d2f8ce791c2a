use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;

use crate::cache::InstanceCache;
use crate::{
    ContainerConfig, DiError, Metrics, MetricsCollector, Register, Registration, Resolve,
    Resolver, Scope, ServiceId,
};

/// Registry of service bindings and owner of singleton instances.
///
/// `Container` is a cheap handle; clones share the same registry and cache.
/// Instances are created on first resolution, never at registration time.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use graft::{Arguments, Container, Injectable, Register, Resolve, StdError};
///
/// struct Logger;
///
/// impl Injectable for Logger {
///     fn construct(_args: &mut Arguments) -> Result<Self, StdError> {
///         Ok(Self)
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let container = Container::new();
/// container.register_singleton::<Logger>()?;
///
/// let first = container.resolve::<Logger>()?;
/// let second = container.resolve_async::<Logger>().await?;
/// assert!(Arc::ptr_eq(&first, &second));
///
/// container.dispose().await;
/// assert!(container.resolve::<Logger>().is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

struct ContainerInner {
    config: ContainerConfig,
    registry: DashMap<ServiceId, Arc<Registration>>,
    singletons: InstanceCache,
    metrics: Arc<MetricsCollector>,
    disposed: AtomicBool,
}

impl Container {
    /// Creates a container with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    pub fn with_config(config: ContainerConfig) -> Self {
        let metrics = Arc::new(MetricsCollector::new());
        Self {
            inner: Arc::new(ContainerInner {
                config,
                registry: DashMap::new(),
                singletons: InstanceCache::new(metrics.clone()),
                metrics,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    /// Snapshot of the container's counters.
    pub fn metrics(&self) -> Metrics {
        self.inner.metrics.snapshot()
    }

    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.inner.metrics
    }

    pub fn is_registered(&self, identifier: impl AsRef<ServiceId>) -> bool {
        self.inner.registry.contains_key(identifier.as_ref())
    }

    pub fn get_registration(&self, identifier: impl AsRef<ServiceId>) -> Option<Arc<Registration>> {
        self.registration(identifier.as_ref())
    }

    /// Returns `true` if a singleton instance of `identifier` is cached.
    pub fn is_cached(&self, identifier: impl AsRef<ServiceId>) -> bool {
        self.inner.singletons.contains(identifier.as_ref())
    }

    /// Creates a scope whose parent is this container.
    pub fn create_scope(&self) -> Scope {
        Scope::new(self.clone(), None)
    }

    /// Disposes every cached singleton in reverse construction order, then
    /// clears the registry.
    ///
    /// Disposal failures are logged and do not stop the remaining teardown.
    /// Calling `dispose` again has no effect.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(
            instances = self.inner.singletons.len(),
            "Disposing container"
        );
        self.inner.singletons.dispose().await;
        self.inner.registry.clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    pub(crate) fn ensure_active(&self) -> Result<(), DiError> {
        if self.is_disposed() {
            return Err(DiError::Disposed);
        }
        Ok(())
    }

    pub(crate) fn registration(&self, identifier: &ServiceId) -> Option<Arc<Registration>> {
        self.inner
            .registry
            .get(identifier)
            .map(|entry| entry.value().clone())
    }

    pub(crate) fn singletons(&self) -> &InstanceCache {
        &self.inner.singletons
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Register for Container {
    fn register(&self, registration: Registration) -> Result<&Self, DiError> {
        self.ensure_active()?;
        let identifier = registration
            .identifier()
            .cloned()
            .ok_or_else(|| DiError::InvalidRegistration("Registration has no identifier".into()))?;
        if self.inner.config.enable_validation {
            registration.validate()?;
        }
        let registration = Arc::new(registration);
        if self
            .inner
            .registry
            .insert(identifier.clone(), registration.clone())
            .is_some()
        {
            self.inner.singletons.forget(&identifier);
        }
        if let Some(instance) = registration.instance() {
            let teardown = registration.teardown(None, instance, instance);
            self.inner
                .singletons
                .insert(identifier.clone(), instance.clone(), teardown);
        }
        self.inner.metrics.record_registration(&identifier);
        tracing::debug!(
            service = %identifier,
            lifetime = %registration.lifetime(),
            "Service registered"
        );
        Ok(self)
    }
}

impl Resolve for Container {
    fn resolver(&self) -> Resolver {
        Resolver::new(self.clone(), None)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registrations", &self.inner.registry.len())
            .field("singletons", &self.inner.singletons.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_instance_seeds_cache() {
        let container = Container::new();
        container.register_value(7u8).unwrap();
        assert!(container.is_registered(ServiceId::of::<u8>()));
        assert!(container.is_cached(ServiceId::of::<u8>()));
        assert_eq!(container.metrics().total_registrations, 1);
        assert_eq!(container.metrics().cached_instances, 1);
    }

    #[test]
    fn test_register_without_identifier() {
        let container = Container::new();
        let err = container
            .register(Registration::new().with_instance(Arc::new(1u8)))
            .unwrap_err();
        assert!(matches!(err, DiError::InvalidRegistration(_)));
        assert_eq!(container.metrics().total_registrations, 0);
    }

    #[test]
    fn test_validation_can_be_disabled() {
        let container = Container::with_config(ContainerConfig {
            enable_validation: false,
            ..Default::default()
        });
        container
            .register(Registration::new().with_identifier("empty"))
            .unwrap();
        assert!(matches!(
            container.resolve_any(&ServiceId::named("empty")),
            Err(DiError::InvalidRegistration(_))
        ));
    }

    #[tokio::test]
    async fn test_dispose_clears_registry() {
        let container = Container::new();
        container.register_value("config").unwrap();
        container.dispose().await;
        assert!(container.is_disposed());
        assert!(!container.is_registered(ServiceId::of::<&str>()));
        assert!(matches!(
            container.register_value(1u8),
            Err(DiError::Disposed)
        ));
        container.dispose().await;
    }
}
