use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::cache::InstanceCache;
use crate::{Container, DiError, Register, Registration, Resolve, Resolver, ServiceId};

/// Child resolution context adding a cache for scoped services.
///
/// A scope has no registry of its own: registrations are forwarded to the
/// container, and only [`Lifetime::Scoped`](crate::Lifetime::Scoped)
/// instances are cached here. Nested scopes each keep their own cache.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use graft::{Arguments, Container, Injectable, Register, Resolve, StdError};
///
/// struct Session;
///
/// impl Injectable for Session {
///     fn construct(_args: &mut Arguments) -> Result<Self, StdError> {
///         Ok(Self)
///     }
/// }
///
/// let container = Container::new();
/// container.register_scoped::<Session>()?;
///
/// let first = container.create_scope();
/// let second = container.create_scope();
/// assert!(Arc::ptr_eq(&first.resolve::<Session>()?, &first.resolve::<Session>()?));
/// assert!(!Arc::ptr_eq(&first.resolve::<Session>()?, &second.resolve::<Session>()?));
/// # Ok::<(), graft::DiError>(())
/// ```
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

struct ScopeInner {
    container: Container,
    parent: Option<Scope>,
    cache: InstanceCache,
    disposed: AtomicBool,
}

impl Scope {
    pub(crate) fn new(container: Container, parent: Option<Scope>) -> Self {
        let cache = InstanceCache::new(container.metrics_collector().clone());
        Self {
            inner: Arc::new(ScopeInner {
                container,
                parent,
                cache,
                disposed: AtomicBool::new(false),
            }),
        }
    }

    pub fn container(&self) -> &Container {
        &self.inner.container
    }

    /// Parent scope, `None` if the parent is the container.
    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    /// Creates a nested scope.
    pub fn create_scope(&self) -> Scope {
        Scope::new(self.inner.container.clone(), Some(self.clone()))
    }

    pub fn is_registered(&self, identifier: impl AsRef<ServiceId>) -> bool {
        self.inner.container.is_registered(identifier)
    }

    pub fn get_registration(&self, identifier: impl AsRef<ServiceId>) -> Option<Arc<Registration>> {
        self.inner.container.get_registration(identifier)
    }

    /// Returns `true` if this scope holds an instance of `identifier`.
    pub fn is_cached(&self, identifier: impl AsRef<ServiceId>) -> bool {
        self.inner.cache.contains(identifier.as_ref())
    }

    /// Disposes the instances cached by this scope. The container and
    /// other scopes are not affected.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(instances = self.inner.cache.len(), "Disposing scope");
        self.inner.cache.dispose().await;
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::Acquire)
    }

    /// Fails if the container, this scope or any parent scope is disposed.
    pub(crate) fn ensure_active(&self) -> Result<(), DiError> {
        self.inner.container.ensure_active()?;
        let mut scope = Some(self);
        while let Some(current) = scope {
            if current.is_disposed() {
                return Err(DiError::Disposed);
            }
            scope = current.parent();
        }
        Ok(())
    }

    pub(crate) fn cache(&self) -> &InstanceCache {
        &self.inner.cache
    }
}

impl Register for Scope {
    fn register(&self, registration: Registration) -> Result<&Self, DiError> {
        self.ensure_active()?;
        self.inner.container.register(registration)?;
        Ok(self)
    }
}

impl Resolve for Scope {
    fn resolver(&self) -> Resolver {
        Resolver::new(self.inner.container.clone(), Some(self.clone()))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("depth", &std::iter::successors(self.parent(), |s| s.parent()).count())
            .field("instances", &self.inner.cache.len())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
