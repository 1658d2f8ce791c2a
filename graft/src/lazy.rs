use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::{DiError, Instance, Resolver, ServiceId};

/// Type-erased deferred resolution shared by clones of one handle.
#[derive(Clone)]
pub(crate) struct LazyInstance {
    identifier: ServiceId,
    resolver: Option<Resolver>,
    cell: Arc<OnceCell<Instance>>,
}

impl LazyInstance {
    /// Handle resolved through `resolver` on first access.
    ///
    /// The resolver carries the chain of the service that received the
    /// handle, so an access made while that service is still being built
    /// takes part in cycle detection.
    pub(crate) fn deferred(resolver: Resolver, identifier: ServiceId) -> Self {
        Self {
            identifier,
            resolver: Some(resolver),
            cell: Arc::new(OnceCell::new()),
        }
    }

    pub(crate) fn ready(identifier: ServiceId, instance: Instance) -> Self {
        Self {
            identifier,
            resolver: None,
            cell: Arc::new(OnceCell::new_with(Some(instance))),
        }
    }

    pub(crate) fn is_resolved(&self) -> bool {
        self.cell.initialized()
    }

    pub(crate) fn get(&self) -> Result<Instance, DiError> {
        if let Some(instance) = self.cell.get() {
            return Ok(instance.clone());
        }
        let instance = self.resolver()?.resolve_instance(&self.identifier)?;
        // A concurrent access may have won; keep the first memoized value.
        let _ = self.cell.set(instance.clone());
        Ok(self.cell.get().cloned().unwrap_or(instance))
    }

    pub(crate) async fn get_async(&self) -> Result<Instance, DiError> {
        if let Some(instance) = self.cell.get() {
            return Ok(instance.clone());
        }
        let resolver = self.resolver()?;
        self.cell
            .get_or_try_init(|| resolver.resolve_instance_async(self.identifier.clone()))
            .await
            .cloned()
    }

    fn resolver(&self) -> Result<&Resolver, DiError> {
        self.resolver
            .as_ref()
            .ok_or_else(|| DiError::ServiceNotFound {
                identifier: self.identifier.clone(),
            })
    }
}

/// Deferred handle to a service, resolved on first access and memoized.
///
/// Lazy constructor parameters break cycles between services that do not
/// need each other during construction.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use graft::{Arguments, Container, Dependencies, Injectable, Lazy, Register, Resolve, StdError};
///
/// struct Parent {
///     child: Arc<Child>,
/// }
///
/// struct Child {
///     parent: Lazy<Parent>,
/// }
///
/// impl Injectable for Parent {
///     fn dependencies() -> Dependencies {
///         Dependencies::new().param::<Child>()
///     }
///
///     fn construct(args: &mut Arguments) -> Result<Self, StdError> {
///         Ok(Self { child: args.required()? })
///     }
/// }
///
/// impl Injectable for Child {
///     fn dependencies() -> Dependencies {
///         Dependencies::new().lazy::<Parent>()
///     }
///
///     fn construct(args: &mut Arguments) -> Result<Self, StdError> {
///         Ok(Self { parent: args.lazy()? })
///     }
/// }
///
/// let container = Container::new();
/// container.register_singleton::<Parent>()?.register_singleton::<Child>()?;
/// let parent = container.resolve::<Parent>()?;
/// assert!(Arc::ptr_eq(&parent.child.parent.get()?, &parent));
/// # Ok::<(), graft::DiError>(())
/// ```
pub struct Lazy<T: ?Sized> {
    inner: LazyInstance,
    _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T> Lazy<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(inner: LazyInstance) -> Self {
        Self {
            inner,
            _marker: PhantomData,
        }
    }

    pub fn identifier(&self) -> &ServiceId {
        &self.inner.identifier
    }

    /// Returns `true` once a resolution through this handle has succeeded.
    pub fn is_resolved(&self) -> bool {
        self.inner.is_resolved()
    }

    /// Resolves the service synchronously on first call.
    ///
    /// Fails with [`DiError::RequiresAsync`] if the service needs an
    /// asynchronous factory; use [`Lazy::get_async`] then.
    pub fn get(&self) -> Result<Arc<T>, DiError> {
        self.inner.get()?.cast(&self.inner.identifier)
    }

    pub async fn get_async(&self) -> Result<Arc<T>, DiError> {
        self.inner.get_async().await?.cast(&self.inner.identifier)
    }
}

impl<T: ?Sized> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: ?Sized> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("identifier", &self.inner.identifier)
            .field("resolved", &self.inner.cell.initialized())
            .finish()
    }
}
