//! Explicit dependency declarations.
//!
//! Rust has no constructor reflection, so every constructable type describes
//! itself through [`Injectable`]: the ordered constructor parameters, how to
//! build the value from resolved arguments, and the post-construction
//! [`Metadata`] (property injections and lifecycle hooks). The
//! `#[derive(Injectable)]` macro writes all of it from struct fields.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use graft::{Arguments, Container, Dependencies, Injectable, Register, Resolve, StdError};
//!
//! struct Logger;
//!
//! impl Injectable for Logger {
//!     fn construct(_args: &mut Arguments) -> Result<Self, StdError> {
//!         Ok(Self)
//!     }
//! }
//!
//! struct Service {
//!     logger: Arc<Logger>,
//! }
//!
//! impl Injectable for Service {
//!     fn dependencies() -> Dependencies {
//!         Dependencies::new().param::<Logger>()
//!     }
//!
//!     fn construct(args: &mut Arguments) -> Result<Self, StdError> {
//!         Ok(Self {
//!             logger: args.required()?,
//!         })
//!     }
//! }
//!
//! let container = Container::new();
//! container.register_singleton::<Logger>()?.register_singleton::<Service>()?;
//! let service = container.resolve::<Service>()?;
//! assert!(Arc::ptr_eq(&service.logger, &container.resolve::<Logger>()?));
//! # Ok::<(), graft::DiError>(())
//! ```

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use crate::lifecycle::{DisposeAdapter, DynDispose, Hook};
use crate::{DiError, Dispose, Instance, Lazy, LazyInstance, ServiceId, StdError};

/// A type the container can construct.
pub trait Injectable: Send + Sync + Sized + 'static {
    /// Constructor parameters in declaration order.
    ///
    /// The default implementation declares no parameters.
    fn dependencies() -> Dependencies {
        Dependencies::new()
    }

    /// Builds the value from arguments resolved for [`Injectable::dependencies`].
    ///
    /// Arguments are taken in the same order the parameters were declared.
    fn construct(args: &mut Arguments) -> Result<Self, StdError>;

    /// Property injections and lifecycle hooks run after construction.
    fn metadata() -> Metadata<Self> {
        Metadata::new()
    }
}

/// One constructor parameter.
#[derive(Clone, Debug)]
pub struct Parameter {
    natural: ServiceId,
    inject: Option<ServiceId>,
    optional: bool,
    lazy: bool,
}

impl Parameter {
    /// Parameter whose natural identifier is the type `T`.
    pub fn of<T>() -> Self
    where
        T: ?Sized + 'static,
    {
        Self {
            natural: ServiceId::of::<T>(),
            inject: None,
            optional: false,
            lazy: false,
        }
    }

    /// Resolves the parameter under `identifier` instead of its natural identifier.
    pub fn inject(mut self, identifier: impl Into<ServiceId>) -> Self {
        self.inject = Some(identifier.into());
        self
    }

    /// Binds an absent value when the dependency cannot be resolved.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Binds a deferred handle resolved on first access.
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Identifier the parameter is resolved under.
    pub fn identifier(&self) -> &ServiceId {
        self.inject.as_ref().unwrap_or(&self.natural)
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy
    }
}

/// Ordered constructor parameters of an [`Injectable`] type.
///
/// # Examples
///
/// ```rust
/// use graft::{Dependencies, Parameter, Token};
///
/// struct Logger;
/// struct Cache;
///
/// const PRIMARY: Token<String> = Token::named("primary-db");
///
/// let deps = Dependencies::new()
///     .param::<Logger>()
///     .optional::<Cache>()
///     .with(Parameter::of::<String>().inject(&PRIMARY));
/// assert_eq!(deps.len(), 3);
/// assert_eq!(deps.iter().nth(2).unwrap().identifier().name(), "primary-db");
/// ```
#[derive(Clone, Debug, Default)]
pub struct Dependencies {
    parameters: Vec<Parameter>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    /// Appends a parameter.
    pub fn with(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Appends a required parameter of type `T`.
    pub fn param<T>(self) -> Self
    where
        T: ?Sized + 'static,
    {
        self.with(Parameter::of::<T>())
    }

    /// Appends an optional parameter of type `T`.
    pub fn optional<T>(self) -> Self
    where
        T: ?Sized + 'static,
    {
        self.with(Parameter::of::<T>().optional())
    }

    /// Appends a lazy parameter of type `T`.
    pub fn lazy<T>(self) -> Self
    where
        T: ?Sized + 'static,
    {
        self.with(Parameter::of::<T>().lazy())
    }

    /// Appends all parameters of `other` after the parameters of `self`.
    pub fn merge(mut self, other: Dependencies) -> Self {
        self.parameters.extend(other.parameters);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter()
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

pub(crate) enum Argument {
    Value(Instance),
    Absent,
    Lazy(LazyInstance),
}

/// Resolved constructor arguments, handed out in declaration order.
pub struct Arguments {
    owner: ServiceId,
    declared: usize,
    taken: usize,
    values: VecDeque<(ServiceId, Argument)>,
}

impl Arguments {
    pub(crate) fn new(owner: ServiceId, values: VecDeque<(ServiceId, Argument)>) -> Self {
        Self {
            owner,
            declared: values.len(),
            taken: 0,
            values,
        }
    }

    /// Takes the next argument, which must have been resolved.
    pub fn required<T>(&mut self) -> Result<Arc<T>, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.next()? {
            (identifier, Argument::Value(instance)) => instance.cast(&identifier),
            (identifier, Argument::Absent) => Err(DiError::ServiceNotFound { identifier }),
            (identifier, Argument::Lazy(lazy)) => lazy.get()?.cast(&identifier),
        }
    }

    /// Takes the next argument, `None` if an optional parameter could not be resolved.
    pub fn optional<T>(&mut self) -> Result<Option<Arc<T>>, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.next()? {
            (identifier, Argument::Value(instance)) => instance.cast(&identifier).map(Some),
            (_, Argument::Absent) => Ok(None),
            (identifier, Argument::Lazy(lazy)) => lazy.get()?.cast(&identifier).map(Some),
        }
    }

    /// Takes the next argument as a deferred handle.
    ///
    /// When lazy loading is disabled the dependency was resolved eagerly and
    /// the handle is already filled.
    pub fn lazy<T>(&mut self) -> Result<Lazy<T>, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        match self.next()? {
            (identifier, Argument::Value(instance)) => {
                instance.cast::<T>(&identifier)?;
                Ok(Lazy::new(LazyInstance::ready(identifier, instance)))
            }
            (identifier, Argument::Absent) => Err(DiError::ServiceNotFound { identifier }),
            (_, Argument::Lazy(lazy)) => Ok(Lazy::new(lazy)),
        }
    }

    fn next(&mut self) -> Result<(ServiceId, Argument), DiError> {
        self.taken += 1;
        self.values.pop_front().ok_or_else(|| {
            DiError::InvalidRegistration(format!(
                "{} takes argument {} but declares only {} parameters",
                self.owner, self.taken, self.declared,
            ))
        })
    }
}

impl fmt::Debug for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arguments")
            .field("owner", &self.owner)
            .field("remaining", &self.values.len())
            .finish()
    }
}

/// Set-once slot filled by property injection after construction.
///
/// Properties are assigned once the owning instance is cached, so they may
/// refer back to the owner or to services that depend on it.
pub struct Property<T: ?Sized> {
    slot: OnceLock<Arc<T>>,
}

impl<T: ?Sized> Property<T> {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Returns the injected value, `None` if injection has not happened or failed.
    pub fn get(&self) -> Option<&Arc<T>> {
        self.slot.get()
    }

    pub fn is_set(&self) -> bool {
        self.slot.get().is_some()
    }

    pub(crate) fn set(&self, value: Arc<T>) -> bool {
        self.slot.set(value).is_ok()
    }
}

impl<T: ?Sized> Default for Property<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> fmt::Debug for Property<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("set", &self.is_set())
            .finish()
    }
}

type Assign = Arc<dyn Fn(&Instance, Instance) -> Result<(), StdError> + Send + Sync>;

#[derive(Clone)]
pub(crate) struct PropertyInjection {
    name: &'static str,
    identifier: ServiceId,
    assign: Assign,
}

impl PropertyInjection {
    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn identifier(&self) -> &ServiceId {
        &self.identifier
    }

    pub(crate) fn assign(&self, target: &Instance, value: Instance) -> Result<(), StdError> {
        (self.assign)(target, value)
    }
}

/// Post-construction metadata of an [`Injectable`] type.
///
/// Hooks run in the order they are added. Property injections run before
/// post-construct hooks.
///
/// # Examples
///
/// ```rust
/// use graft::{Arguments, Injectable, Metadata, Property, StdError};
///
/// struct Clock;
///
/// struct Report {
///     clock: Property<Clock>,
/// }
///
/// impl Report {
///     fn check(&self) -> Result<(), StdError> {
///         Ok(())
///     }
/// }
///
/// impl Injectable for Report {
///     fn construct(_args: &mut Arguments) -> Result<Self, StdError> {
///         Ok(Self { clock: Property::new() })
///     }
///
///     fn metadata() -> Metadata<Self> {
///         Metadata::new()
///             .property("clock", |this: &Self| &this.clock)
///             .post_construct("check", Self::check)
///     }
/// }
/// ```
pub struct Metadata<T> {
    properties: Vec<PropertyInjection>,
    post_construct: Vec<Hook>,
    pre_destroy: Vec<Hook>,
    disposer: Option<Arc<dyn DynDispose>>,
    _marker: PhantomData<fn() -> T>,
}

pub(crate) struct MetadataParts {
    pub(crate) properties: Vec<PropertyInjection>,
    pub(crate) post_construct: Vec<Hook>,
    pub(crate) pre_destroy: Vec<Hook>,
    pub(crate) disposer: Option<Arc<dyn DynDispose>>,
}

impl<T> Metadata<T>
where
    T: Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            properties: Vec::new(),
            post_construct: Vec::new(),
            pre_destroy: Vec::new(),
            disposer: None,
            _marker: PhantomData,
        }
    }

    /// Injects the natural identifier of `P` into the slot returned by `slot`.
    pub fn property<P>(self, name: &'static str, slot: fn(&T) -> &Property<P>) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
    {
        self.property_with(name, ServiceId::of::<P>(), slot)
    }

    /// Injects `identifier` into the slot returned by `slot`.
    pub fn property_with<P>(
        mut self,
        name: &'static str,
        identifier: impl Into<ServiceId>,
        slot: fn(&T) -> &Property<P>,
    ) -> Self
    where
        P: ?Sized + Send + Sync + 'static,
    {
        let identifier = identifier.into();
        let expected = identifier.clone();
        let assign = move |target: &Instance, value: Instance| -> Result<(), StdError> {
            let this = target
                .downcast::<T>()
                .ok_or_else(|| format!("Property target is not a {}", std::any::type_name::<T>()))?;
            let value = value.cast::<P>(&expected)?;
            if slot(&this).set(value) {
                Ok(())
            } else {
                Err(format!("Property {name} is already set").into())
            }
        };
        self.properties.push(PropertyInjection {
            name,
            identifier,
            assign: Arc::new(assign),
        });
        self
    }

    pub fn post_construct<F>(mut self, name: impl Into<Cow<'static, str>>, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), StdError> + Send + Sync + 'static,
    {
        self.post_construct.push(Hook::new_sync(name.into(), hook));
        self
    }

    /// Adds a post-construct hook awaited by asynchronous resolutions.
    ///
    /// A synchronous resolution cannot run it and treats it as a failed hook.
    pub fn post_construct_async<F, Fut>(mut self, name: impl Into<Cow<'static, str>>, hook: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StdError>> + Send + 'static,
    {
        self.post_construct.push(Hook::new_async(name.into(), hook));
        self
    }

    pub fn pre_destroy<F>(mut self, name: impl Into<Cow<'static, str>>, hook: F) -> Self
    where
        F: Fn(&T) -> Result<(), StdError> + Send + Sync + 'static,
    {
        self.pre_destroy.push(Hook::new_sync(name.into(), hook));
        self
    }

    pub fn pre_destroy_async<F, Fut>(mut self, name: impl Into<Cow<'static, str>>, hook: F) -> Self
    where
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StdError>> + Send + 'static,
    {
        self.pre_destroy.push(Hook::new_async(name.into(), hook));
        self
    }

    /// Runs the type's [`Dispose`] implementation when the owning cache is disposed.
    pub fn dispose(mut self) -> Self
    where
        T: Dispose,
    {
        self.disposer = Some(DisposeAdapter::<T>::erased());
        self
    }

    pub(crate) fn into_parts(self) -> MetadataParts {
        MetadataParts {
            properties: self.properties,
            post_construct: self.post_construct,
            pre_destroy: self.pre_destroy,
            disposer: self.disposer,
        }
    }
}

impl<T> Default for Metadata<T>
where
    T: Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
