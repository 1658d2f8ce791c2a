use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::inject::PropertyInjection;
use crate::lifecycle::{DisposeAdapter, DynDispose, Hook, Teardown};
use crate::{
    Arguments, Dependencies, DiError, Dispose, Injectable, Instance, Resolver, ServiceId, StdError,
    Token,
};

/// How long a constructed instance is reused.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Lifetime {
    /// One instance per container, for the container's whole life.
    Singleton,
    /// A new instance per resolution, owned by the caller.
    #[default]
    Transient,
    /// One instance per scope. Resolved without a scope it behaves like
    /// [`Lifetime::Transient`].
    Scoped,
}

impl fmt::Display for Lifetime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifetime::Singleton => f.write_str("singleton"),
            Lifetime::Transient => f.write_str("transient"),
            Lifetime::Scoped => f.write_str("scoped"),
        }
    }
}

/// Which producer a registration uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProducerKind {
    Implementation,
    Factory,
    Instance,
}

type SyncFactory = Arc<dyn Fn(&Resolver) -> Result<Instance, StdError> + Send + Sync>;

#[derive(Clone)]
pub(crate) enum Factory {
    Sync(SyncFactory),
    Async(Arc<dyn DynAsyncFactory>),
}

#[async_trait]
pub(crate) trait DynAsyncFactory: Send + Sync {
    async fn create(&self, resolver: Resolver) -> Result<Instance, StdError>;
}

struct AsyncFactoryFn<F, T: ?Sized> {
    func: F,
    _marker: PhantomData<fn() -> Arc<T>>,
}

#[async_trait]
impl<F, Fut, T> DynAsyncFactory for AsyncFactoryFn<F, T>
where
    F: Fn(Resolver) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Arc<T>, StdError>> + Send,
    T: ?Sized + Send + Sync + 'static,
{
    async fn create(&self, resolver: Resolver) -> Result<Instance, StdError> {
        (self.func)(resolver).await.map(Instance::new)
    }
}

pub(crate) enum Producer<'a> {
    Instance(&'a Instance),
    Factory(&'a Factory),
    Implementation(&'a Arc<Implementation>),
}

/// Recipe for constructing an [`Injectable`] type and exposing it under a
/// service identifier.
pub struct Implementation {
    type_name: &'static str,
    dependencies: Dependencies,
    construct: fn(&mut Arguments) -> Result<Instance, StdError>,
    expose: Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>,
    pub(crate) properties: Vec<PropertyInjection>,
    pub(crate) post_construct: Vec<Hook>,
    pub(crate) pre_destroy: Vec<Hook>,
    pub(crate) disposer: Option<Arc<dyn DynDispose>>,
}

fn construct<T: Injectable>(args: &mut Arguments) -> Result<Instance, StdError> {
    T::construct(args).map(|value| Instance::new(Arc::new(value)))
}

impl Implementation {
    /// Exposes `T` as itself.
    pub fn of<T: Injectable>() -> Self {
        Self::build::<T>(Arc::new(|concrete: &Instance| Some(concrete.clone())))
    }

    /// Exposes `T` through the contract `C`.
    ///
    /// The cast is checked by the compiler, usually an unsizing coercion:
    ///
    /// ```rust
    /// use std::sync::Arc;
    ///
    /// use graft::{Arguments, Implementation, Injectable, StdError};
    ///
    /// trait Greeter: Send + Sync {}
    ///
    /// struct English;
    ///
    /// impl Greeter for English {}
    ///
    /// impl Injectable for English {
    ///     fn construct(_args: &mut Arguments) -> Result<Self, StdError> {
    ///         Ok(Self)
    ///     }
    /// }
    ///
    /// let implementation = Implementation::contract::<English, dyn Greeter>(|english| english);
    /// assert!(implementation.type_name().ends_with("English"));
    /// ```
    pub fn contract<T, C>(cast: fn(Arc<T>) -> Arc<C>) -> Self
    where
        T: Injectable,
        C: ?Sized + Send + Sync + 'static,
    {
        Self::build::<T>(Arc::new(move |concrete: &Instance| {
            concrete.downcast::<T>().map(|value| Instance::new(cast(value)))
        }))
    }

    fn build<T: Injectable>(
        expose: Arc<dyn Fn(&Instance) -> Option<Instance> + Send + Sync>,
    ) -> Self {
        let metadata = T::metadata().into_parts();
        Self {
            type_name: std::any::type_name::<T>(),
            dependencies: T::dependencies(),
            construct: construct::<T>,
            expose,
            properties: metadata.properties,
            post_construct: metadata.post_construct,
            pre_destroy: metadata.pre_destroy,
            disposer: metadata.disposer,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    /// Builds the concrete value and the instance exposed under `identifier`.
    pub(crate) fn construct(
        &self,
        identifier: &ServiceId,
        mut args: Arguments,
    ) -> Result<(Instance, Instance), DiError> {
        let concrete =
            (self.construct)(&mut args).map_err(|err| DiError::from_user(identifier, err))?;
        let exposed = (self.expose)(&concrete).ok_or_else(|| DiError::TypeMismatch {
            identifier: identifier.clone(),
            expected: self.type_name,
        })?;
        Ok((concrete, exposed))
    }
}

impl fmt::Debug for Implementation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Implementation")
            .field("type_name", &self.type_name)
            .field("dependencies", &self.dependencies)
            .field("properties", &self.properties.len())
            .field("post_construct", &self.post_construct.len())
            .field("pre_destroy", &self.pre_destroy.len())
            .finish()
    }
}

/// Binding of a service identifier to a producer and a lifetime.
///
/// A valid registration has an identifier and exactly one producer: an
/// implementation, a factory or a pre-built instance.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use graft::{Container, Lifetime, Register, Registration, Resolve, Token};
///
/// const GREETING: Token<String> = Token::named("greeting");
///
/// let container = Container::new();
/// container.register(
///     Registration::new()
///         .with_identifier(&GREETING)
///         .with_lifetime(Lifetime::Singleton)
///         .with_factory(|_| Ok(Arc::new("hello".to_string()))),
/// )?;
/// assert_eq!(*container.resolve_token(&GREETING)?, "hello");
/// # Ok::<(), graft::DiError>(())
/// ```
#[derive(Clone, Default)]
pub struct Registration {
    identifier: Option<ServiceId>,
    lifetime: Lifetime,
    implementation: Option<Arc<Implementation>>,
    factory: Option<Factory>,
    instance: Option<Instance>,
    disposer: Option<Arc<dyn DynDispose>>,
}

impl Registration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registration of `T` under its own type identifier.
    pub fn implementation<T: Injectable>(lifetime: Lifetime) -> Self {
        Self::new()
            .with_identifier(ServiceId::of::<T>())
            .with_lifetime(lifetime)
            .with_implementation(Implementation::of::<T>())
    }

    pub fn with_identifier(mut self, identifier: impl Into<ServiceId>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_lifetime(mut self, lifetime: Lifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_implementation(mut self, implementation: Implementation) -> Self {
        self.implementation = Some(Arc::new(implementation));
        self
    }

    /// Produces the service with a synchronous factory.
    ///
    /// The factory receives the resolver of the current resolution and may
    /// resolve further services through it.
    pub fn with_factory<T, F>(mut self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver) -> Result<Arc<T>, StdError> + Send + Sync + 'static,
    {
        self.factory = Some(Factory::Sync(Arc::new(move |resolver: &Resolver| {
            factory(resolver).map(Instance::new)
        })));
        self
    }

    /// Produces the service with an asynchronous factory. Such services can
    /// only be resolved asynchronously.
    pub fn with_async_factory<T, F, Fut>(mut self, factory: F) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, StdError>> + Send + 'static,
    {
        self.factory = Some(Factory::Async(Arc::new(AsyncFactoryFn {
            func: factory,
            _marker: PhantomData::<fn() -> Arc<T>>,
        })));
        self
    }

    /// Uses a pre-built instance. The registration becomes a singleton: the
    /// container owns the instance and disposes it once.
    pub fn with_instance<T>(mut self, instance: Arc<T>) -> Self
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.instance = Some(Instance::new(instance));
        self.lifetime = Lifetime::Singleton;
        self
    }

    /// Disposes the exposed `T` when the cache owning it is disposed.
    ///
    /// Applies to every producer kind. The exposed value must be an `Arc<T>`.
    pub fn disposable<T>(mut self) -> Self
    where
        T: Dispose + 'static,
    {
        self.disposer = Some(DisposeAdapter::<T>::erased());
        self
    }

    pub fn identifier(&self) -> Option<&ServiceId> {
        self.identifier.as_ref()
    }

    pub fn lifetime(&self) -> Lifetime {
        self.lifetime
    }

    /// Producer used at resolution time: the instance, else the factory,
    /// else the implementation.
    pub fn kind(&self) -> Option<ProducerKind> {
        if self.instance.is_some() {
            Some(ProducerKind::Instance)
        } else if self.factory.is_some() {
            Some(ProducerKind::Factory)
        } else if self.implementation.is_some() {
            Some(ProducerKind::Implementation)
        } else {
            None
        }
    }

    pub fn implementation_type(&self) -> Option<&'static str> {
        self.implementation.as_ref().map(|imp| imp.type_name())
    }

    pub(crate) fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    /// Lifetime the resolver caches under. A pre-built instance belongs to
    /// the container whatever lifetime it was registered with.
    pub(crate) fn effective_lifetime(&self) -> Lifetime {
        match self.instance {
            Some(_) => Lifetime::Singleton,
            None => self.lifetime,
        }
    }

    /// Checks that exactly one producer is present.
    pub fn validate(&self) -> Result<(), DiError> {
        let identifier = self
            .identifier
            .as_ref()
            .ok_or_else(|| DiError::InvalidRegistration("Registration has no identifier".into()))?;
        let producers = [
            self.implementation.is_some(),
            self.factory.is_some(),
            self.instance.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();
        if producers != 1 {
            return Err(DiError::InvalidRegistration(format!(
                "{identifier} must have exactly one of implementation, factory or instance, found {producers}"
            )));
        }
        if self.instance.is_some() && self.lifetime != Lifetime::Singleton {
            return Err(DiError::InvalidRegistration(format!(
                "{identifier} is a pre-built instance and must be a singleton, not {}",
                self.lifetime
            )));
        }
        Ok(())
    }

    pub(crate) fn producer(&self, identifier: &ServiceId) -> Result<Producer<'_>, DiError> {
        if let Some(instance) = &self.instance {
            return Ok(Producer::Instance(instance));
        }
        if let Some(factory) = &self.factory {
            return Ok(Producer::Factory(factory));
        }
        if let Some(implementation) = &self.implementation {
            return Ok(Producer::Implementation(implementation));
        }
        Err(DiError::InvalidRegistration(format!(
            "{identifier} has no implementation, factory or instance"
        )))
    }

    /// Cleanup of a value exposed by this registration and, for
    /// implementations, of the concrete value behind it. Pre-destroy hooks
    /// run before disposers.
    pub(crate) fn teardown(
        &self,
        implementation: Option<&Implementation>,
        concrete: &Instance,
        exposed: &Instance,
    ) -> Teardown {
        let mut teardown = Teardown::default();
        for hook in implementation.into_iter().flat_map(|imp| &imp.pre_destroy) {
            teardown.hook(concrete.clone(), hook.clone());
        }
        if let Some(disposer) = implementation.and_then(|imp| imp.disposer.clone()) {
            teardown.dispose(concrete.clone(), disposer);
        }
        if let Some(disposer) = &self.disposer {
            teardown.dispose(exposed.clone(), disposer.clone());
        }
        teardown
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("identifier", &self.identifier)
            .field("lifetime", &self.lifetime)
            .field("kind", &self.kind())
            .field("implementation", &self.implementation_type())
            .field("disposable", &self.disposer.is_some())
            .finish()
    }
}

/// Registration methods shared by [`Container`](crate::Container) and
/// [`Scope`](crate::Scope).
///
/// Registering an identifier again replaces the previous binding.
pub trait Register {
    /// Validates and stores a registration.
    fn register(&self, registration: Registration) -> Result<&Self, DiError>;

    fn register_singleton<T: Injectable>(&self) -> Result<&Self, DiError> {
        self.register(Registration::implementation::<T>(Lifetime::Singleton))
    }

    fn register_transient<T: Injectable>(&self) -> Result<&Self, DiError> {
        self.register(Registration::implementation::<T>(Lifetime::Transient))
    }

    fn register_scoped<T: Injectable>(&self) -> Result<&Self, DiError> {
        self.register(Registration::implementation::<T>(Lifetime::Scoped))
    }

    /// Registers `T` under the type identifier of the contract `C`.
    fn register_contract<C, T>(
        &self,
        lifetime: Lifetime,
        cast: fn(Arc<T>) -> Arc<C>,
    ) -> Result<&Self, DiError>
    where
        C: ?Sized + Send + Sync + 'static,
        T: Injectable,
    {
        self.register(
            Registration::new()
                .with_identifier(ServiceId::of::<C>())
                .with_lifetime(lifetime)
                .with_implementation(Implementation::contract::<T, C>(cast)),
        )
    }

    fn register_factory<T, F>(
        &self,
        token: &Token<T>,
        lifetime: Lifetime,
        factory: F,
    ) -> Result<&Self, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&Resolver) -> Result<Arc<T>, StdError> + Send + Sync + 'static,
    {
        self.register(
            Registration::new()
                .with_identifier(token)
                .with_lifetime(lifetime)
                .with_factory(factory),
        )
    }

    fn register_async_factory<T, F, Fut>(
        &self,
        token: &Token<T>,
        lifetime: Lifetime,
        factory: F,
    ) -> Result<&Self, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(Resolver) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Arc<T>, StdError>> + Send + 'static,
    {
        self.register(
            Registration::new()
                .with_identifier(token)
                .with_lifetime(lifetime)
                .with_async_factory(factory),
        )
    }

    /// Registers a pre-built singleton. The container cache is seeded
    /// immediately.
    fn register_instance<T>(&self, token: &Token<T>, instance: Arc<T>) -> Result<&Self, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.register(
            Registration::new()
                .with_identifier(token)
                .with_lifetime(Lifetime::Singleton)
                .with_instance(instance),
        )
    }

    /// Registers `value` under its own type identifier.
    fn register_value<T>(&self, value: T) -> Result<&Self, DiError>
    where
        T: Send + Sync + 'static,
    {
        self.register_instance(&Token::<T>::of(), Arc::new(value))
    }
}
