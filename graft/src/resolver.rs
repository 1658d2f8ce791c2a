//! Graph resolution.
//!
//! Every resolution call carries its own chain of identifiers under
//! construction. The chain is a persistent linked list shared between a
//! resolver and the resolvers it hands to constructors, factories and lazy
//! handles, so concurrent resolutions never observe each other's chains.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use crate::cache::{Gate, GateGuard, InstanceCache, Wait};
use crate::inject::Argument;
use crate::lifecycle::BoxFuture;
use crate::registration::{Factory, Producer};
use crate::{
    Arguments, Container, DiError, EnrichmentPolicy, Implementation, Instance, Lifetime,
    LazyInstance, Registration, Scope, ServiceId, StdError, Token,
};

/// Handle passed to factories for resolving further services.
///
/// A resolver belongs to one resolution: services resolved through it are
/// checked for cycles against the services still under construction on
/// that resolution.
#[derive(Clone)]
pub struct Resolver {
    container: Container,
    scope: Option<Scope>,
    chain: Chain,
}

struct Build {
    identifier: ServiceId,
    registration: Arc<Registration>,
    cache: Option<InstanceCache>,
    resolver: Resolver,
    reentrant: bool,
    link: LinkGuard,
}

struct Built {
    exposed: Instance,
    concrete: Instance,
    implementation: Option<Arc<Implementation>>,
}

enum Plan {
    Ready(Instance),
    Build(Build),
}

impl Resolver {
    pub(crate) fn new(container: Container, scope: Option<Scope>) -> Self {
        Self {
            container,
            scope,
            chain: Chain::default(),
        }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Scope the resolution belongs to, `None` at the container root.
    pub fn scope(&self) -> Option<&Scope> {
        self.scope.as_ref()
    }

    /// Identifiers under construction, outermost first.
    pub fn path(&self) -> Vec<ServiceId> {
        self.chain.path()
    }

    pub(crate) fn resolve_instance(&self, identifier: &ServiceId) -> Result<Instance, DiError> {
        let started = Instant::now();
        let result = match self.plan(identifier) {
            Ok(Plan::Ready(instance)) => Ok(instance),
            Ok(Plan::Build(build)) => build.resolver.create(&build),
            Err(err) => Err(err),
        };
        self.finish(identifier, started, &result);
        result
    }

    pub(crate) fn resolve_instance_async(
        &self,
        identifier: ServiceId,
    ) -> BoxFuture<'static, Result<Instance, DiError>> {
        let this = self.clone();
        Box::pin(async move {
            let started = Instant::now();
            let result = match this.plan(&identifier) {
                Ok(Plan::Ready(instance)) => Ok(instance),
                Ok(Plan::Build(build)) => build.resolver.create_async(&build).await,
                Err(err) => Err(err),
            };
            this.finish(&identifier, started, &result);
            result
        })
    }

    fn ensure_active(&self) -> Result<(), DiError> {
        match &self.scope {
            Some(scope) => scope.ensure_active(),
            None => self.container.ensure_active(),
        }
    }

    fn plan(&self, identifier: &ServiceId) -> Result<Plan, DiError> {
        self.ensure_active()?;
        let registration = self
            .container
            .registration(identifier)
            .ok_or_else(|| DiError::ServiceNotFound {
                identifier: identifier.clone(),
            })?;
        let lifetime = registration.effective_lifetime();
        let cache = match lifetime {
            Lifetime::Singleton => Some(self.container.singletons().clone()),
            Lifetime::Scoped => self.scope.as_ref().map(|scope| scope.cache().clone()),
            Lifetime::Transient => None,
        };
        if let Some(instance) = cache.as_ref().and_then(|cache| cache.get(identifier)) {
            return Ok(Plan::Ready(instance));
        }

        let config = self.container.config();
        let reentrant = self.chain.contains(identifier);
        if reentrant && config.enable_circular_dependency_detection {
            self.container.metrics_collector().record_circular_dependency();
            return Err(DiError::CircularDependency {
                cycle: self.chain.cycle(identifier),
            });
        }
        let depth = self.chain.depth() + 1;
        if depth > config.max_resolution_depth {
            let mut path = self.chain.path();
            path.push(identifier.clone());
            return Err(DiError::DepthExceeded {
                depth,
                max: config.max_resolution_depth,
                path,
            });
        }

        let (chain, link) = self.chain.push(identifier.clone());
        // Singletons outlive every scope and must not capture scoped instances.
        let scope = match lifetime {
            Lifetime::Singleton => None,
            Lifetime::Scoped | Lifetime::Transient => self.scope.clone(),
        };
        Ok(Plan::Build(Build {
            identifier: identifier.clone(),
            registration,
            cache,
            resolver: Resolver {
                container: self.container.clone(),
                scope,
                chain,
            },
            reentrant,
            link,
        }))
    }

    fn create(&self, build: &Build) -> Result<Instance, DiError> {
        let _gate = match &build.cache {
            Some(cache) if !build.reentrant => {
                let gate = cache.gate(&build.identifier);
                let wait = self.wait_for(&gate)?;
                let guard = gate.clone().enter_sync(&build.identifier)?;
                drop(wait);
                if let Some(instance) = cache.get(&build.identifier) {
                    return Ok(instance);
                }
                self.ensure_active()?;
                build.link.hold(gate);
                Some(guard)
            }
            _ => None,
        };
        let built = self.produce(build)?;
        self.retain(build, &built);
        self.enrich(build, &built)?;
        Ok(built.exposed)
    }

    async fn create_async(&self, build: &Build) -> Result<Instance, DiError> {
        let _gate: Option<GateGuard> = match &build.cache {
            Some(cache) if !build.reentrant => {
                let gate = cache.gate(&build.identifier);
                let wait = self.wait_for(&gate)?;
                let guard = gate.clone().enter().await;
                drop(wait);
                if let Some(instance) = cache.get(&build.identifier) {
                    return Ok(instance);
                }
                self.ensure_active()?;
                build.link.hold(gate);
                Some(guard)
            }
            _ => None,
        };
        let built = self.produce_async(build).await?;
        self.retain(build, &built);
        self.enrich_async(build, &built).await?;
        Ok(built.exposed)
    }

    /// Records the wait for `gate` of this resolution's innermost identifier.
    ///
    /// Two resolutions entering a cyclic graph from opposite ends would each
    /// hold the gate the other waits for. The second to wait reports the cycle.
    fn wait_for(&self, gate: &Arc<Gate>) -> Result<Wait, DiError> {
        gate.wait(self.chain.held()).map_err(|held| {
            self.container.metrics_collector().record_circular_dependency();
            DiError::CircularDependency {
                cycle: self.chain.cycle(held.identifier()),
            }
        })
    }

    fn produce(&self, build: &Build) -> Result<Built, DiError> {
        let identifier = &build.identifier;
        match build.registration.producer(identifier)? {
            Producer::Instance(instance) => Ok(Built::plain(instance.clone())),
            Producer::Factory(Factory::Sync(factory)) => factory(self)
                .map(Built::plain)
                .map_err(|err| DiError::from_user(identifier, err)),
            Producer::Factory(Factory::Async(_)) => Err(DiError::RequiresAsync {
                identifier: identifier.clone(),
            }),
            Producer::Implementation(implementation) => {
                let args = self.arguments(identifier, implementation)?;
                let (concrete, exposed) = implementation.construct(identifier, args)?;
                Ok(Built {
                    exposed,
                    concrete,
                    implementation: Some(implementation.clone()),
                })
            }
        }
    }

    async fn produce_async(&self, build: &Build) -> Result<Built, DiError> {
        let identifier = &build.identifier;
        match build.registration.producer(identifier)? {
            Producer::Instance(instance) => Ok(Built::plain(instance.clone())),
            Producer::Factory(Factory::Sync(factory)) => factory(self)
                .map(Built::plain)
                .map_err(|err| DiError::from_user(identifier, err)),
            Producer::Factory(Factory::Async(factory)) => factory
                .create(self.clone())
                .await
                .map(Built::plain)
                .map_err(|err| DiError::from_user(identifier, err)),
            Producer::Implementation(implementation) => {
                let args = self.arguments_async(identifier, implementation).await?;
                let (concrete, exposed) = implementation.construct(identifier, args)?;
                Ok(Built {
                    exposed,
                    concrete,
                    implementation: Some(implementation.clone()),
                })
            }
        }
    }

    fn arguments(
        &self,
        owner: &ServiceId,
        implementation: &Implementation,
    ) -> Result<Arguments, DiError> {
        let mut values = VecDeque::with_capacity(implementation.dependencies().len());
        for parameter in implementation.dependencies().iter() {
            let identifier = parameter.identifier().clone();
            let argument = if parameter.is_lazy() && self.container.config().enable_lazy_loading {
                Argument::Lazy(LazyInstance::deferred(self.clone(), identifier.clone()))
            } else {
                match self.resolve_instance(&identifier) {
                    Ok(instance) => Argument::Value(instance),
                    Err(err) if parameter.is_optional() => {
                        tracing::debug!(service = %owner, dependency = %identifier, "Optional dependency is absent: {err}");
                        Argument::Absent
                    }
                    Err(err) => return Err(err),
                }
            };
            values.push_back((identifier, argument));
        }
        Ok(Arguments::new(owner.clone(), values))
    }

    async fn arguments_async(
        &self,
        owner: &ServiceId,
        implementation: &Implementation,
    ) -> Result<Arguments, DiError> {
        let mut values = VecDeque::with_capacity(implementation.dependencies().len());
        for parameter in implementation.dependencies().iter() {
            let identifier = parameter.identifier().clone();
            let argument = if parameter.is_lazy() && self.container.config().enable_lazy_loading {
                Argument::Lazy(LazyInstance::deferred(self.clone(), identifier.clone()))
            } else {
                match self.resolve_instance_async(identifier.clone()).await {
                    Ok(instance) => Argument::Value(instance),
                    Err(err) if parameter.is_optional() => {
                        tracing::debug!(service = %owner, dependency = %identifier, "Optional dependency is absent: {err}");
                        Argument::Absent
                    }
                    Err(err) => return Err(err),
                }
            };
            values.push_back((identifier, argument));
        }
        Ok(Arguments::new(owner.clone(), values))
    }

    /// Caches the instance before enrichment so that properties and hooks
    /// resolving back to it observe the cached value.
    fn retain(&self, build: &Build, built: &Built) {
        if let Some(cache) = &build.cache {
            let teardown = build.registration.teardown(
                built.implementation.as_deref(),
                &built.concrete,
                &built.exposed,
            );
            cache.insert(build.identifier.clone(), built.exposed.clone(), teardown);
        }
    }

    fn enrich(&self, build: &Build, built: &Built) -> Result<(), DiError> {
        let Some(implementation) = &built.implementation else {
            return Ok(());
        };
        for property in &implementation.properties {
            let result = self
                .resolve_instance(property.identifier())
                .map_err(StdError::from)
                .and_then(|value| property.assign(&built.concrete, value));
            if let Err(err) = result {
                self.enrichment_failed(build, built, format!("property {}", property.name()), err)?;
            }
        }
        for hook in &implementation.post_construct {
            if let Err(err) = hook.call_sync(&built.concrete) {
                self.enrichment_failed(build, built, format!("post-construct {}", hook.name()), err)?;
            }
        }
        Ok(())
    }

    async fn enrich_async(&self, build: &Build, built: &Built) -> Result<(), DiError> {
        let Some(implementation) = &built.implementation else {
            return Ok(());
        };
        for property in &implementation.properties {
            let result = match self
                .resolve_instance_async(property.identifier().clone())
                .await
            {
                Ok(value) => property.assign(&built.concrete, value),
                Err(err) => Err(StdError::from(err)),
            };
            if let Err(err) = result {
                self.enrichment_failed(build, built, format!("property {}", property.name()), err)?;
            }
        }
        for hook in &implementation.post_construct {
            if let Err(err) = hook.call(built.concrete.clone()).await {
                self.enrichment_failed(build, built, format!("post-construct {}", hook.name()), err)?;
            }
        }
        Ok(())
    }

    fn enrichment_failed(
        &self,
        build: &Build,
        built: &Built,
        step: String,
        source: StdError,
    ) -> Result<(), DiError> {
        match self.container.config().enrichment_policy {
            EnrichmentPolicy::BestEffort => {
                tracing::warn!(service = %build.identifier, "Ignoring failed {step}: {source}");
                Ok(())
            }
            EnrichmentPolicy::FailFast => {
                if let Some(cache) = &build.cache {
                    cache.evict(&build.identifier, &built.exposed);
                }
                Err(DiError::Enrichment {
                    identifier: build.identifier.clone(),
                    step,
                    source,
                })
            }
        }
    }

    fn finish(&self, identifier: &ServiceId, started: Instant, result: &Result<Instance, DiError>) {
        let elapsed = started.elapsed();
        self.container
            .metrics_collector()
            .record_resolution(identifier, elapsed, result.is_ok());
        match result {
            Ok(_) => tracing::trace!(service = %identifier, ?elapsed, "Service resolved"),
            Err(err) => tracing::debug!(service = %identifier, "Cannot resolve service: {err}"),
        }
        if let Some(threshold) = self.container.config().slow_resolution_threshold
            && elapsed > threshold
        {
            tracing::warn!(service = %identifier, ?elapsed, "Slow service resolution");
        }
    }
}

impl Built {
    fn plain(instance: Instance) -> Self {
        Self {
            concrete: instance.clone(),
            exposed: instance,
            implementation: None,
        }
    }
}

/// Resolution methods shared by [`Container`], [`Scope`] and [`Resolver`].
///
/// # Examples
///
/// ```rust
/// use graft::{Container, DiError, Register, Resolve};
///
/// struct Missing;
///
/// let container = Container::new();
/// container.register_value(42u32)?;
/// assert_eq!(*container.resolve::<u32>()?, 42);
/// assert!(container.try_resolve::<Missing>().is_none());
/// assert!(matches!(
///     container.resolve::<Missing>(),
///     Err(DiError::ServiceNotFound { .. })
/// ));
/// # Ok::<(), DiError>(())
/// ```
pub trait Resolve {
    /// Resolver starting a new resolution from this handle.
    fn resolver(&self) -> Resolver;

    /// Resolves the natural type identifier of `T`.
    fn resolve<T>(&self) -> Result<Arc<T>, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_token(&Token::<T>::of())
    }

    fn resolve_token<T>(&self, token: &Token<T>) -> Result<Arc<T>, DiError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_any(token.id())?.cast(token.id())
    }

    fn resolve_any(&self, identifier: &ServiceId) -> Result<Instance, DiError> {
        self.resolver().resolve_instance(identifier)
    }

    /// Resolves `T`, awaiting asynchronous factories and hooks.
    fn resolve_async<T>(&self) -> impl Future<Output = Result<Arc<T>, DiError>> + Send
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let identifier = ServiceId::of::<T>();
        let future = self.resolver().resolve_instance_async(identifier.clone());
        async move { future.await?.cast(&identifier) }
    }

    fn resolve_token_async<T>(
        &self,
        token: &Token<T>,
    ) -> impl Future<Output = Result<Arc<T>, DiError>> + Send
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let identifier = token.id().clone();
        let future = self.resolver().resolve_instance_async(identifier.clone());
        async move { future.await?.cast(&identifier) }
    }

    fn resolve_any_async(
        &self,
        identifier: &ServiceId,
    ) -> impl Future<Output = Result<Instance, DiError>> + Send {
        self.resolver().resolve_instance_async(identifier.clone())
    }

    /// Resolves `T`, returning `None` on any failure.
    fn try_resolve<T>(&self) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve().ok()
    }

    fn try_resolve_token<T>(&self, token: &Token<T>) -> Option<Arc<T>>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        self.resolve_token(token).ok()
    }

    fn try_resolve_async<T>(&self) -> impl Future<Output = Option<Arc<T>>> + Send
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let identifier = ServiceId::of::<T>();
        let future = self.resolver().resolve_instance_async(identifier.clone());
        async move { future.await.and_then(|instance| instance.cast(&identifier)).ok() }
    }
}

impl Resolve for Resolver {
    fn resolver(&self) -> Resolver {
        self.clone()
    }
}

/// Persistent list of identifiers, innermost first.
#[derive(Clone, Default)]
struct Chain(Option<Arc<Link>>);

struct Link {
    identifier: ServiceId,
    parent: Chain,
    // Cleared once the identifier is no longer under construction.
    active: AtomicBool,
    // Construction gate held while building a cached identifier.
    gate: OnceLock<Arc<Gate>>,
}

struct LinkGuard(Arc<Link>);

impl Chain {
    fn push(&self, identifier: ServiceId) -> (Chain, LinkGuard) {
        let link = Arc::new(Link {
            identifier,
            parent: self.clone(),
            active: AtomicBool::new(true),
            gate: OnceLock::new(),
        });
        (Chain(Some(link.clone())), LinkGuard(link))
    }

    fn links(&self) -> impl Iterator<Item = &Link> {
        let mut next = self.0.as_deref();
        std::iter::from_fn(move || {
            let link = next?;
            next = link.parent.0.as_deref();
            Some(link)
        })
        .filter(|link| link.active.load(Ordering::Acquire))
    }

    fn active(&self) -> impl Iterator<Item = &ServiceId> {
        self.links().map(|link| &link.identifier)
    }

    /// Gates held by the identifiers under construction.
    fn held(&self) -> Vec<Arc<Gate>> {
        self.links()
            .filter_map(|link| link.gate.get().cloned())
            .collect()
    }

    fn contains(&self, identifier: &ServiceId) -> bool {
        self.active().any(|active| active == identifier)
    }

    fn depth(&self) -> usize {
        self.active().count()
    }

    fn path(&self) -> Vec<ServiceId> {
        let mut path: Vec<_> = self.active().cloned().collect();
        path.reverse();
        path
    }

    /// Path from the first occurrence of `identifier` back to `identifier`.
    fn cycle(&self, identifier: &ServiceId) -> Vec<ServiceId> {
        let mut path = self.path();
        let start = path
            .iter()
            .position(|active| active == identifier)
            .unwrap_or(0);
        path.drain(..start);
        path.push(identifier.clone());
        path
    }
}

impl LinkGuard {
    fn hold(&self, gate: Arc<Gate>) {
        let _ = self.0.gate.set(gate);
    }
}

impl Drop for LinkGuard {
    fn drop(&mut self) {
        self.0.active.store(false, Ordering::Release);
    }
}
