use std::any::type_name;
use std::borrow::Cow;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::{Instance, ServiceId, StdError};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Resource cleanup run when the container or scope owning an instance is disposed.
///
/// # Examples
///
/// ```rust
/// use graft::{Dispose, StdError};
///
/// struct Pool;
///
/// impl Dispose for Pool {
///     async fn dispose(&self) -> Result<(), StdError> {
///         // Close connections.
///         Ok(())
///     }
/// }
/// ```
pub trait Dispose: Send + Sync {
    fn dispose(&self) -> impl Future<Output = Result<(), StdError>> + Send;
}

#[async_trait]
pub(crate) trait DynDispose: Send + Sync {
    async fn dispose(&self, target: &Instance) -> Result<(), StdError>;
}

pub(crate) struct DisposeAdapter<T>(PhantomData<fn() -> Arc<T>>);

impl<T> DisposeAdapter<T>
where
    T: Dispose + 'static,
{
    pub(crate) fn erased() -> Arc<dyn DynDispose> {
        Arc::new(Self(PhantomData))
    }
}

#[async_trait]
impl<T> DynDispose for DisposeAdapter<T>
where
    T: Dispose + 'static,
{
    async fn dispose(&self, target: &Instance) -> Result<(), StdError> {
        let this = target
            .downcast::<T>()
            .ok_or_else(|| format!("Disposal target is not a {}", type_name::<T>()))?;
        this.dispose().await
    }
}

/// A named post-construct or pre-destroy method.
#[derive(Clone)]
pub(crate) struct Hook {
    name: Cow<'static, str>,
    func: HookFn,
}

#[derive(Clone)]
enum HookFn {
    Sync(Arc<dyn Fn(&Instance) -> Result<(), StdError> + Send + Sync>),
    Async(Arc<dyn Fn(Instance) -> BoxFuture<'static, Result<(), StdError>> + Send + Sync>),
}

impl Hook {
    pub(crate) fn new_sync<T, F>(name: Cow<'static, str>, func: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&T) -> Result<(), StdError> + Send + Sync + 'static,
    {
        Self {
            name,
            func: HookFn::Sync(Arc::new(move |target: &Instance| {
                let this = target
                    .downcast::<T>()
                    .ok_or_else(|| format!("Hook target is not a {}", type_name::<T>()))?;
                func(&this)
            })),
        }
    }

    pub(crate) fn new_async<T, F, Fut>(name: Cow<'static, str>, func: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(Arc<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), StdError>> + Send + 'static,
    {
        Self {
            name,
            func: HookFn::Async(Arc::new(
                move |target: Instance| -> BoxFuture<'static, Result<(), StdError>> {
                    match target.downcast::<T>() {
                        Some(this) => Box::pin(func(this)),
                        None => Box::pin(std::future::ready(Err(format!(
                            "Hook target is not a {}",
                            type_name::<T>()
                        )
                        .into()))),
                    }
                },
            )),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Runs the hook without suspending. Asynchronous hooks cannot run here
    /// and report an error instead.
    pub(crate) fn call_sync(&self, target: &Instance) -> Result<(), StdError> {
        match &self.func {
            HookFn::Sync(func) => func(target),
            HookFn::Async(_) => Err(format!(
                "Hook {} is asynchronous and needs an asynchronous resolution",
                self.name
            )
            .into()),
        }
    }

    pub(crate) async fn call(&self, target: Instance) -> Result<(), StdError> {
        match &self.func {
            HookFn::Sync(func) => func(&target),
            HookFn::Async(func) => func(target).await,
        }
    }
}

/// Cleanup steps captured when a cached instance is constructed.
#[derive(Clone, Default)]
pub(crate) struct Teardown {
    steps: Vec<(Instance, Step)>,
}

#[derive(Clone)]
enum Step {
    Dispose(Arc<dyn DynDispose>),
    Hook(Hook),
}

impl Teardown {
    pub(crate) fn dispose(&mut self, target: Instance, disposer: Arc<dyn DynDispose>) {
        self.steps.push((target, Step::Dispose(disposer)));
    }

    pub(crate) fn hook(&mut self, target: Instance, hook: Hook) {
        self.steps.push((target, Step::Hook(hook)));
    }

    /// Runs every step in order. Failures are logged and do not stop the
    /// remaining steps.
    pub(crate) async fn run(&self, identifier: &ServiceId) {
        for (target, step) in &self.steps {
            match step {
                Step::Dispose(disposer) => {
                    if let Err(err) = disposer.dispose(target).await {
                        tracing::error!(service = %identifier, "Cannot dispose service: {err}");
                    }
                }
                Step::Hook(hook) => {
                    if let Err(err) = hook.call(target.clone()).await {
                        tracing::error!(
                            service = %identifier,
                            hook = hook.name(),
                            "Pre-destroy hook failed: {err}"
                        );
                    }
                }
            }
        }
    }
}
