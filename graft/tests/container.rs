use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use graft::{
    Arguments, Container, ContainerConfig, Dependencies, DiError, Injectable, Lifetime, Parameter,
    ProducerKind, Register as _, Registration, Resolve as _, ServiceId, StdError, Token,
};

struct Logger;

impl Injectable for Logger {
    fn construct(_args: &mut Arguments) -> Result<Self, StdError> {
        Ok(Self)
    }
}

struct Service {
    logger: Arc<Logger>,
}

impl Injectable for Service {
    fn dependencies() -> Dependencies {
        Dependencies::new().param::<Logger>()
    }

    fn construct(args: &mut Arguments) -> Result<Self, StdError> {
        Ok(Self {
            logger: args.required()?,
        })
    }
}

#[test]
fn test_singleton_identity() {
    let container = Container::new();
    container.register_singleton::<Logger>().unwrap();
    let first = container.resolve::<Logger>().unwrap();
    for _ in 0..5 {
        assert!(Arc::ptr_eq(&first, &container.resolve::<Logger>().unwrap()));
    }
    assert!(container.is_cached(ServiceId::of::<Logger>()));
}

#[test]
fn test_transient_distinct() {
    let container = Container::new();
    container.register_transient::<Logger>().unwrap();
    let instances: Vec<_> = (0..4)
        .map(|_| container.resolve::<Logger>().unwrap())
        .collect();
    for (i, lhs) in instances.iter().enumerate() {
        for rhs in &instances[i + 1..] {
            assert!(!Arc::ptr_eq(lhs, rhs));
        }
    }
    assert!(!container.is_cached(ServiceId::of::<Logger>()));
}

#[test]
fn test_logger_service_lifetimes() {
    let container = Container::new();
    container
        .register_singleton::<Logger>()
        .unwrap()
        .register_singleton::<Service>()
        .unwrap();
    let first = container.resolve::<Service>().unwrap();
    let second = container.resolve::<Service>().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&first.logger, &second.logger));

    container.register_transient::<Service>().unwrap();
    let third = container.resolve::<Service>().unwrap();
    let fourth = container.resolve::<Service>().unwrap();
    assert!(!Arc::ptr_eq(&third, &fourth));
    assert!(Arc::ptr_eq(&third.logger, &fourth.logger));
    assert!(Arc::ptr_eq(&third.logger, &first.logger));
}

#[test]
fn test_reregistered_singleton_is_rebuilt() {
    let container = Container::new();
    container.register_value(1u32).unwrap();
    assert_eq!(*container.resolve::<u32>().unwrap(), 1);
    container.register_value(2u32).unwrap();
    assert_eq!(*container.resolve::<u32>().unwrap(), 2);
}

#[test]
fn test_missing_service() {
    let container = Container::new();
    assert!(matches!(
        container.resolve::<Logger>(),
        Err(DiError::ServiceNotFound { identifier }) if identifier == ServiceId::of::<Logger>()
    ));
    assert!(container.try_resolve::<Logger>().is_none());

    container.register_singleton::<Service>().unwrap();
    assert!(matches!(
        container.resolve::<Service>(),
        Err(DiError::ServiceNotFound { identifier }) if identifier == ServiceId::of::<Logger>()
    ));
    assert!(container.try_resolve::<Service>().is_none());
}

#[test]
fn test_invalid_registration() {
    let container = Container::new();
    let err = container
        .register(Registration::new().with_identifier("nothing"))
        .unwrap_err();
    assert!(matches!(err, DiError::InvalidRegistration(_)));
    assert!(!container.is_registered(ServiceId::named("nothing")));

    let err = container
        .register(
            Registration::implementation::<Logger>(Lifetime::Singleton)
                .with_instance(Arc::new(Logger)),
        )
        .unwrap_err();
    assert!(matches!(err, DiError::InvalidRegistration(_)));
}

#[test]
fn test_get_registration() {
    let container = Container::new();
    container.register_scoped::<Service>().unwrap();
    let registration = container.get_registration(ServiceId::of::<Service>()).unwrap();
    assert_eq!(registration.lifetime(), Lifetime::Scoped);
    assert_eq!(registration.kind(), Some(ProducerKind::Implementation));
    assert_eq!(
        registration.identifier(),
        Some(&ServiceId::of::<Service>())
    );
    assert!(
        registration
            .implementation_type()
            .is_some_and(|name| name.ends_with("Service"))
    );
    assert!(container.get_registration(ServiceId::of::<Logger>()).is_none());
}

const GREETING: Token<String> = Token::named("greeting");

#[test]
fn test_factory() {
    let calls = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    container.register_singleton::<Logger>().unwrap();
    let counter = calls.clone();
    container
        .register_factory(&GREETING, Lifetime::Transient, move |resolver| {
            counter.fetch_add(1, Ordering::SeqCst);
            resolver.resolve::<Logger>()?;
            Ok(Arc::new("hello".to_string()))
        })
        .unwrap();
    assert_eq!(*container.resolve_token(&GREETING).unwrap(), "hello");
    assert_eq!(*container.resolve_token(&GREETING).unwrap(), "hello");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_factory_errors() {
    let container = Container::new();
    container
        .register_factory(&GREETING, Lifetime::Singleton, |_| {
            Err::<Arc<String>, _>("no greeting today".into())
        })
        .unwrap();
    assert!(matches!(
        container.resolve_token(&GREETING),
        Err(DiError::Construction { identifier, .. }) if identifier == *GREETING.id()
    ));

    container
        .register_factory(&GREETING, Lifetime::Singleton, |resolver| {
            let logger = resolver.resolve::<Logger>()?;
            let _ = logger;
            Ok(Arc::new("unreachable".to_string()))
        })
        .unwrap();
    assert!(matches!(
        container.resolve_token(&GREETING),
        Err(DiError::ServiceNotFound { identifier }) if identifier == ServiceId::of::<Logger>()
    ));
}

trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

struct English {
    #[allow(unused)]
    logger: Arc<Logger>,
}

impl Greeter for English {
    fn greet(&self) -> String {
        "hello".into()
    }
}

impl Injectable for English {
    fn dependencies() -> Dependencies {
        Dependencies::new().param::<Logger>()
    }

    fn construct(args: &mut Arguments) -> Result<Self, StdError> {
        Ok(Self {
            logger: args.required()?,
        })
    }
}

#[test]
fn test_contract() {
    let container = Container::new();
    container
        .register_singleton::<Logger>()
        .unwrap()
        .register_contract::<dyn Greeter, English>(Lifetime::Singleton, |english| english)
        .unwrap();
    let greeter = container.resolve::<dyn Greeter>().unwrap();
    assert_eq!(greeter.greet(), "hello");
    assert!(Arc::ptr_eq(&greeter, &container.resolve::<dyn Greeter>().unwrap()));
    assert!(!container.is_registered(ServiceId::of::<English>()));
}

struct Report {
    greeting: Arc<String>,
}

impl Injectable for Report {
    fn dependencies() -> Dependencies {
        Dependencies::new().with(Parameter::of::<String>().inject(&GREETING))
    }

    fn construct(args: &mut Arguments) -> Result<Self, StdError> {
        Ok(Self {
            greeting: args.required()?,
        })
    }
}

#[test]
fn test_named_injection() {
    let container = Container::new();
    container
        .register_instance(&GREETING, Arc::new("hi".to_string()))
        .unwrap()
        .register_transient::<Report>()
        .unwrap();
    assert_eq!(*container.resolve::<Report>().unwrap().greeting, "hi");
}

#[test]
fn test_type_mismatch() {
    let container = Container::new();
    container
        .register(
            Registration::new()
                .with_identifier(&GREETING)
                .with_instance(Arc::new(42u32)),
        )
        .unwrap();
    assert!(matches!(
        container.resolve_token(&GREETING),
        Err(DiError::TypeMismatch { .. })
    ));
}

#[test]
fn test_metrics() {
    let container = Container::new();
    container
        .register_singleton::<Logger>()
        .unwrap()
        .register_transient::<Service>()
        .unwrap();
    container.resolve::<Service>().unwrap();
    assert!(container.resolve::<English>().is_err());

    let metrics = container.metrics();
    assert_eq!(metrics.total_registrations, 2);
    // Service, Logger and the failed English.
    assert_eq!(metrics.total_resolutions, 3);
    assert_eq!(metrics.failed_resolutions, 1);
    assert_eq!(metrics.cached_instances, 1);

    container.metrics_collector().reset();
    let metrics = container.metrics();
    assert_eq!(metrics.total_resolutions, 0);
    assert_eq!(metrics.cached_instances, 1);
}

#[test]
fn test_config_is_kept() {
    let container = Container::with_config(ContainerConfig {
        max_resolution_depth: 3,
        ..Default::default()
    });
    assert_eq!(container.config().max_resolution_depth, 3);
}
