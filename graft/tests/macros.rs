use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use graft::{
    Container, Dispose, Injectable, Lazy, Property, Register as _, Resolve as _, ServiceId,
    StdError, Token,
};

#[derive(Injectable)]
struct SimpleService;

#[derive(Injectable)]
struct Metrics;

trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

struct FixedClock(u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}

const WALL_CLOCK: Token<dyn Clock> = Token::named("wall-clock");
const REGION: Token<String> = Token::named("region");

#[derive(Injectable)]
struct ServiceWithDependencies {
    simple: Arc<SimpleService>,
    metrics: Option<Arc<Metrics>>,
    #[inject(token = WALL_CLOCK)]
    clock: Arc<dyn Clock>,
    #[inject(token = "region")]
    region: Option<Arc<String>>,
    #[inject(default)]
    requests: AtomicUsize,
}

#[test]
fn test_derive_dependencies() {
    let dependencies = ServiceWithDependencies::dependencies();
    let parameters: Vec<_> = dependencies.iter().collect();
    assert_eq!(parameters.len(), 4);
    assert_eq!(parameters[0].identifier(), &ServiceId::of::<SimpleService>());
    assert!(!parameters[0].is_optional());
    assert!(parameters[1].is_optional());
    assert_eq!(parameters[2].identifier(), WALL_CLOCK.id());
    assert_eq!(parameters[3].identifier(), REGION.id());
    assert!(parameters[3].is_optional());
    assert!(SimpleService::dependencies().is_empty());
}

#[test]
fn test_derive_resolution() {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(42));
    let container = Container::new();
    container
        .register_singleton::<SimpleService>()
        .unwrap()
        .register_transient::<ServiceWithDependencies>()
        .unwrap()
        .register_instance(&WALL_CLOCK, clock)
        .unwrap();

    let service = container.resolve::<ServiceWithDependencies>().unwrap();
    assert!(Arc::ptr_eq(
        &service.simple,
        &container.resolve::<SimpleService>().unwrap()
    ));
    assert!(service.metrics.is_none());
    assert!(service.region.is_none());
    assert_eq!(service.clock.now(), 42);
    assert_eq!(service.requests.load(Ordering::SeqCst), 0);

    container
        .register_value(Metrics)
        .unwrap()
        .register_instance(&REGION, Arc::new("eu-west".to_string()))
        .unwrap();
    let service = container.resolve::<ServiceWithDependencies>().unwrap();
    assert!(service.metrics.is_some());
    assert_eq!(service.region.as_deref().map(String::as_str), Some("eu-west"));
}

#[derive(Injectable)]
struct Node {
    #[allow(unused)]
    leaf: Arc<Leaf>,
}

#[derive(Injectable)]
struct Leaf {
    root: Lazy<Node>,
}

#[test]
fn test_derive_lazy() {
    let container = Container::new();
    container
        .register_singleton::<Node>()
        .unwrap()
        .register_singleton::<Leaf>()
        .unwrap();
    let node = container.resolve::<Node>().unwrap();
    let leaf = container.resolve::<Leaf>().unwrap();
    assert!(Arc::ptr_eq(&leaf.root.get().unwrap(), &node));
}

#[derive(Default)]
struct Journal(Mutex<Vec<&'static str>>);

impl Journal {
    fn push(&self, entry: &'static str) {
        self.0.lock().unwrap().push(entry);
    }

    fn entries(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

#[derive(Debug)]
struct NotReady;

impl std::fmt::Display for NotReady {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("not ready")
    }
}

impl std::error::Error for NotReady {}

#[derive(Injectable)]
#[injectable(post_construct = "start", post_construct_async = "warm_up")]
#[injectable(pre_destroy = "stop", pre_destroy_async = "drain", dispose)]
struct Server {
    journal: Arc<Journal>,
    metrics: Property<Metrics>,
    #[inject(token = WALL_CLOCK)]
    clock: Property<dyn Clock>,
}

impl Server {
    fn start(&self) -> Result<(), NotReady> {
        if !self.metrics.is_set() {
            return Err(NotReady);
        }
        self.journal.push("start");
        Ok(())
    }

    async fn warm_up(&self) -> Result<(), StdError> {
        tokio::task::yield_now().await;
        self.journal.push("warm up");
        Ok(())
    }

    fn stop(&self) -> Result<(), StdError> {
        self.journal.push("stop");
        Ok(())
    }

    async fn drain(&self) -> Result<(), StdError> {
        self.journal.push("drain");
        Ok(())
    }
}

impl Dispose for Server {
    async fn dispose(&self) -> Result<(), StdError> {
        self.journal.push("dispose");
        Ok(())
    }
}

#[tokio::test]
async fn test_derive_metadata() {
    let journal = Arc::new(Journal::default());
    let clock: Arc<dyn Clock> = Arc::new(FixedClock(7));
    let container = Container::new();
    container
        .register_instance(&Token::of(), journal.clone())
        .unwrap()
        .register_value(Metrics)
        .unwrap()
        .register_instance(&WALL_CLOCK, clock)
        .unwrap()
        .register_singleton::<Server>()
        .unwrap();

    let server = container.resolve_async::<Server>().await.unwrap();
    assert!(server.metrics.is_set());
    assert_eq!(server.clock.get().map(|clock| clock.now()), Some(7));
    assert_eq!(journal.entries(), ["start", "warm up"]);

    container.dispose().await;
    assert_eq!(
        journal.entries(),
        ["start", "warm up", "stop", "drain", "dispose"]
    );
}
