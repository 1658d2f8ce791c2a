use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use graft::{
    Arguments, Container, Dependencies, DiError, Injectable, Lifetime, Register as _,
    Resolve as _, ServiceId, StdError, Token,
};
use tokio::sync::Notify;

struct Connection {
    serial: usize,
}

const CONNECTION: Token<Connection> = Token::named("connection");

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_async_singleton_built_once() {
    let built = Arc::new(AtomicUsize::new(0));
    let container = Container::new();
    let counter = built.clone();
    container
        .register_async_factory(&CONNECTION, Lifetime::Singleton, move |_| {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let serial = counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StdError>(Arc::new(Connection { serial }))
            }
        })
        .unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let container = container.clone();
            tokio::spawn(async move { container.resolve_token_async(&CONNECTION).await })
        })
        .collect();
    let mut connections = Vec::new();
    for task in tasks {
        connections.push(task.await.unwrap().unwrap());
    }

    assert_eq!(built.load(Ordering::SeqCst), 1);
    assert!(connections.iter().all(|c| Arc::ptr_eq(c, &connections[0])));
    assert_eq!(connections[0].serial, 0);
    assert_eq!(container.metrics().circular_dependencies, 0);
}

struct Settings;

impl Injectable for Settings {
    fn construct(_args: &mut Arguments) -> Result<Self, StdError> {
        std::thread::sleep(Duration::from_millis(20));
        Ok(Self)
    }
}

struct Worker {
    settings: Arc<Settings>,
}

impl Injectable for Worker {
    fn dependencies() -> Dependencies {
        Dependencies::new().param::<Settings>()
    }

    fn construct(args: &mut Arguments) -> Result<Self, StdError> {
        Ok(Self {
            settings: args.required()?,
        })
    }
}

#[test]
fn test_parallel_sync_resolutions() {
    let container = Container::new();
    container
        .register_singleton::<Settings>()
        .unwrap()
        .register_transient::<Worker>()
        .unwrap();

    let workers: Vec<_> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|_| s.spawn(|| container.resolve::<Worker>()))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect()
    });

    let settings = container.resolve::<Settings>().unwrap();
    assert!(workers.iter().all(|w| Arc::ptr_eq(&w.settings, &settings)));
    let metrics = container.metrics();
    assert_eq!(metrics.circular_dependencies, 0);
    assert_eq!(metrics.failed_resolutions, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sync_resolution_during_async_construction() {
    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let container = Container::new();
    {
        let started = started.clone();
        let release = release.clone();
        container
            .register_async_factory(&CONNECTION, Lifetime::Singleton, move |_| {
                let started = started.clone();
                let release = release.clone();
                async move {
                    started.notify_one();
                    release.notified().await;
                    Ok::<_, StdError>(Arc::new(Connection { serial: 7 }))
                }
            })
            .unwrap();
    }

    let pending = {
        let container = container.clone();
        tokio::spawn(async move { container.resolve_token_async(&CONNECTION).await })
    };
    started.notified().await;

    assert!(matches!(
        container.resolve_token(&CONNECTION),
        Err(DiError::ConstructionInProgress { .. })
    ));

    release.notify_one();
    let connection = pending.await.unwrap().unwrap();
    assert_eq!(connection.serial, 7);
    assert!(Arc::ptr_eq(
        &connection,
        &container.resolve_token(&CONNECTION).unwrap()
    ));
}

struct Endpoint;

const UPSTREAM: Token<Endpoint> = Token::named("upstream");
const DOWNSTREAM: Token<Endpoint> = Token::named("downstream");

/// Registers `token` as an async singleton that suspends, then resolves `peer`.
fn register_endpoint(container: &Container, token: &Token<Endpoint>, peer: &Token<Endpoint>) {
    let peer = peer.clone();
    container
        .register_async_factory(token, Lifetime::Singleton, move |resolver| {
            let peer = peer.clone();
            async move {
                tokio::task::yield_now().await;
                resolver.resolve_token_async(&peer).await?;
                Ok::<_, StdError>(Arc::new(Endpoint))
            }
        })
        .unwrap();
}

#[tokio::test]
async fn test_concurrent_cycle_from_both_ends() {
    let container = Container::new();
    register_endpoint(&container, &UPSTREAM, &DOWNSTREAM);
    register_endpoint(&container, &DOWNSTREAM, &UPSTREAM);

    let upstream_token = &UPSTREAM;
    let downstream_token = &DOWNSTREAM;
    let (upstream, downstream) = tokio::time::timeout(Duration::from_secs(2), async {
        tokio::join!(
            container.resolve_token_async(upstream_token),
            container.resolve_token_async(downstream_token),
        )
    })
    .await
    .expect("resolutions waiting for each other");

    let upstream_id = ServiceId::named("upstream");
    let downstream_id = ServiceId::named("downstream");
    assert!(matches!(
        upstream,
        Err(DiError::CircularDependency { cycle })
            if cycle == [upstream_id.clone(), downstream_id.clone(), upstream_id.clone()]
    ));
    assert!(matches!(
        downstream,
        Err(DiError::CircularDependency { cycle })
            if cycle == [downstream_id.clone(), upstream_id.clone(), downstream_id.clone()]
    ));
    assert_eq!(container.metrics().circular_dependencies, 2);
    assert!(!container.is_cached(&UPSTREAM));
    assert!(!container.is_cached(&DOWNSTREAM));
}

#[test]
fn test_parallel_sync_cycle_from_both_ends() {
    struct Left;
    struct Right;

    impl Injectable for Left {
        fn dependencies() -> Dependencies {
            Dependencies::new().param::<Right>()
        }

        fn construct(_args: &mut Arguments) -> Result<Self, StdError> {
            Ok(Self)
        }
    }

    impl Injectable for Right {
        fn dependencies() -> Dependencies {
            Dependencies::new().param::<Left>()
        }

        fn construct(_args: &mut Arguments) -> Result<Self, StdError> {
            Ok(Self)
        }
    }

    let container = Container::new();
    container
        .register_singleton::<Left>()
        .unwrap()
        .register_singleton::<Right>()
        .unwrap();

    std::thread::scope(|s| {
        let left = s.spawn(|| container.resolve::<Left>().map(|_| ()));
        let right = s.spawn(|| container.resolve::<Right>().map(|_| ()));
        for handle in [left, right] {
            assert!(matches!(
                handle.join().unwrap(),
                Err(DiError::CircularDependency { .. })
            ));
        }
    });
    assert!(!container.is_cached(ServiceId::of::<Left>()));
}
