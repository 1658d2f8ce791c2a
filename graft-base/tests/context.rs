use std::fs;
use std::sync::Arc;

use graft::{DiError, Injectable, Register as _, Resolve as _};
use graft_base::{AppContext, BundleExt as _, Config};
use serde::Deserialize;
use tempfile::NamedTempFile;

#[derive(Injectable)]
struct Greeter {
    config: Arc<Config>,
}

impl Greeter {
    fn greeting(&self) -> String {
        let name: Option<String> = self.config.get("name").unwrap();
        format!("hello, {}", name.as_deref().unwrap_or("world"))
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct Limits {
    requests: u32,
}

#[tokio::test]
async fn test_bootstrap() {
    let config = Config::parse(
        r#"
    {
        "name": "graft",
        "container": {
            "max_resolution_depth": 8,
            "enable_lazy_loading": false
        }
    }
    "#,
    )
    .unwrap();
    let context = AppContext::bootstrap(config).unwrap();
    assert_eq!(context.container().config().max_resolution_depth, 8);
    assert!(!context.container().config().enable_lazy_loading);
    assert!(context.tracing().is_none());

    context
        .container()
        .add_bundle(|c| c.register_singleton::<Greeter>().map(|_| ()))
        .unwrap();
    let greeter = context.container().resolve::<Greeter>().unwrap();
    assert_eq!(greeter.greeting(), "hello, graft");

    let container = context.container().clone();
    context.shutdown().await;
    assert!(container.is_disposed());
    assert!(matches!(
        container.resolve::<Greeter>(),
        Err(DiError::Disposed)
    ));
}

#[tokio::test]
async fn test_bootstrap_defaults() {
    let context = AppContext::bootstrap(Config::new()).unwrap();
    assert_eq!(context.container().config().max_resolution_depth, 50);
    assert_eq!(context.config().sections().count(), 0);
    let registered = context.container().resolve::<Config>().unwrap();
    assert_eq!(registered.sections().count(), 0);
}

#[tokio::test]
async fn test_bootstrap_invalid_container_section() {
    let config = Config::parse(r#"{"container": {"max_resolution_depth": "deep"}}"#).unwrap();
    assert!(AppContext::bootstrap(config).is_err());
}

#[tokio::test]
async fn test_load() {
    let file = NamedTempFile::new().unwrap();
    fs::write(
        file.path(),
        r#"{"limits": {"requests": 100}, "container": {"enable_validation": false}}"#,
    )
    .unwrap();

    let context = AppContext::load(file.path()).await.unwrap();
    assert!(!context.container().config().enable_validation);
    let config = context.container().resolve::<Config>().unwrap();
    let limits: Limits = config.get("limits").unwrap();
    assert_eq!(limits, Limits { requests: 100 });
    context.shutdown().await;
}

#[tokio::test]
async fn test_load_missing_file() {
    assert!(AppContext::load("missing-graft-config.json").await.is_err());
}

#[tokio::test]
async fn test_bootstrap_with_tracing() {
    let config = Config::parse(
        r#"
    {
        "container": {"log_level": "warn"},
        "tracing": {"directives": ["graft=debug"]}
    }
    "#,
    )
    .unwrap();
    let context = AppContext::bootstrap(config).unwrap();
    // The only test in this binary that installs the global subscriber.
    let tracing = context.tracing().unwrap();
    assert_eq!(tracing.default_level(), ::tracing::Level::WARN);
    tracing.set_level(Some(::tracing::Level::TRACE)).unwrap();
    tracing.set_level(None).unwrap();
    context.shutdown().await;
}
