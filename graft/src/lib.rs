//! # graft
//!
//! A dependency injection runtime: a registry of service bindings and a
//! resolver that builds object graphs with the right instance lifetimes.
//!
//! ## Core Concepts
//!
//! - **Container**: owns registrations and singleton instances, resolves services
//! - **Scope**: child resolution context with its own cache for scoped services
//! - **Registration**: binds a [`ServiceId`] to an implementation, a factory or an instance
//! - **Lifetime**: `Singleton`, `Transient` or `Scoped`
//! - **Injectable**: explicit constructor parameters and post-construction metadata
//! - **Lazy**: deferred handle that breaks construction cycles
//!
//! ## Basic Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use graft::{Container, Injectable, Register, Resolve};
//!
//! #[derive(Injectable)]
//! struct Logger;
//!
//! #[derive(Injectable)]
//! struct Service {
//!     logger: Arc<Logger>,
//! }
//!
//! # fn main() -> Result<(), graft::DiError> {
//! let container = Container::new();
//! container
//!     .register_singleton::<Logger>()?
//!     .register_transient::<Service>()?;
//!
//! let first = container.resolve::<Service>()?;
//! let second = container.resolve::<Service>()?;
//! assert!(!Arc::ptr_eq(&first, &second));
//! assert!(Arc::ptr_eq(&first.logger, &second.logger));
//! # Ok(())
//! # }
//! ```
//!
//! ## Contracts and Factories
//!
//! Services can be exposed through trait objects and produced by factories,
//! including asynchronous ones:
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use graft::{Container, Injectable, Lifetime, Register, Resolve, StdError, Token};
//!
//! trait Storage: Send + Sync {
//!     fn name(&self) -> String;
//! }
//!
//! #[derive(Injectable)]
//! struct Memory;
//!
//! impl Storage for Memory {
//!     fn name(&self) -> String {
//!         "memory".into()
//!     }
//! }
//!
//! const DSN: Token<String> = Token::named("dsn");
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let container = Container::new();
//!     container
//!         .register_contract::<dyn Storage, Memory>(Lifetime::Singleton, |memory| memory)?
//!         .register_async_factory(&DSN, Lifetime::Singleton, |resolver| async move {
//!             let storage = resolver.resolve::<dyn Storage>()?;
//!             Ok::<_, StdError>(Arc::new(format!("{}://local", storage.name())))
//!         })?;
//!
//!     assert_eq!(*container.resolve_token_async(&DSN).await?, "memory://local");
//!     container.dispose().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `macros` (default): enables `#[derive(Injectable)]`

extern crate self as graft;

mod cache;
mod config;
mod container;
mod error;
mod id;
mod inject;
mod instance;
mod lazy;
mod lifecycle;
mod metrics;
mod registration;
mod resolver;
mod scope;

pub use config::*;
pub use container::*;
pub use error::*;
pub use id::*;
pub use inject::{Arguments, Dependencies, Injectable, Metadata, Parameter, Property};
pub use instance::*;
pub use lazy::Lazy;
pub use lifecycle::{BoxFuture, Dispose};
pub use metrics::*;
pub use registration::{Implementation, Lifetime, ProducerKind, Register, Registration};
pub use resolver::{Resolve, Resolver};
pub use scope::*;

pub(crate) use lazy::LazyInstance;

#[cfg(feature = "macros")]
pub use graft_macros::*;
