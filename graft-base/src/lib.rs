//! # graft-base
//!
//! Application glue for the graft dependency injection runtime.
//!
//! ## Core Components
//!
//! - **Configuration**: JSON documents of typed sections, loaded from strings or files and merged
//! - **Tracing**: `tracing-subscriber` setup with a runtime-adjustable level
//! - **Application Context**: the container and subscriber created once at startup
//! - **Bundles**: reusable groups of registrations
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use graft::{Injectable, Register as _, Resolve as _};
//! use graft_base::{AppContext, BundleExt as _};
//!
//! #[derive(Injectable)]
//! struct Greeter;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), graft::StdError> {
//!     let context = AppContext::load("config.json").await?;
//!     context
//!         .container()
//!         .add_bundle(|c| c.register_singleton::<Greeter>().map(|_| ()))?;
//!     let _greeter: Arc<Greeter> = context.container().resolve()?;
//!     context.shutdown().await;
//!     Ok(())
//! }
//! ```

mod bundle;
mod config;
mod context;
mod tracing;

pub use bundle::*;
pub use config::*;
pub use context::*;
pub use tracing::*;
