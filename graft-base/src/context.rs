use std::path::Path;

use graft::{Container, ContainerConfig, Register as _, StdError};

use crate::{Config, ConfigSection as _, Tracing, TracingConfig};

/// Application-wide context created once at startup.
///
/// Owns the container and the tracing subscriber. Subsystems receive the
/// context (or its container) by reference; [`AppContext::shutdown`]
/// disposes everything the container retained.
///
/// # Examples
///
/// ```rust
/// use graft::Resolve as _;
/// use graft_base::{AppContext, Config};
///
/// # async fn example() -> Result<(), graft::StdError> {
/// let config = Config::parse(r#"{"container": {"max_resolution_depth": 16}}"#)?;
/// let context = AppContext::bootstrap(config)?;
/// assert_eq!(context.container().config().max_resolution_depth, 16);
/// assert!(context.container().resolve::<Config>().is_ok());
/// context.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct AppContext {
    config: Config,
    container: Container,
    tracing: Option<Tracing>,
}

impl AppContext {
    /// Builds the container from the `container` section and installs
    /// tracing if a `tracing` section is present.
    ///
    /// The configuration itself is registered as a singleton instance.
    pub fn bootstrap(config: Config) -> Result<Self, StdError> {
        let container_config = config.section::<ContainerConfig>()?;
        let tracing = match config.get::<Option<TracingConfig>>(TracingConfig::key())? {
            Some(tracing_config) => {
                match Tracing::init(&tracing_config, container_config.log_level) {
                    Ok(v) => Some(v),
                    Err(err) => {
                        tracing::warn!("Cannot install tracing subscriber: {err}");
                        None
                    }
                }
            }
            None => None,
        };
        let container = Container::with_config(container_config);
        container.register_value(config.clone())?;
        tracing::debug!(
            sections = ?config.sections().collect::<Vec<_>>(),
            "Application context ready"
        );
        Ok(Self {
            config,
            container,
            tracing,
        })
    }

    /// Reads the configuration file at `path` and bootstraps from it.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StdError> {
        Self::bootstrap(Config::parse_file(path).await?)
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Installed subscriber, `None` without a `tracing` section or if another
    /// subscriber was already installed.
    pub fn tracing(&self) -> Option<&Tracing> {
        self.tracing.as_ref()
    }

    /// Disposes the container.
    pub async fn shutdown(self) {
        self.container.dispose().await;
        tracing::debug!("Application context shut down");
    }
}
