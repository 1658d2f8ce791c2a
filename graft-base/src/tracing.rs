use std::str::FromStr as _;

use graft::StdError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing_subscriber::filter::{Directive, EnvFilter};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{Registry, reload};

use crate::ConfigSection;

/// Installed tracing subscriber with a reloadable level filter.
pub struct Tracing {
    default_level: tracing::Level,
    directives: Vec<Directive>,
    reload_handle: reload::Handle<EnvFilter, Registry>,
}

impl Tracing {
    /// Installs the global subscriber.
    ///
    /// `default_level` applies when the section does not set a level. Fails
    /// if a directive cannot be parsed or a global subscriber is already set.
    pub fn init(config: &TracingConfig, default_level: tracing::Level) -> Result<Self, StdError> {
        let mut directives = Vec::new();
        for directive in &config.directives {
            directives.push(directive.parse().map_err(Box::new)?);
        }
        let default_level = config.level.unwrap_or(default_level);
        let (env_filter, reload_handle) =
            reload::Layer::new(new_env_filter(&directives, default_level));
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::Layer::default())
            .try_init()?;
        Ok(Self {
            default_level,
            directives,
            reload_handle,
        })
    }

    pub fn default_level(&self) -> tracing::Level {
        self.default_level
    }

    /// Changes the level at runtime. `None` restores the default level.
    pub fn set_level(&self, level: Option<tracing::Level>) -> Result<(), StdError> {
        let level = level.unwrap_or(self.default_level);
        self.reload_handle
            .reload(new_env_filter(&self.directives, level))?;
        Ok(())
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TracingConfig {
    #[serde(
        default,
        serialize_with = "serialize_level",
        deserialize_with = "deserialize_level"
    )]
    pub level: Option<tracing::Level>,
    #[serde(default)]
    pub directives: Vec<String>,
}

impl ConfigSection for TracingConfig {
    fn key() -> &'static str {
        "tracing"
    }
}

fn new_env_filter(directives: &[Directive], level: tracing::Level) -> EnvFilter {
    let mut filter = EnvFilter::default();
    for directive in directives {
        filter = filter.add_directive(directive.clone());
    }
    filter.add_directive(level.into())
}

fn serialize_level<S>(v: &Option<tracing::Level>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match v {
        Some(v) => serializer.serialize_some(v.as_str()),
        None => serializer.serialize_none(),
    }
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<Option<tracing::Level>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    Option::<String>::deserialize(deserializer)?
        .map(|v| tracing::Level::from_str(&v).map_err(|v| Error::custom(format!("{v}"))))
        .transpose()
}
