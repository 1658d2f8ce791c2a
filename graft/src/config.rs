use std::str::FromStr as _;
use std::time::Duration;

use duration_str::deserialize_option_duration;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Container configuration, fixed for the lifetime of a container.
///
/// Deserializes from a partial document; missing fields take their defaults:
///
/// ```rust
/// use graft::{ContainerConfig, EnrichmentPolicy};
///
/// let config: ContainerConfig = serde_json::from_str(
///     r#"{"max_resolution_depth": 8, "slow_resolution_threshold": "250ms"}"#,
/// ).unwrap();
/// assert_eq!(config.max_resolution_depth, 8);
/// assert!(config.enable_circular_dependency_detection);
/// assert_eq!(config.enrichment_policy, EnrichmentPolicy::BestEffort);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// Reject registrations that do not declare exactly one producer.
    pub enable_validation: bool,
    /// Fail with `CircularDependency` when an identifier re-enters its own chain.
    pub enable_circular_dependency_detection: bool,
    /// Bind lazy constructor parameters to deferred handles instead of
    /// resolving them eagerly.
    pub enable_lazy_loading: bool,
    /// Longest resolution chain allowed before `DepthExceeded`.
    pub max_resolution_depth: usize,
    #[serde(serialize_with = "serialize_level", deserialize_with = "deserialize_level")]
    pub log_level: tracing::Level,
    pub enrichment_policy: EnrichmentPolicy,
    #[serde(
        serialize_with = "serialize_option_duration",
        deserialize_with = "deserialize_option_duration"
    )]
    pub slow_resolution_threshold: Option<Duration>,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            enable_validation: true,
            enable_circular_dependency_detection: true,
            enable_lazy_loading: true,
            max_resolution_depth: DEFAULT_MAX_RESOLUTION_DEPTH,
            log_level: tracing::Level::INFO,
            enrichment_policy: EnrichmentPolicy::default(),
            slow_resolution_threshold: None,
        }
    }
}

/// What happens when property injection or a post-construct hook fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentPolicy {
    /// Log the failure and hand out the instance anyway.
    #[default]
    BestEffort,
    /// Fail the resolution with `DiError::Enrichment` and drop the instance.
    FailFast,
}

const DEFAULT_MAX_RESOLUTION_DEPTH: usize = 50;

fn serialize_level<S>(v: &tracing::Level, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(v.as_str())
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<tracing::Level, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    String::deserialize(deserializer)
        .and_then(|v| tracing::Level::from_str(&v).map_err(|v| Error::custom(format!("{v}"))))
}

fn serialize_option_duration<S>(v: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match v {
        Some(v) => serializer.serialize_some(&format!("{}ms", v.as_millis())),
        None => serializer.serialize_none(),
    }
}
