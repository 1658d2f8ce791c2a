use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use graft::{ContainerConfig, Register, StdError, Token};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// JSON document of named configuration sections.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub(crate) configs: BTreeMap<String, Value>,
}

/// A typed section of [`Config`] stored under a fixed key.
pub trait ConfigSection: DeserializeOwned {
    fn key() -> &'static str;
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T>(&self, name: impl AsRef<str>) -> Result<T, StdError>
    where
        T: DeserializeOwned,
    {
        let value = self.configs.get(name.as_ref()).cloned();
        Ok(serde_json::from_value(value.unwrap_or_default())?)
    }

    /// Returns the section `T`, or its default if the section is missing.
    pub fn section<T>(&self) -> Result<T, StdError>
    where
        T: ConfigSection + Default,
    {
        Ok(self.get::<Option<T>>(T::key())?.unwrap_or_default())
    }

    pub fn set<T>(&mut self, name: impl Into<String>, value: T) -> Result<(), StdError>
    where
        T: Serialize,
    {
        self.configs
            .insert(name.into(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Registers the section `T` as a singleton instance of `registry`.
    ///
    /// A missing section registers the default value.
    pub fn register_section<T, R>(&self, registry: &R) -> Result<(), StdError>
    where
        T: ConfigSection + Default + Send + Sync + 'static,
        R: Register,
    {
        let section = self.section::<T>()?;
        registry.register_instance(&Token::<T>::of(), Arc::new(section))?;
        Ok(())
    }

    /// Overlays `other` onto this document. Objects merge key by key,
    /// arrays are concatenated and other values are replaced.
    pub fn merge_from(&mut self, other: Self) {
        for (key, value) in other.configs {
            merge_value(self.configs.entry(key).or_default(), value);
        }
    }

    pub fn parse<T>(text: T) -> Result<Self, StdError>
    where
        T: AsRef<str>,
    {
        Ok(serde_json::from_str(text.as_ref())?)
    }

    pub async fn parse_file(path: impl AsRef<Path>) -> Result<Self, StdError> {
        let text = tokio::fs::read_to_string(path).await?;
        Self::parse(text)
    }

    /// Keys of the sections present, in order.
    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.configs.keys().map(String::as_str)
    }
}

impl ConfigSection for ContainerConfig {
    fn key() -> &'static str {
        "container"
    }
}

fn merge_value(target: &mut Value, value: Value) {
    match (target, value) {
        (Value::Object(target), Value::Object(value)) => {
            for (key, value) in value {
                merge_value(target.entry(key).or_insert(Value::Null), value);
            }
        }
        (Value::Array(target), Value::Array(value)) => target.extend(value),
        (target, value) => *target = value,
    }
}
