//! The storage driver capability and its configuration record.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::hash::{FileHash, Payload};

/// Trait for storage backends.
///
/// Drivers know nothing about the hash layout beyond what [`FileHash`]
/// exposes. They are shared across threads once registered.
pub trait StorageDriver: Send + Sync {
    /// Cheap liveness/writability probe, called before every selection.
    fn is_available(&self) -> bool;

    /// Persist `payload` so it can be found again by `hash`.
    fn write(&self, hash: &FileHash, payload: &Payload<'_>) -> Result<()>;

    /// Read stored content.
    ///
    /// Returns `Ok(None)` if nothing is stored under `hash`.
    fn read_content(&self, hash: &FileHash) -> Result<Option<Vec<u8>>>;

    /// Where the content for `hash` can be fetched from (URL or path).
    ///
    /// Derived from the hash and static configuration only.
    fn locator(&self, hash: &FileHash) -> String;
}

/// One `[[storage]]` entry.
///
/// ```toml
/// [[storage]]
/// id = 1
/// driver = "local"
/// path = "/srv/files"
/// url = "https://files.example.com"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Unique storage id, 1..=255.
    pub id: i64,

    /// Driver type tag, e.g. `local`.
    #[serde(alias = "type")]
    pub driver: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Driver-specific settings.
    #[serde(flatten)]
    pub options: toml::Table,
}

fn default_true() -> bool {
    true
}

impl DriverConfig {
    pub fn new(id: i64, driver: impl Into<String>) -> Self {
        Self {
            id,
            driver: driver.into(),
            enabled: true,
            options: toml::Table::new(),
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<toml::Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// Deserialize the driver-specific settings.
    pub fn options<T: DeserializeOwned>(&self) -> Result<T> {
        toml::Value::Table(self.options.clone())
            .try_into()
            .with_context(|| format!("invalid options for {} storage {}", self.driver, self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Deserialize)]
    struct Opts {
        path: String,
        #[serde(default)]
        levels: u32,
    }

    #[test]
    fn test_parse_from_toml() {
        let config: DriverConfig = toml::from_str(
            r#"
            id = 3
            driver = "local"
            path = "/srv/files"
            "#,
        )
        .unwrap();

        assert_eq!(config.id, 3);
        assert_eq!(config.driver, "local");
        assert!(config.enabled);
        assert_eq!(config.options.get("path").and_then(|v| v.as_str()), Some("/srv/files"));
    }

    #[test]
    fn test_type_alias_and_disabled() {
        let config: DriverConfig = toml::from_str(
            r#"
            id = 1
            type = "memory"
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(config.driver, "memory");
        assert!(!config.enabled);
        assert!(config.options.is_empty());
    }

    #[test]
    fn test_typed_options() {
        let config = DriverConfig::new(1, "local")
            .with_option("path", "/tmp/x")
            .with_option("levels", 3);
        let opts: Opts = config.options().unwrap();
        assert_eq!(opts.path, "/tmp/x");
        assert_eq!(opts.levels, 3);
    }

    #[test]
    fn test_typed_options_error_mentions_storage() {
        let config = DriverConfig::new(7, "local");
        let err = config.options::<Opts>().unwrap_err();
        assert!(err.to_string().contains("storage 7"));
    }
}
