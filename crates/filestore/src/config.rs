//! Storage configuration: the storage list and extension table location.
//!
//! ```toml
//! extension_map = "/etc/filestore/extension_map.json"   # optional
//!
//! [[storage]]
//! id = 1
//! driver = "local"
//! path = "/srv/files"
//! url = "https://files.example.com"
//!
//! [[storage]]
//! id = 2
//! driver = "local"
//! path = "/mnt/backup/files"
//! enabled = false
//! ```
//!
//! Files are discovered in order (later wins):
//! 1. `/etc/filestore/config.toml` (system)
//! 2. `~/.config/filestore/config.toml` (user)
//! 3. `./filestore.toml`, or the explicit path / `FILESTORE_CONFIG`
//!
//! `FILESTORE_EXTENSION_MAP` overrides the extension table path.

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::DriverConfig;
use crate::extension::{ExtensionMap, ExtensionMapError};

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("storage list is undefined in {path}")]
    MissingStorageList { path: PathBuf },

    #[error("no config file found")]
    NotFound,

    #[error(transparent)]
    ExtensionMap(#[from] ExtensionMapError),
}

/// Where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded, in order.
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values.
    pub env_overrides: Vec<String>,
}

/// Complete storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// JSON extension table. The built-in table is used when unset.
    #[serde(default)]
    pub extension_map: Option<PathBuf>,

    /// Storages in priority order.
    pub storage: Vec<DriverConfig>,
}

impl StorageConfig {
    pub fn new(storage: Vec<DriverConfig>) -> Self {
        Self {
            extension_map: None,
            storage,
        }
    }

    /// Load from the standard locations plus environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(None)?;
        Ok(config)
    }

    /// Load with `config_path` taking the place of `./filestore.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load and report which files and variables were used.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();

        let env_path = env::var("FILESTORE_CONFIG").ok().map(|v| expand_path(&v));
        if env_path.is_some() && config_path.is_none() {
            sources.env_overrides.push("FILESTORE_CONFIG".to_string());
        }
        let override_path = config_path.map(Path::to_path_buf).or(env_path);

        let mut config: Option<StorageConfig> = None;
        for path in discover_config_files_with_override(override_path.as_deref()) {
            let file_config = Self::from_file(&path)?;
            config = Some(match config {
                Some(base) => merge_configs(base, file_config),
                None => file_config,
            });
            sources.files.push(path);
        }

        let mut config = config.ok_or(ConfigError::NotFound)?;
        apply_env_overrides(&mut config, &mut sources);

        tracing::debug!(files = ?sources.files, overrides = ?sources.env_overrides, "loaded storage config");
        Ok((config, sources))
    }

    /// Load a single TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        parse_toml(&contents, path)
    }

    /// Parse TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        parse_toml(contents, Path::new("<inline>"))
    }

    /// Load the configured extension table, or the built-in one.
    pub fn extension_map(&self) -> Result<ExtensionMap, ConfigError> {
        let map = match &self.extension_map {
            Some(path) => ExtensionMap::from_file(path)?,
            None => ExtensionMap::builtin()?,
        };
        Ok(map)
    }
}

fn parse_toml(contents: &str, path: &Path) -> Result<StorageConfig, ConfigError> {
    let parse_error = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let table: toml::Table = contents
        .parse()
        .map_err(|e: toml::de::Error| parse_error(e.to_string()))?;

    if !table.contains_key("storage") {
        return Err(ConfigError::MissingStorageList {
            path: path.to_path_buf(),
        });
    }

    let mut config: StorageConfig = toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| parse_error(e.to_string()))?;

    config.extension_map = config
        .extension_map
        .map(|p| expand_path(&p.to_string_lossy()));

    Ok(config)
}

/// Overlay wins for whatever it sets.
///
/// The storage list is replaced as a whole, never merged entry by entry.
pub fn merge_configs(base: StorageConfig, overlay: StorageConfig) -> StorageConfig {
    StorageConfig {
        extension_map: overlay.extension_map.or(base.extension_map),
        storage: overlay.storage,
    }
}

/// Discover config files, optionally with an explicit override path.
///
/// If `override_path` exists it replaces the local `./filestore.toml`.
pub fn discover_config_files_with_override(override_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/filestore/config.toml");
    if system.exists() {
        files.push(system);
    }

    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("filestore/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = override_path {
        if path.exists() {
            files.push(path.to_path_buf());
            return files;
        }
    }

    let local = PathBuf::from("filestore.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

pub fn apply_env_overrides(config: &mut StorageConfig, sources: &mut ConfigSources) {
    if let Ok(v) = env::var("FILESTORE_EXTENSION_MAP") {
        config.extension_map = Some(expand_path(&v));
        sources
            .env_overrides
            .push("FILESTORE_EXTENSION_MAP".to_string());
    }
}

/// Expand a leading `~/` or `$VAR/` in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(stripped);
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        let (var_name, rest) = match stripped.find('/') {
            Some(pos) => (&stripped[..pos], Some(&stripped[pos + 1..])),
            None => (stripped, None),
        };
        if let Ok(value) = env::var(var_name) {
            let base = PathBuf::from(value);
            return match rest {
                Some(rest) => base.join(rest),
                None => base,
            };
        }
    }
    PathBuf::from(path)
}
