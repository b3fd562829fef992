//! Driver registry: builds drivers from config by type tag and keeps them in
//! configuration order.
//!
//! Configuration order is the default write priority. Types are resolved
//! through a table of constructor functions filled at startup; `local` and
//! `memory` are always present and more can be added with
//! [`DriverRegistry::register_type`].

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::expand_path;
use crate::driver::{DriverConfig, StorageDriver};
use crate::error::{Result, StorageError};
use crate::hash::{HashCodec, StorageId};
use crate::local::{LocalConfig, LocalDriver};
use crate::memory::{MemoryConfig, MemoryDriver};

/// Builds a driver from its validated id and config record.
pub type DriverConstructor =
    fn(StorageId, &DriverConfig, &HashCodec) -> anyhow::Result<Arc<dyn StorageDriver>>;

fn construct_local(
    _id: StorageId,
    config: &DriverConfig,
    codec: &HashCodec,
) -> anyhow::Result<Arc<dyn StorageDriver>> {
    let mut options: LocalConfig = config.options()?;
    options.path = expand_path(&options.path.to_string_lossy());
    Ok(Arc::new(LocalDriver::new(options, codec.clone())?))
}

fn construct_memory(
    id: StorageId,
    config: &DriverConfig,
    _codec: &HashCodec,
) -> anyhow::Result<Arc<dyn StorageDriver>> {
    let options: MemoryConfig = config.options()?;
    Ok(Arc::new(MemoryDriver::with_config(id, options)))
}

/// A driver together with its registry record.
#[derive(Clone)]
pub struct RegisteredDriver {
    id: StorageId,
    driver_type: String,
    enabled: bool,
    driver: Arc<dyn StorageDriver>,
}

impl RegisteredDriver {
    pub fn id(&self) -> StorageId {
        self.id
    }

    pub fn driver_type(&self) -> &str {
        &self.driver_type
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn driver(&self) -> &dyn StorageDriver {
        self.driver.as_ref()
    }

    /// Enabled in config and currently available.
    pub fn is_eligible(&self) -> bool {
        self.enabled && self.driver.is_available()
    }
}

impl fmt::Debug for RegisteredDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredDriver")
            .field("id", &self.id)
            .field("driver_type", &self.driver_type)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

pub struct DriverRegistry {
    codec: HashCodec,
    constructors: HashMap<String, DriverConstructor>,
    drivers: Vec<RegisteredDriver>,
}

impl DriverRegistry {
    /// Registry with the built-in `local` and `memory` types.
    pub fn new(codec: HashCodec) -> Self {
        let mut registry = Self {
            codec,
            constructors: HashMap::new(),
            drivers: Vec::new(),
        };
        registry.register_type("local", construct_local);
        registry.register_type("memory", construct_memory);
        registry
    }

    /// Build a registry from config records, in order.
    pub fn from_configs(codec: HashCodec, configs: &[DriverConfig]) -> Result<Self> {
        let mut registry = Self::new(codec);
        for config in configs {
            registry.register(config)?;
        }
        Ok(registry)
    }

    pub fn codec(&self) -> &HashCodec {
        &self.codec
    }

    /// Add or replace a driver type. Tags are case-insensitive.
    pub fn register_type(&mut self, name: &str, constructor: DriverConstructor) {
        self.constructors.insert(name.to_lowercase(), constructor);
    }

    pub fn knows_type(&self, name: &str) -> bool {
        self.constructors.contains_key(&name.to_lowercase())
    }

    /// Construct and append a driver from its config record.
    pub fn register(&mut self, config: &DriverConfig) -> Result<&RegisteredDriver> {
        let id = StorageId::try_from(config.id)?;
        self.ensure_unique(id)?;

        let driver_type = config.driver.to_lowercase();
        let constructor = *self
            .constructors
            .get(&driver_type)
            .ok_or_else(|| StorageError::UnknownDriverType(config.driver.clone()))?;

        let driver = constructor(id, config, &self.codec).map_err(|source| {
            StorageError::DriverInitializationFailed {
                id: config.id,
                source,
            }
        })?;

        tracing::debug!(id = %id, driver = %driver_type, enabled = config.enabled, "registered storage");
        Ok(self.push(id, driver_type, config.enabled, driver))
    }

    /// Append an already-built driver.
    pub fn insert(
        &mut self,
        id: StorageId,
        driver_type: &str,
        enabled: bool,
        driver: Arc<dyn StorageDriver>,
    ) -> Result<&RegisteredDriver> {
        self.ensure_unique(id)?;
        Ok(self.push(id, driver_type.to_lowercase(), enabled, driver))
    }

    fn ensure_unique(&self, id: StorageId) -> Result<()> {
        if self.get(id).is_some() {
            return Err(StorageError::InvalidDriverConfig(format!(
                "storage id {id} is already registered"
            )));
        }
        Ok(())
    }

    fn push(
        &mut self,
        id: StorageId,
        driver_type: String,
        enabled: bool,
        driver: Arc<dyn StorageDriver>,
    ) -> &RegisteredDriver {
        let index = self.drivers.len();
        self.drivers.push(RegisteredDriver {
            id,
            driver_type,
            enabled,
            driver,
        });
        &self.drivers[index]
    }

    pub fn get(&self, id: StorageId) -> Option<&RegisteredDriver> {
        self.drivers.iter().find(|d| d.id == id)
    }

    /// Drivers in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredDriver> {
        self.drivers.iter()
    }

    /// Enabled and available drivers, in configuration order.
    pub fn eligible(&self) -> Vec<&RegisteredDriver> {
        self.drivers.iter().filter(|d| d.is_eligible()).collect()
    }

    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<_> = self.constructors.keys().collect();
        types.sort();
        f.debug_struct("DriverRegistry")
            .field("types", &types)
            .field("drivers", &self.drivers)
            .finish()
    }
}
