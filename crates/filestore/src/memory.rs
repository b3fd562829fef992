//! In-memory storage driver.
//!
//! Not persistent, data is lost on drop. Availability and write failures can
//! be toggled at runtime, which makes it handy for exercising the fan-out and
//! fallback paths.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use dashmap::DashMap;
use serde::Deserialize;

use crate::driver::StorageDriver;
use crate::hash::{FileHash, Payload, StorageId};

/// Settings for a `memory` storage entry.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MemoryConfig {
    /// Initial availability, defaults to true.
    #[serde(default)]
    pub available: Option<bool>,
}

#[derive(Debug)]
pub struct MemoryDriver {
    id: StorageId,
    files: DashMap<String, Vec<u8>>,
    available: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryDriver {
    pub fn new(id: StorageId) -> Self {
        Self {
            id,
            files: DashMap::new(),
            available: AtomicBool::new(true),
            fail_writes: AtomicBool::new(false),
        }
    }

    pub fn with_config(id: StorageId, config: MemoryConfig) -> Self {
        let driver = Self::new(id);
        driver.set_available(config.available.unwrap_or(true));
        driver
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make every subsequent write fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, hash: &FileHash) -> bool {
        self.files.contains_key(hash.as_str())
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&self) {
        self.files.clear();
    }
}

impl StorageDriver for MemoryDriver {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn write(&self, hash: &FileHash, payload: &Payload<'_>) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory storage {} rejects writes", self.id);
        }

        let data = match payload {
            Payload::Content(data) => data.to_vec(),
            Payload::File(path) => std::fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?,
        };
        self.files.insert(hash.as_str().to_string(), data);
        Ok(())
    }

    fn read_content(&self, hash: &FileHash) -> Result<Option<Vec<u8>>> {
        Ok(self.files.get(hash.as_str()).map(|entry| entry.value().clone()))
    }

    fn locator(&self, hash: &FileHash) -> String {
        format!("memory://{}/{hash}", self.id)
    }
}
