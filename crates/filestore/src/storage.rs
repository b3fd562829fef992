//! FileStorage: fan-out writes and hash-routed reads over the registry.
//!
//! Writes go to every enabled and available storage under one minted hash.
//! A failing storage does not stop the others and nothing is rolled back;
//! [`FileStorage::write`] returns the hash either way. Use
//! [`FileStorage::write_with_report`] to see what each storage did.
//!
//! Reads walk the storage ids recorded in the hash and pick the first one
//! that is registered, enabled and available. If that storage does not have
//! the file the read fails; later ids are only tried when earlier ones could
//! not be selected at all.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;

use crate::config::StorageConfig;
use crate::error::{Result, StorageError};
use crate::extension::{self, ExtensionMap};
use crate::hash::{
    FileHash, HashCodec, HashField, HashInfo, Parsed, Payload, StorageId, MAX_STORAGES,
};
use crate::registry::{DriverRegistry, RegisteredDriver};

/// What happened on one storage during a write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverOutcome {
    Written,
    Failed(String),
    /// Not attempted because the deadline had passed.
    Skipped,
}

/// Per-storage results of a fan-out write.
#[derive(Debug, Clone)]
pub struct WriteReport {
    pub hash: FileHash,
    /// In write order, which is registry order.
    pub outcomes: Vec<(StorageId, DriverOutcome)>,
}

impl WriteReport {
    pub fn written(&self) -> impl Iterator<Item = StorageId> + '_ {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| *outcome == DriverOutcome::Written)
            .map(|(id, _)| *id)
    }

    pub fn all_written(&self) -> bool {
        self.outcomes
            .iter()
            .all(|(_, outcome)| *outcome == DriverOutcome::Written)
    }
}

#[derive(Debug)]
pub struct FileStorage {
    registry: DriverRegistry,
}

impl FileStorage {
    pub fn new(registry: DriverRegistry) -> Self {
        Self { registry }
    }

    /// Load the extension table and build every configured storage.
    pub fn from_config(config: &StorageConfig) -> anyhow::Result<Self> {
        let extensions = config
            .extension_map()
            .context("failed to load extension map")?;
        let codec = HashCodec::new(Arc::new(extensions));
        let registry = DriverRegistry::from_configs(codec, &config.storage)
            .context("failed to initialize storage list")?;
        Ok(Self::new(registry))
    }

    /// Storage with the built-in extension table and no drivers yet.
    pub fn with_builtin_extensions() -> anyhow::Result<Self> {
        let extensions = ExtensionMap::builtin().context("built-in extension map is invalid")?;
        Ok(Self::new(DriverRegistry::new(HashCodec::new(Arc::new(
            extensions,
        )))))
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Add drivers while setting up. The registry is fixed once shared.
    pub fn registry_mut(&mut self) -> &mut DriverRegistry {
        &mut self.registry
    }

    pub fn codec(&self) -> &HashCodec {
        self.registry.codec()
    }

    /// Store a file, taking the extension from its name unless given.
    pub fn write_file(&self, path: &Path, extension: Option<&str>) -> Result<FileHash> {
        self.write(Payload::File(path), extension)
    }

    /// Store bytes under the given extension.
    pub fn write_content(&self, data: &[u8], extension: &str) -> Result<FileHash> {
        self.write(Payload::Content(data), Some(extension))
    }

    /// Store `payload` on every eligible storage and return its hash.
    ///
    /// Individual storage failures are logged, not returned.
    pub fn write(&self, payload: Payload<'_>, extension: Option<&str>) -> Result<FileHash> {
        Ok(self.write_with_report(payload, extension, None)?.hash)
    }

    /// Like [`FileStorage::write`], also reporting each storage's outcome.
    ///
    /// Storages not reached before `deadline` are skipped. The hash still
    /// lists them.
    pub fn write_with_report(
        &self,
        payload: Payload<'_>,
        extension: Option<&str>,
        deadline: Option<Instant>,
    ) -> Result<WriteReport> {
        let extension = resolve_extension(&payload, extension);

        let targets = self.registry.eligible();
        if targets.is_empty() {
            return Err(StorageError::NoAvailableStorage);
        }

        let ids: Vec<StorageId> = targets.iter().map(|d| d.id()).collect();
        if ids.len() > MAX_STORAGES {
            tracing::warn!(
                storages = ids.len(),
                unrecorded = ?&ids[MAX_STORAGES..],
                "more eligible storages than a hash can record; extra copies are not addressable"
            );
        }

        let hash = self.codec().mint(&payload, &extension, &ids)?;

        let mut outcomes = Vec::with_capacity(targets.len());
        for target in targets {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(hash = %hash, storage = %target.id(), "deadline passed, skipping storage");
                outcomes.push((target.id(), DriverOutcome::Skipped));
                continue;
            }

            match target.driver().write(&hash, &payload) {
                Ok(()) => outcomes.push((target.id(), DriverOutcome::Written)),
                Err(e) => {
                    tracing::warn!(hash = %hash, storage = %target.id(), error = %format!("{e:#}"), "storage write failed");
                    outcomes.push((target.id(), DriverOutcome::Failed(format!("{e:#}"))));
                }
            }
        }

        let report = WriteReport { hash, outcomes };
        tracing::info!(
            hash = %report.hash,
            written = report.written().count(),
            targets = report.outcomes.len(),
            "stored file"
        );
        Ok(report)
    }

    /// Read content from the first selectable storage recorded in `hash`.
    pub fn read_content(&self, hash: &str) -> Result<Vec<u8>> {
        let hash = FileHash::from_str_checked(hash)?;
        let selected = self.select(&hash).ok_or_else(|| unavailable(&hash))?;

        match selected.driver().read_content(&hash) {
            Ok(Some(data)) => Ok(data),
            Ok(None) => {
                tracing::warn!(hash = %hash, storage = %selected.id(), "file not found on selected storage");
                Err(unavailable(&hash))
            }
            Err(e) => {
                tracing::warn!(hash = %hash, storage = %selected.id(), error = %format!("{e:#}"), "read from selected storage failed");
                Err(unavailable(&hash))
            }
        }
    }

    /// Locator (URL or path) from the first selectable storage in `hash`.
    pub fn locator(&self, hash: &str) -> Result<String> {
        let hash = FileHash::from_str_checked(hash)?;
        let selected = self.select(&hash).ok_or_else(|| unavailable(&hash))?;
        Ok(selected.driver().locator(&hash))
    }

    /// Decode every field of `hash`.
    pub fn info(&self, hash: &str) -> Result<HashInfo> {
        self.codec().parse(hash)
    }

    /// Decode some fields of `hash`; a single field comes back bare.
    pub fn info_fields(&self, hash: &str, fields: &[HashField]) -> Result<Parsed> {
        self.codec().parse_fields(hash, fields)
    }

    fn select(&self, hash: &FileHash) -> Option<&RegisteredDriver> {
        let selected = hash
            .storages()
            .into_iter()
            .filter_map(|id| self.registry.get(id))
            .find(|d| d.is_eligible());

        if let Some(driver) = selected {
            tracing::debug!(hash = %hash, storage = %driver.id(), "selected storage");
        }
        selected
    }
}

fn unavailable(hash: &FileHash) -> StorageError {
    StorageError::ContentUnavailable {
        hash: hash.to_string(),
    }
}

/// A non-empty hint decides, even if it normalizes to nothing; otherwise the
/// file name suffix is used.
fn resolve_extension(payload: &Payload<'_>, hint: Option<&str>) -> String {
    match hint {
        Some(ext) if !ext.is_empty() => extension::normalize(ext),
        _ => payload
            .file_extension()
            .map(extension::normalize)
            .unwrap_or_default(),
    }
}
