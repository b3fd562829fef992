//! LocalDriver: stores files in a sharded directory tree.
//!
//! Layout for `directory_levels = 2`:
//! ```text
//! {path}/
//! └── 3f/
//!     └── a9/
//!         └── 3fa9...c2.jpg   # full hash + known extension
//! ```
//!
//! Shards are taken from the random fingerprint, so files spread evenly.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::driver::StorageDriver;
use crate::hash::{FileHash, HashCodec, Payload};

/// Deepest supported shard nesting (fingerprint is 32 chars).
pub const MAX_DIRECTORY_LEVELS: usize = 16;

/// Settings for a `local` storage entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    /// Base directory. Must exist and be writable.
    pub path: PathBuf,

    /// Public base URL used for locators.
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_directory_levels", alias = "directoryLevels")]
    pub directory_levels: usize,

    /// Unix permission bits applied to written files.
    #[serde(default)]
    pub file_mode: Option<u32>,
}

fn default_directory_levels() -> usize {
    2
}

impl LocalConfig {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            url: None,
            directory_levels: default_directory_levels(),
            file_mode: None,
        }
    }
}

/// Local filesystem driver.
#[derive(Debug, Clone)]
pub struct LocalDriver {
    base_path: PathBuf,
    url: Option<String>,
    directory_levels: usize,
    file_mode: Option<u32>,
    codec: HashCodec,
}

impl LocalDriver {
    /// Create a driver over an existing, writable directory.
    pub fn new(config: LocalConfig, codec: HashCodec) -> Result<Self> {
        if config.directory_levels > MAX_DIRECTORY_LEVELS {
            bail!(
                "directory_levels must be at most {MAX_DIRECTORY_LEVELS}, got {}",
                config.directory_levels
            );
        }

        let driver = Self {
            base_path: config.path,
            url: config
                .url
                .map(|u| u.trim_matches('/').to_string())
                .filter(|u| !u.is_empty()),
            directory_levels: config.directory_levels,
            file_mode: config.file_mode,
            codec,
        };

        if !driver.is_available() {
            bail!(
                "specified path {} is not available",
                driver.base_path.display()
            );
        }

        Ok(driver)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn shards<'a>(&self, hash: &'a FileHash) -> impl Iterator<Item = &'a str> {
        (0..self.directory_levels).filter_map(move |level| hash.shard(level))
    }

    /// Directory that holds the file for `hash`.
    pub fn file_directory(&self, hash: &FileHash) -> PathBuf {
        self.shards(hash)
            .fold(self.base_path.clone(), |dir, shard| dir.join(shard))
    }

    /// File name for `hash`: the hash plus its extension when known.
    pub fn file_name(&self, hash: &FileHash) -> String {
        match self.codec.extension_of_hash(hash) {
            Some(ext) => format!("{hash}.{ext}"),
            None => hash.to_string(),
        }
    }

    /// Full path of the file for `hash`.
    pub fn file_path(&self, hash: &FileHash) -> PathBuf {
        self.file_directory(hash).join(self.file_name(hash))
    }

    #[cfg(unix)]
    fn apply_mode(&self, path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(mode) = self.file_mode {
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .with_context(|| format!("failed to chmod {}", path.display()))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn apply_mode(&self, _path: &Path) -> Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    unsafe { libc::access(c_path.as_ptr(), libc::W_OK) == 0 }
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| !m.permissions().readonly())
        .unwrap_or(false)
}

impl StorageDriver for LocalDriver {
    fn is_available(&self) -> bool {
        self.base_path.is_dir() && is_writable(&self.base_path)
    }

    fn write(&self, hash: &FileHash, payload: &Payload<'_>) -> Result<()> {
        let dir = self.file_directory(hash);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create directory {}", dir.display()))?;

        let target = dir.join(self.file_name(hash));
        match payload {
            Payload::File(source) => {
                fs::copy(source, &target).with_context(|| {
                    format!("failed to copy {} to {}", source.display(), target.display())
                })?;
            }
            Payload::Content(data) => {
                fs::write(&target, data)
                    .with_context(|| format!("failed to write {}", target.display()))?;
            }
        }

        self.apply_mode(&target)?;

        tracing::debug!(path = %target.display(), "saved file");
        Ok(())
    }

    fn read_content(&self, hash: &FileHash) -> Result<Option<Vec<u8>>> {
        let path = self.file_path(hash);

        if path.exists() {
            let data = fs::read(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            Ok(Some(data))
        } else {
            Ok(None)
        }
    }

    fn locator(&self, hash: &FileHash) -> String {
        match &self.url {
            Some(url) => {
                let mut locator = url.clone();
                for shard in self.shards(hash) {
                    locator.push('/');
                    locator.push_str(shard);
                }
                locator.push('/');
                locator.push_str(&self.file_name(hash));
                locator
            }
            None => self.file_path(hash).to_string_lossy().into_owned(),
        }
    }
}
