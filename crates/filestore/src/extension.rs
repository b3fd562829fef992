//! ExtensionMap: a load-once table between file extensions and one-byte codes.
//!
//! The table is a JSON object keyed by code:
//! ```json
//! { "1": "jpg", "2": "png", "3": "pdf" }
//! ```
//!
//! Code `0` is reserved for "no extension" and decodes to [`UNKNOWN_EXTENSION`].
//! Build the map once at startup and share it behind an `Arc`.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use thiserror::Error;

/// Sentinel returned when a code has no mapped extension.
pub const UNKNOWN_EXTENSION: &str = "unknown";

const BUILTIN_TABLE: &str = include_str!("../assets/extension_map.json");

/// Errors raised while loading an extension table.
#[derive(Debug, Error)]
pub enum ExtensionMapError {
    #[error("failed to read extension map {path}: {source}")]
    Read {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("extension map is not a JSON object of code to extension: {0}")]
    Json(#[from] serde_json::Error),

    #[error("extension code {0:?} is not an integer in 1..=255")]
    InvalidCode(String),

    #[error("extension code {0} maps to an empty extension")]
    EmptyExtension(u8),

    #[error("extension code {0} is mapped more than once")]
    DuplicateCode(u8),

    #[error("extension {0:?} is mapped more than once")]
    DuplicateExtension(String),
}

/// Bidirectional extension table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMap {
    by_code: BTreeMap<u8, String>,
    by_extension: HashMap<String, u8>,
}

/// Trim surrounding dots and spaces and lowercase, the form used for lookups.
pub fn normalize(extension: &str) -> String {
    extension
        .trim_matches(|c: char| c == '.' || c == ' ')
        .to_lowercase()
}

impl ExtensionMap {
    /// The table shipped with the crate.
    pub fn builtin() -> Result<Self, ExtensionMapError> {
        Self::from_json(BUILTIN_TABLE)
    }

    /// Load a table from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ExtensionMapError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ExtensionMapError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse a table from JSON text.
    pub fn from_json(json: &str) -> Result<Self, ExtensionMapError> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
        Self::from_entries(raw.iter().map(|(code, ext)| (code.as_str(), ext.as_str())))
    }

    /// Build a table from `(code, extension)` pairs.
    pub fn from_entries<'a>(
        entries: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, ExtensionMapError> {
        let mut by_code = BTreeMap::new();
        let mut by_extension = HashMap::new();

        for (code, extension) in entries {
            let code = match code.trim().parse::<u8>() {
                Ok(c) if c > 0 => c,
                _ => return Err(ExtensionMapError::InvalidCode(code.to_string())),
            };

            let extension = normalize(extension);
            if extension.is_empty() {
                return Err(ExtensionMapError::EmptyExtension(code));
            }
            if by_extension.insert(extension.clone(), code).is_some() {
                return Err(ExtensionMapError::DuplicateExtension(extension));
            }
            if by_code.insert(code, extension).is_some() {
                return Err(ExtensionMapError::DuplicateCode(code));
            }
        }

        Ok(Self {
            by_code,
            by_extension,
        })
    }

    /// Code for an extension, `0` when empty or not in the table.
    pub fn code(&self, extension: &str) -> u8 {
        self.by_extension
            .get(&normalize(extension))
            .copied()
            .unwrap_or(0)
    }

    /// Extension for a code, `None` for `0` or unmapped codes.
    pub fn extension(&self, code: u8) -> Option<&str> {
        if code == 0 {
            return None;
        }
        self.by_code.get(&code).map(String::as_str)
    }

    /// Extension for a code, or [`UNKNOWN_EXTENSION`].
    pub fn decode(&self, code: u8) -> &str {
        self.extension(code).unwrap_or(UNKNOWN_EXTENSION)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }

    /// Iterate `(code, extension)` in code order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &str)> {
        self.by_code.iter().map(|(code, ext)| (*code, ext.as_str()))
    }
}
