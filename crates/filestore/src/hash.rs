//! FileHash: the 50-character identifier that routes a stored file.
//!
//! Layout (character offsets, all lowercase hex):
//! ```text
//! 0       32       40       48 50
//! |fingerprint|crc32|storages|ext|
//!     32ch     8ch    4 x 2ch  2ch
//! ```
//!
//! - fingerprint: random per write, not derived from content
//! - crc32: checksum of the original content
//! - storages: up to four storage ids in priority order, `00` for unused slots
//! - ext: one-byte extension code from the [`ExtensionMap`]
//!
//! Because the storage list travels inside the hash, reads need no index.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::num::NonZeroU8;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, StorageError};
use crate::extension::ExtensionMap;

/// Total length of a file hash.
pub const HASH_LEN: usize = 50;

/// Number of storage ids a hash can carry.
pub const MAX_STORAGES: usize = 4;

const FINGERPRINT: std::ops::Range<usize> = 0..32;
const CRC: std::ops::Range<usize> = 32..40;
const STORAGES: std::ops::Range<usize> = 40..48;
const EXTENSION: std::ops::Range<usize> = 48..50;

/// Identifier of a configured storage, 1..=255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageId(NonZeroU8);

impl StorageId {
    /// `None` for zero.
    pub fn new(id: u8) -> Option<Self> {
        NonZeroU8::new(id).map(Self)
    }

    pub fn get(self) -> u8 {
        self.0.get()
    }
}

impl TryFrom<i64> for StorageId {
    type Error = StorageError;

    fn try_from(id: i64) -> Result<Self> {
        u8::try_from(id)
            .ok()
            .and_then(StorageId::new)
            .ok_or_else(|| {
                StorageError::InvalidDriverConfig(format!(
                    "storage id must be an integer in 1..=255, got {id}"
                ))
            })
    }
}

impl fmt::Display for StorageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A validated 50-character file hash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FileHash(String);

impl FileHash {
    /// Validate an existing hash string (length and hex digits).
    pub fn from_str_checked(s: &str) -> Result<Self> {
        if s.len() != HASH_LEN {
            return Err(StorageError::MalformedIdentifier(format!(
                "incorrect hash length {} instead of {HASH_LEN}",
                s.len()
            )));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(StorageError::MalformedIdentifier(
                "invalid hex character in hash".to_string(),
            ));
        }
        Ok(Self(s.to_lowercase()))
    }

    /// The random 32-character fingerprint.
    pub fn fingerprint(&self) -> &str {
        &self.0[FINGERPRINT]
    }

    /// The CRC32 field as 8 hex characters.
    pub fn crc(&self) -> &str {
        &self.0[CRC]
    }

    /// The CRC32 field as a number.
    pub fn crc32(&self) -> u32 {
        // validated hex on construction
        u32::from_str_radix(self.crc(), 16).unwrap_or_default()
    }

    /// Non-zero storage ids in priority order.
    pub fn storages(&self) -> Vec<StorageId> {
        self.0[STORAGES]
            .as_bytes()
            .chunks(2)
            .filter_map(|slot| std::str::from_utf8(slot).ok())
            .filter_map(|slot| u8::from_str_radix(slot, 16).ok())
            .filter_map(StorageId::new)
            .collect()
    }

    /// The raw extension code.
    pub fn extension_code(&self) -> u8 {
        u8::from_str_radix(&self.0[EXTENSION], 16).unwrap_or_default()
    }

    /// Two-character shard for sharded directory layouts.
    ///
    /// Shards are taken from the fingerprint, so `level` must be below 16.
    pub fn shard(&self, level: usize) -> Option<&str> {
        let start = level * 2;
        if start + 2 > FINGERPRINT.end {
            return None;
        }
        Some(&self.0[start..start + 2])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for FileHash {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_str_checked(s)
    }
}

impl TryFrom<String> for FileHash {
    type Error = StorageError;

    fn try_from(s: String) -> Result<Self> {
        Self::from_str_checked(&s)
    }
}

impl From<FileHash> for String {
    fn from(hash: FileHash) -> Self {
        hash.0
    }
}

impl AsRef<str> for FileHash {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Content handed to the storage: a file on disk or bytes in memory.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    File(&'a Path),
    Content(&'a [u8]),
}

impl Payload<'_> {
    /// CRC32 of the payload. Files are streamed.
    pub fn crc32(&self) -> Result<u32> {
        match self {
            Payload::Content(data) => Ok(crc32fast::hash(data)),
            Payload::File(path) => {
                let unavailable = |source: io::Error| StorageError::SourceUnavailable {
                    path: path.to_path_buf(),
                    source,
                };

                let mut file = File::open(path).map_err(unavailable)?;
                let mut hasher = crc32fast::Hasher::new();
                let mut buf = [0u8; 64 * 1024];
                loop {
                    let n = file.read(&mut buf).map_err(unavailable)?;
                    if n == 0 {
                        break;
                    }
                    hasher.update(&buf[..n]);
                }
                Ok(hasher.finalize())
            }
        }
    }

    /// Extension from the file name, if this is a file payload.
    pub fn file_extension(&self) -> Option<&str> {
        match self {
            Payload::File(path) => path.extension().and_then(|ext| ext.to_str()),
            Payload::Content(_) => None,
        }
    }
}

/// Fields that can be extracted from a hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashField {
    Fingerprint,
    Crc,
    Storages,
    Extension,
}

impl HashField {
    pub const ALL: [HashField; 4] = [
        HashField::Fingerprint,
        HashField::Crc,
        HashField::Storages,
        HashField::Extension,
    ];
}

/// A single decoded field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Fingerprint(String),
    Crc(String),
    Storages(Vec<StorageId>),
    Extension(String),
}

/// Every field of a hash, decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HashInfo {
    pub fingerprint: String,
    pub crc: String,
    pub storages: Vec<StorageId>,
    /// Mapped extension or [`crate::extension::UNKNOWN_EXTENSION`].
    pub extension: String,
}

/// A subset of decoded fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashSelection {
    pub fingerprint: Option<String>,
    pub crc: Option<String>,
    pub storages: Option<Vec<StorageId>>,
    pub extension: Option<String>,
}

/// Result of [`HashCodec::parse_fields`]: a bare value when one field was
/// requested, a selection otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Value(FieldValue),
    Fields(HashSelection),
}

/// Mints and parses file hashes against an extension table.
#[derive(Debug, Clone)]
pub struct HashCodec {
    extensions: Arc<ExtensionMap>,
}

impl HashCodec {
    pub fn new(extensions: Arc<ExtensionMap>) -> Self {
        Self { extensions }
    }

    pub fn extensions(&self) -> &ExtensionMap {
        &self.extensions
    }

    /// Mint a new hash for `payload` stored on `storage_ids`.
    ///
    /// Only the first [`MAX_STORAGES`] ids are recorded.
    pub fn mint(
        &self,
        payload: &Payload<'_>,
        extension: &str,
        storage_ids: &[StorageId],
    ) -> Result<FileHash> {
        if storage_ids.is_empty() {
            return Err(StorageError::InvalidInput(
                "storage ids can not be empty".to_string(),
            ));
        }
        for (i, id) in storage_ids.iter().enumerate() {
            if storage_ids[..i].contains(id) {
                return Err(StorageError::InvalidInput(format!(
                    "storage id {id} listed more than once"
                )));
            }
        }

        let crc = payload.crc32()?;

        let mut hash = String::with_capacity(HASH_LEN);
        hash.push_str(&fingerprint());
        hash.push_str(&format!("{crc:08x}"));
        for slot in 0..MAX_STORAGES {
            match storage_ids.get(slot) {
                Some(id) => hash.push_str(&format!("{:02x}", id.get())),
                None => hash.push_str("00"),
            }
        }
        hash.push_str(&format!("{:02x}", self.extensions.code(extension)));

        if hash.len() != HASH_LEN {
            return Err(StorageError::EncodingInvariantViolation {
                len: hash.len(),
                hash,
            });
        }

        tracing::debug!(hash = %hash, crc, storages = storage_ids.len(), "minted file hash");
        Ok(FileHash(hash))
    }

    /// Decode every field of `hash`.
    pub fn parse(&self, hash: &str) -> Result<HashInfo> {
        let hash = FileHash::from_str_checked(hash)?;
        Ok(HashInfo {
            fingerprint: hash.fingerprint().to_string(),
            crc: hash.crc().to_string(),
            storages: hash.storages(),
            extension: self.extension_of(&hash).to_string(),
        })
    }

    /// Decode the requested fields of `hash`.
    ///
    /// One requested field yields [`Parsed::Value`]. An empty list means all
    /// fields.
    pub fn parse_fields(&self, hash: &str, fields: &[HashField]) -> Result<Parsed> {
        let hash = FileHash::from_str_checked(hash)?;

        if let [field] = fields {
            return Ok(Parsed::Value(self.decode_field(&hash, *field)));
        }

        let fields = if fields.is_empty() {
            &HashField::ALL[..]
        } else {
            fields
        };

        let mut selection = HashSelection::default();
        for field in fields {
            match self.decode_field(&hash, *field) {
                FieldValue::Fingerprint(v) => selection.fingerprint = Some(v),
                FieldValue::Crc(v) => selection.crc = Some(v),
                FieldValue::Storages(v) => selection.storages = Some(v),
                FieldValue::Extension(v) => selection.extension = Some(v),
            }
        }
        Ok(Parsed::Fields(selection))
    }

    /// Decode a single field of `hash`.
    pub fn field(&self, hash: &str, field: HashField) -> Result<FieldValue> {
        let hash = FileHash::from_str_checked(hash)?;
        Ok(self.decode_field(&hash, field))
    }

    /// Extension recorded in `hash`, `None` when the code is unmapped.
    pub fn extension_of_hash<'a>(&'a self, hash: &FileHash) -> Option<&'a str> {
        self.extensions.extension(hash.extension_code())
    }

    fn extension_of(&self, hash: &FileHash) -> &str {
        self.extensions.decode(hash.extension_code())
    }

    fn decode_field(&self, hash: &FileHash, field: HashField) -> FieldValue {
        match field {
            HashField::Fingerprint => FieldValue::Fingerprint(hash.fingerprint().to_string()),
            HashField::Crc => FieldValue::Crc(hash.crc().to_string()),
            HashField::Storages => FieldValue::Storages(hash.storages()),
            HashField::Extension => FieldValue::Extension(self.extension_of(hash).to_string()),
        }
    }
}

/// 32 hex chars from wall-clock time and a random salt.
fn fingerprint() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();

    let mut hasher = blake3::Hasher::new();
    hasher.update(&nanos.to_le_bytes());
    hasher.update(Uuid::new_v4().as_bytes());
    hex::encode(&hasher.finalize().as_bytes()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::UNKNOWN_EXTENSION;
    use pretty_assertions::assert_eq;

    fn codec() -> HashCodec {
        HashCodec::new(Arc::new(ExtensionMap::builtin().unwrap()))
    }

    fn ids(raw: &[u8]) -> Vec<StorageId> {
        raw.iter().map(|id| StorageId::new(*id).unwrap()).collect()
    }

    #[test]
    fn test_mint_layout() {
        let codec = codec();
        let hash = codec
            .mint(&Payload::Content(b"Hello, World!"), "png", &ids(&[1, 10]))
            .unwrap();

        assert_eq!(hash.as_str().len(), HASH_LEN);
        assert!(hash.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash.crc(), format!("{:08x}", crc32fast::hash(b"Hello, World!")));
        assert_eq!(&hash.as_str()[40..48], "010a0000");
        assert_eq!(&hash.as_str()[48..], format!("{:02x}", codec.extensions().code("png")));
    }

    #[test]
    fn test_mint_parse_roundtrip() {
        let codec = codec();
        for raw in [&[1u8][..], &[3, 1], &[255, 2, 7], &[4, 3, 2, 1]] {
            let hash = codec
                .mint(&Payload::Content(b"payload"), ".JPG", &ids(raw))
                .unwrap();
            let info = codec.parse(hash.as_str()).unwrap();
            assert_eq!(info.storages, ids(raw));
            assert_eq!(info.extension, "jpg");
            assert_eq!(info.fingerprint, hash.fingerprint());
        }
    }

    #[test]
    fn test_mint_unknown_extension_is_zero() {
        let codec = codec();
        let hash = codec
            .mint(&Payload::Content(b"x"), "nope", &ids(&[1]))
            .unwrap();
        assert_eq!(hash.as_str().len(), HASH_LEN);
        assert_eq!(hash.extension_code(), 0);
        assert_eq!(codec.parse(hash.as_str()).unwrap().extension, UNKNOWN_EXTENSION);

        let empty = codec.mint(&Payload::Content(b"x"), "", &ids(&[1])).unwrap();
        assert_eq!(empty.extension_code(), 0);
    }

    #[test]
    fn test_mint_records_only_four_storages() {
        let codec = codec();
        let hash = codec
            .mint(&Payload::Content(b"x"), "txt", &ids(&[1, 2, 3, 4, 5, 6]))
            .unwrap();
        assert_eq!(hash.as_str().len(), HASH_LEN);
        assert_eq!(hash.storages(), ids(&[1, 2, 3, 4]));
    }

    #[test]
    fn test_mint_empty_storages_is_invalid_input() {
        let result = codec().mint(&Payload::Content(b"x"), "txt", &[]);
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_mint_duplicate_storages_is_invalid_input() {
        let result = codec().mint(&Payload::Content(b"x"), "txt", &ids(&[2, 2]));
        assert!(matches!(result, Err(StorageError::InvalidInput(_))));
    }

    #[test]
    fn test_mint_missing_file_is_source_unavailable() {
        let result = codec().mint(
            &Payload::File(Path::new("/definitely/not/here.txt")),
            "txt",
            &ids(&[1]),
        );
        assert!(matches!(result, Err(StorageError::SourceUnavailable { .. })));
    }

    #[test]
    fn test_mint_file_crc_matches_content_crc() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("data.bin");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let codec = codec();
        let from_file = codec.mint(&Payload::File(&path), "bin", &ids(&[1])).unwrap();
        let from_bytes = codec.mint(&Payload::Content(&data), "bin", &ids(&[1])).unwrap();
        assert_eq!(from_file.crc(), from_bytes.crc());
        assert_eq!(from_file.crc32(), crc32fast::hash(&data));
    }

    #[test]
    fn test_identical_content_gets_distinct_hashes() {
        let codec = codec();
        let a = codec.mint(&Payload::Content(b"same"), "txt", &ids(&[1])).unwrap();
        let b = codec.mint(&Payload::Content(b"same"), "txt", &ids(&[1])).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.crc(), b.crc());
    }

    #[test]
    fn test_parse_wrong_length() {
        let codec = codec();
        let valid = codec.mint(&Payload::Content(b"x"), "txt", &ids(&[1])).unwrap();

        let short = &valid.as_str()[..49];
        let long = format!("{}0", valid.as_str());
        assert!(matches!(codec.parse(short), Err(StorageError::MalformedIdentifier(_))));
        assert!(matches!(codec.parse(&long), Err(StorageError::MalformedIdentifier(_))));
    }

    #[test]
    fn test_parse_non_hex() {
        let bad = "z".repeat(HASH_LEN);
        assert!(matches!(codec().parse(&bad), Err(StorageError::MalformedIdentifier(_))));
    }

    #[test]
    fn test_parse_drops_zero_slots_keeps_order() {
        let hash = format!("{}{}{}{}", "a".repeat(32), "0000beef", "00050003", "00");
        let info = codec().parse(&hash).unwrap();
        assert_eq!(info.storages, ids(&[5, 3]));
        assert_eq!(info.crc, "0000beef");
        assert_eq!(info.extension, UNKNOWN_EXTENSION);
    }

    #[test]
    fn test_parse_single_field_returns_value() {
        let codec = codec();
        let hash = codec.mint(&Payload::Content(b"x"), "pdf", &ids(&[9, 2])).unwrap();

        let parsed = codec.parse_fields(hash.as_str(), &[HashField::Storages]).unwrap();
        assert_eq!(parsed, Parsed::Value(FieldValue::Storages(ids(&[9, 2]))));

        let ext = codec.field(hash.as_str(), HashField::Extension).unwrap();
        assert_eq!(ext, FieldValue::Extension("pdf".to_string()));
    }

    #[test]
    fn test_parse_multiple_fields_returns_selection() {
        let codec = codec();
        let hash = codec.mint(&Payload::Content(b"x"), "pdf", &ids(&[9])).unwrap();

        let parsed = codec
            .parse_fields(hash.as_str(), &[HashField::Crc, HashField::Extension])
            .unwrap();
        let Parsed::Fields(selection) = parsed else {
            panic!("expected a selection");
        };
        assert_eq!(selection.crc.as_deref(), Some(hash.crc()));
        assert_eq!(selection.extension.as_deref(), Some("pdf"));
        assert!(selection.fingerprint.is_none());
        assert!(selection.storages.is_none());
    }

    #[test]
    fn test_parse_no_fields_means_all() {
        let codec = codec();
        let hash = codec.mint(&Payload::Content(b"x"), "pdf", &ids(&[9])).unwrap();
        let Parsed::Fields(selection) = codec.parse_fields(hash.as_str(), &[]).unwrap() else {
            panic!("expected a selection");
        };
        assert!(selection.fingerprint.is_some());
        assert!(selection.crc.is_some());
        assert_eq!(selection.storages, Some(ids(&[9])));
        assert_eq!(selection.extension.as_deref(), Some("pdf"));
    }

    #[test]
    fn test_storage_id_bounds() {
        assert!(StorageId::try_from(0i64).is_err());
        assert!(StorageId::try_from(-1i64).is_err());
        assert!(StorageId::try_from(256i64).is_err());
        assert_eq!(StorageId::try_from(255i64).unwrap().get(), 255);
    }

    #[test]
    fn test_shard() {
        let hash: FileHash = format!("{}{}", "ab12".repeat(8), "0".repeat(18)).parse().unwrap();
        assert_eq!(hash.shard(0), Some("ab"));
        assert_eq!(hash.shard(1), Some("12"));
        assert_eq!(hash.shard(15), Some("12"));
        assert_eq!(hash.shard(16), None);
    }

    #[test]
    fn test_serde_roundtrip() {
        let hash = codec().mint(&Payload::Content(b"serde"), "txt", &ids(&[1])).unwrap();
        let json = serde_json::to_string(&hash).unwrap();
        let restored: FileHash = serde_json::from_str(&json).unwrap();
        assert_eq!(hash, restored);

        assert!(serde_json::from_str::<FileHash>("\"short\"").is_err());
    }

    #[test]
    fn test_from_str_lowercases() {
        let upper = format!("{}{}", "AB".repeat(16), "0".repeat(18));
        let hash: FileHash = upper.parse().unwrap();
        assert_eq!(hash.as_str(), upper.to_lowercase());
    }
}
