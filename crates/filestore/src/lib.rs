//! Multi-backend file storage with self-routing file hashes.
//!
//! Every write goes to all enabled and available storages and returns a
//! 50-character hash. The hash records which storages got the file (in
//! priority order) and the file's extension, so a read needs nothing but the
//! hash to find it again.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use filestore::{FileStorage, StorageConfig};
//!
//! let config = StorageConfig::from_toml_str(r#"
//!     [[storage]]
//!     id = 1
//!     driver = "local"
//!     path = "/srv/files"
//!     url = "https://files.example.com"
//! "#).unwrap();
//! let storage = FileStorage::from_config(&config).unwrap();
//!
//! // Store content
//! let hash = storage.write_content(b"Hello, World!", "txt").unwrap();
//! println!("Stored as: {}", hash);
//!
//! // Retrieve content
//! let data = storage.read_content(hash.as_str()).unwrap();
//! assert_eq!(data, b"Hello, World!");
//!
//! // Public URL
//! println!("At: {}", storage.locator(hash.as_str()).unwrap());
//! ```
//!
//! # Hash layout
//!
//! | chars | field |
//! |---|---|
//! | 0..32 | random fingerprint |
//! | 32..40 | CRC32 of the content |
//! | 40..48 | up to 4 storage ids, 2 hex each, `00` if unused |
//! | 48..50 | extension code |
//!
//! # Guarantees
//!
//! Best effort per storage. A failed storage write is logged and the hash is
//! still returned; there is no rollback and no quorum. Reads use the first
//! storage in the hash that is registered, enabled and available, and do not
//! move on if that storage lacks the file.

pub mod config;
pub mod driver;
pub mod error;
pub mod extension;
pub mod hash;
pub mod local;
pub mod memory;
pub mod registry;
pub mod storage;

// Re-exports for convenience
pub use config::{ConfigError, StorageConfig};
pub use driver::{DriverConfig, StorageDriver};
pub use error::{Result, StorageError};
pub use extension::{ExtensionMap, ExtensionMapError, UNKNOWN_EXTENSION};
pub use hash::{
    FieldValue, FileHash, HashCodec, HashField, HashInfo, HashSelection, Parsed, Payload,
    StorageId, HASH_LEN, MAX_STORAGES,
};
pub use local::{LocalConfig, LocalDriver};
pub use memory::{MemoryConfig, MemoryDriver};
pub use registry::{DriverConstructor, DriverRegistry, RegisteredDriver};
pub use storage::{DriverOutcome, FileStorage, WriteReport};
