//! Building a storage from config files on disk.

use std::fs;

use anyhow::Result;
use filestore::{ConfigError, FileStorage, StorageConfig};
use tempfile::TempDir;

#[test]
fn test_bootstrap_from_file_with_custom_extensions() -> Result<()> {
    let dir = TempDir::new()?;
    let files = dir.path().join("files");
    fs::create_dir(&files)?;

    let ext_path = dir.path().join("extensions.json");
    fs::write(&ext_path, r#"{"1": "mid", "2": "wav"}"#)?;

    let config_path = dir.path().join("filestore.toml");
    fs::write(
        &config_path,
        format!(
            r#"
extension_map = "{ext}"

[[storage]]
id = 3
driver = "local"
path = "{files}"
directory_levels = 1
url = "https://cdn.example.com"

[[storage]]
id = 7
driver = "memory"
"#,
            ext = ext_path.display(),
            files = files.display(),
        ),
    )?;

    let config = StorageConfig::from_file(&config_path)?;
    let storage = FileStorage::from_config(&config)?;
    assert_eq!(storage.registry().len(), 2);

    let hash = storage.write_content(b"RIFF....WAVE", ".WAV")?;
    assert_eq!(&hash.as_str()[40..], "0307000002");

    let s = hash.as_str();
    assert!(files.join(&s[0..2]).join(format!("{s}.wav")).exists());
    assert_eq!(
        storage.locator(s)?,
        format!("https://cdn.example.com/{}/{s}.wav", &s[0..2])
    );
    assert_eq!(storage.read_content(s)?, b"RIFF....WAVE");
    Ok(())
}

#[test]
fn test_bad_extension_map_is_fatal() -> Result<()> {
    let dir = TempDir::new()?;
    let ext_path = dir.path().join("extensions.json");
    fs::write(&ext_path, r#"{"0": "txt"}"#)?;

    let config = StorageConfig::from_toml_str(&format!(
        "extension_map = \"{}\"\nstorage = []\n",
        ext_path.display()
    ))?;

    let err = FileStorage::from_config(&config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::ExtensionMap(_))
    ));
    Ok(())
}

#[test]
fn test_config_without_storage_list() -> Result<()> {
    let dir = TempDir::new()?;
    let config_path = dir.path().join("filestore.toml");
    fs::write(&config_path, "# nothing here\n")?;

    let result = StorageConfig::from_file(&config_path);
    assert!(matches!(result, Err(ConfigError::MissingStorageList { .. })));
    Ok(())
}
