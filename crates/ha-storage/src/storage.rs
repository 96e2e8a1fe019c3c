//! Storage abstraction for JSON persistence
//!
//! Files live under `<config_dir>/.storage/<key>` and carry a version
//! envelope so incompatible layouts are detected on load.

use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, warn};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid storage key: {0:?}")]
    InvalidKey(String),

    #[error("Version mismatch for {key}: expected {expected}, found {found}")]
    VersionMismatch {
        key: String,
        expected: u32,
        found: u32,
    },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage file wrapper with version tracking
///
/// JSON format:
/// ```json
/// {
///   "version": 1,
///   "minor_version": 1,
///   "key": "geo_rss_events.name_1",
///   "data": { ... }
/// }
/// ```
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct StorageFile<T> {
    /// Major version - breaking changes
    pub version: u32,
    /// Minor version - compatible additions
    pub minor_version: u32,
    /// Storage key (file identifier)
    pub key: String,
    /// The actual data
    pub data: T,
}

impl<T> StorageFile<T> {
    /// Create a new storage file
    pub fn new(key: impl Into<String>, data: T, version: u32, minor_version: u32) -> Self {
        Self {
            version,
            minor_version,
            key: key.into(),
            data,
        }
    }
}

/// Types persisted through [`Storage::load_data`] / [`Storage::save_data`]
pub trait Storable: Serialize + DeserializeOwned {
    /// Current major version
    const VERSION: u32;
    /// Current minor version
    const MINOR_VERSION: u32;
}

/// Storage manager for the `.storage/` directory
#[derive(Debug, Clone)]
pub struct Storage {
    storage_dir: PathBuf,
}

impl Storage {
    /// Create a storage manager rooted at `<config_dir>/.storage`
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        Self {
            storage_dir: config_dir.as_ref().join(".storage"),
        }
    }

    /// Ensure the storage directory exists
    pub async fn ensure_dir(&self) -> StorageResult<()> {
        if !self.storage_dir.exists() {
            fs::create_dir_all(&self.storage_dir).await?;
            debug!("Created storage directory: {:?}", self.storage_dir);
        }
        Ok(())
    }

    /// Get the file path for a storage key
    ///
    /// Keys are flat file names; anything that could escape the storage
    /// directory is rejected.
    pub fn file_path(&self, key: &str) -> StorageResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.storage_dir.join(key))
    }

    /// Load a storage file, or `None` if the key has never been saved
    pub async fn load<T>(&self, key: &str) -> StorageResult<Option<StorageFile<T>>>
    where
        T: DeserializeOwned,
    {
        let path = self.file_path(key)?;

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Storage file not found: {}", key);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let storage_file: StorageFile<T> = serde_json::from_str(&content)?;

        debug!(
            "Loaded storage file: {} (v{}.{})",
            key, storage_file.version, storage_file.minor_version
        );

        Ok(Some(storage_file))
    }

    /// Save a storage file
    ///
    /// Writes to `<key>.tmp` first, then renames over the target.
    pub async fn save<T>(&self, storage_file: &StorageFile<T>) -> StorageResult<()>
    where
        T: Serialize,
    {
        self.ensure_dir().await?;

        let path = self.file_path(&storage_file.key)?;
        let temp_path = self.file_path(&format!("{}.tmp", storage_file.key))?;

        let content = serde_json::to_string_pretty(storage_file)?;
        fs::write(&temp_path, &content).await?;
        fs::rename(&temp_path, &path).await?;

        debug!(
            "Saved storage file: {} (v{}.{})",
            storage_file.key, storage_file.version, storage_file.minor_version
        );

        Ok(())
    }

    /// Load the payload of a [`Storable`] type, checking the major version
    pub async fn load_data<T: Storable>(&self, key: &str) -> StorageResult<Option<T>> {
        let Some(file) = self.load::<T>(key).await? else {
            return Ok(None);
        };

        if file.version != T::VERSION {
            return Err(StorageError::VersionMismatch {
                key: key.to_string(),
                expected: T::VERSION,
                found: file.version,
            });
        }
        if file.minor_version > T::MINOR_VERSION {
            warn!(
                "Storage {} was written by a newer minor version ({} > {})",
                key,
                file.minor_version,
                T::MINOR_VERSION
            );
        }

        Ok(Some(file.data))
    }

    /// Save the payload of a [`Storable`] type under `key`
    pub async fn save_data<T: Storable>(&self, key: &str, data: &T) -> StorageResult<()> {
        let file = StorageFile::new(key, data, T::VERSION, T::MINOR_VERSION);
        self.save(&file).await
    }

    /// Delete a storage file; deleting a missing key is not an error
    pub async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.file_path(key)?;

        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted storage file: {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List storage keys starting with `prefix`, sorted
    pub async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        if !self.storage_dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        let mut entries = fs::read_dir(&self.storage_dir).await?;

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if name.starts_with(prefix) && !name.ends_with(".tmp") {
                    keys.push(name.to_string());
                }
            }
        }

        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use tempfile::TempDir;
    use tokio_test::assert_ok;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    struct TestData {
        name: String,
        value: i32,
    }

    impl Storable for TestData {
        const VERSION: u32 = 2;
        const MINOR_VERSION: u32 = 1;
    }

    fn data() -> TestData {
        TestData {
            name: "test".to_string(),
            value: 42,
        }
    }

    #[tokio::test]
    async fn test_storage_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        storage
            .save(&StorageFile::new("test.data", data(), 1, 1))
            .await
            .unwrap();
        assert!(storage.file_path("test.data").unwrap().exists());

        let loaded: StorageFile<TestData> = storage.load("test.data").await.unwrap().unwrap();
        assert_eq!(loaded.data, data());
        assert_eq!(loaded.version, 1);
        assert!(!storage.file_path("test.data.tmp").unwrap().exists());
    }

    #[tokio::test]
    async fn test_storage_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        let result: Option<StorageFile<TestData>> = storage.load("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_storable_roundtrip_and_version_check() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        storage.save_data("test.data", &data()).await.unwrap();
        let loaded: Option<TestData> = storage.load_data("test.data").await.unwrap();
        assert_eq!(loaded, Some(data()));

        storage
            .save(&StorageFile::new("test.old", data(), 1, 0))
            .await
            .unwrap();
        let result = storage.load_data::<TestData>("test.old").await;
        assert!(matches!(
            result,
            Err(StorageError::VersionMismatch {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        assert!(matches!(
            storage.save_data("../escape", &data()).await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.file_path(""),
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_list_keys_and_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Storage::new(temp_dir.path());

        for key in ["feed.b", "feed.a", "other"] {
            storage.save_data(key, &data()).await.unwrap();
        }

        assert_eq!(storage.list_keys("feed.").await.unwrap(), vec!["feed.a", "feed.b"]);

        assert_ok!(storage.delete("feed.a").await);
        // deleting twice is fine
        assert_ok!(storage.delete("feed.a").await);
        assert_eq!(storage.list_keys("feed.").await.unwrap(), vec!["feed.b"]);
    }
}
