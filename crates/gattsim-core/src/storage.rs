//! Persistent storage for the device identifier.
//!
//! The identifier lives in a 6-byte file, `device.key`, in the data
//! directory so that the advertised manufacturer data survives restarts.

use std::io;
use std::path::{Path, PathBuf};

use rand::Rng;
use thiserror::Error;
use tracing::{info, warn};

use crate::identity::{DeviceIdentifier, IDENTIFIER_LEN};

/// File name of the persisted identifier.
pub const IDENTIFIER_FILE: &str = "device.key";

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No platform data directory could be determined.
    #[error("cannot determine data directory")]
    NoDataDir,

    /// Reading or writing a file failed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        /// File being accessed.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
}

/// Result type for storage operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Returns the default data directory.
///
/// On Linux: `/var/lib/gattsim/`
/// Elsewhere: the platform data directory, e.g. `~/Library/Application Support/gattsim/`
///
/// # Errors
///
/// `NoDataDir` if the platform directory cannot be determined.
pub fn default_data_dir() -> StorageResult<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        Ok(PathBuf::from("/var/lib/gattsim"))
    }
    #[cfg(not(target_os = "linux"))]
    {
        directories::ProjectDirs::from("", "", "gattsim")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(StorageError::NoDataDir)
    }
}

/// Storage backend rooted at a data directory.
#[derive(Debug, Clone)]
pub struct Storage {
    data_dir: PathBuf,
}

impl Storage {
    /// Create a new storage instance.
    ///
    /// # Arguments
    ///
    /// * `data_dir` - Directory to store data files
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Storage at [`default_data_dir`].
    ///
    /// # Errors
    ///
    /// `NoDataDir` if the platform directory cannot be determined.
    pub fn at_default_location() -> StorageResult<Self> {
        default_data_dir().map(Self::new)
    }

    /// The data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn identifier_path(&self) -> PathBuf {
        self.data_dir.join(IDENTIFIER_FILE)
    }

    /// Loads the persisted identifier.
    ///
    /// Returns `Ok(None)` if no file exists or its content is not a valid
    /// identifier.
    ///
    /// # Errors
    ///
    /// `Io` if the file exists but cannot be read.
    pub fn load_identifier(&self) -> StorageResult<Option<DeviceIdentifier>> {
        let path = self.identifier_path();
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StorageError::Io { path, source }),
        };
        let parsed = <[u8; IDENTIFIER_LEN]>::try_from(bytes.as_slice())
            .ok()
            .and_then(DeviceIdentifier::from_bytes);
        if parsed.is_none() {
            warn!(path = %path.display(), len = bytes.len(), "ignoring corrupt identifier file");
        }
        Ok(parsed)
    }

    /// Persists the identifier, creating the data directory if needed.
    ///
    /// # Errors
    ///
    /// `Io` if the directory or file cannot be written.
    pub fn save_identifier(&self, identifier: &DeviceIdentifier) -> StorageResult<()> {
        std::fs::create_dir_all(&self.data_dir).map_err(|source| StorageError::Io {
            path: self.data_dir.clone(),
            source,
        })?;
        let path = self.identifier_path();
        std::fs::write(&path, identifier.as_bytes())
            .map_err(|source| StorageError::Io { path, source })
    }

    /// Returns the persisted identifier, or generates, saves and returns a new one.
    ///
    /// # Errors
    ///
    /// `Io` if the identifier cannot be read or saved.
    pub fn load_or_generate<R: Rng>(&self, rng: &mut R) -> StorageResult<DeviceIdentifier> {
        if let Some(identifier) = self.load_identifier()? {
            return Ok(identifier);
        }
        let identifier = DeviceIdentifier::generate(rng);
        self.save_identifier(&identifier)?;
        info!(%identifier, dir = %self.data_dir.display(), "generated device identifier");
        Ok(identifier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use tempfile::TempDir;

    #[test]
    fn test_load_missing_identifier() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path());
        assert!(storage.load_identifier().unwrap().is_none());
    }

    #[test]
    fn test_load_or_generate_is_stable() {
        let dir = TempDir::new().unwrap();
        let storage = Storage::new(dir.path().join("nested"));
        let mut rng = StdRng::seed_from_u64(1);

        let first = storage.load_or_generate(&mut rng).unwrap();
        let second = storage.load_or_generate(&mut rng).unwrap();
        assert_eq!(first, second);

        let on_disk = std::fs::read(dir.path().join("nested").join(IDENTIFIER_FILE)).unwrap();
        assert_eq!(on_disk, first.as_bytes().to_vec());
    }

    #[test]
    fn test_corrupt_file_is_regenerated() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(IDENTIFIER_FILE), [1, 2, 3]).unwrap();
        let storage = Storage::new(dir.path());
        assert!(storage.load_identifier().unwrap().is_none());

        let id = storage
            .load_or_generate(&mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(storage.load_identifier().unwrap(), Some(id));
    }
}
