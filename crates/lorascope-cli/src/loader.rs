//! Adapter file loading

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Loader errors
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Adapter file not found: {0}")]
    NotFound(PathBuf),

    #[error("File too large: {path} is {size} bytes (limit {max})")]
    TooLarge { path: PathBuf, size: u64, max: u64 },

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loader configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Check expected hashes when the caller supplies one
    pub verify_hash: bool,
    /// Maximum file size in bytes
    pub max_file_size: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            verify_hash: true,
            max_file_size: 4 * 1024 * 1024 * 1024, // 4GB
        }
    }
}

/// Adapter bytes read from disk
#[derive(Debug)]
pub struct LoadedAdapter {
    /// Source path
    pub path: PathBuf,
    /// File contents
    pub bytes: Vec<u8>,
    /// blake3 of the contents
    pub hash: blake3::Hash,
}

impl LoadedAdapter {
    /// Hex form of the content hash
    pub fn hash_hex(&self) -> String {
        self.hash.to_hex().to_string()
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Adapter file loader
#[derive(Debug, Clone, Default)]
pub struct AdapterLoader {
    config: LoaderConfig,
}

impl AdapterLoader {
    /// Create a new loader
    pub fn new(config: LoaderConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Read a file and hash its contents
    pub fn load(&self, path: impl AsRef<Path>) -> Result<LoadedAdapter, LoaderError> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(LoaderError::NotFound(path.to_path_buf()));
        }

        let metadata = std::fs::metadata(path)?;
        if metadata.len() > self.config.max_file_size {
            return Err(LoaderError::TooLarge {
                path: path.to_path_buf(),
                size: metadata.len(),
                max: self.config.max_file_size,
            });
        }

        let bytes = std::fs::read(path)?;
        let hash = blake3::hash(&bytes);

        Ok(LoadedAdapter {
            path: path.to_path_buf(),
            bytes,
            hash,
        })
    }

    /// Read a file and check it against an expected hex hash
    ///
    /// The check is skipped when `verify_hash` is off.
    pub fn load_verified(
        &self,
        path: impl AsRef<Path>,
        expected_hex: &str,
    ) -> Result<LoadedAdapter, LoaderError> {
        let loaded = self.load(path)?;

        if self.config.verify_hash {
            let actual = loaded.hash_hex();
            let expected = expected_hex.trim().to_ascii_lowercase();
            if actual != expected {
                return Err(LoaderError::HashMismatch { expected, actual });
            }
        }

        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_load_hashes_contents() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(temp_dir.path(), "adapter.safetensors", &[1, 2, 3, 4]);

        let loaded = AdapterLoader::default().load(&path).unwrap();
        assert_eq!(loaded.bytes, vec![1, 2, 3, 4]);
        assert_eq!(loaded.size(), 4);
        assert_eq!(loaded.hash, blake3::hash(&[1, 2, 3, 4]));
        assert_eq!(loaded.hash_hex().len(), 64);
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let result = AdapterLoader::default().load(temp_dir.path().join("nope.safetensors"));
        assert!(matches!(result, Err(LoaderError::NotFound(_))));
    }

    #[test]
    fn test_size_limit() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(temp_dir.path(), "big.safetensors", &[0; 16]);

        let loader = AdapterLoader::new(LoaderConfig {
            max_file_size: 8,
            ..Default::default()
        });
        assert!(matches!(
            loader.load(&path),
            Err(LoaderError::TooLarge { size: 16, max: 8, .. })
        ));
    }

    #[test]
    fn test_hash_verification() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(temp_dir.path(), "adapter.safetensors", &[1, 2, 3, 4]);
        let expected = blake3::hash(&[1, 2, 3, 4]).to_hex().to_uppercase();

        let loader = AdapterLoader::default();
        assert!(loader.load_verified(&path, &expected).is_ok());

        std::fs::write(&path, [9, 9, 9, 9]).unwrap();
        assert!(matches!(
            loader.load_verified(&path, &expected),
            Err(LoaderError::HashMismatch { .. })
        ));
    }

    #[test]
    fn test_skip_hash_verification() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_file(temp_dir.path(), "adapter.safetensors", &[9, 9]);

        let loader = AdapterLoader::new(LoaderConfig {
            verify_hash: false,
            ..Default::default()
        });
        assert!(loader.load_verified(&path, "00").is_ok());
    }
}
