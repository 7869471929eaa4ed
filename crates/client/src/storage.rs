//! Persistent credential storage.
//!
//! Values are JSON files in a per-user directory, one file per key. The
//! default directory is the platform config dir:
//!   - Linux: `~/.config/onechat/`
//!   - macOS: `~/Library/Application Support/onechat/`
//!   - Windows: `%APPDATA%\onechat\`

use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};

/// Bearer token issued by `/auth/login` or `/auth/signup`.
pub const TOKEN_KEY: &str = "token";
/// Serialized current-user profile.
pub const USER_KEY: &str = "user";

const KNOWN_KEYS: [&str; 2] = [TOKEN_KEY, USER_KEY];

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("no storage directory available")]
    NoDirectory,
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    /// Storage rooted at the platform config directory.
    pub fn platform() -> Result<Self, StorageError> {
        let config_dir = dirs::config_dir().ok_or(StorageError::NoDirectory)?;
        Ok(Self::at(config_dir.join("onechat")))
    }

    /// Storage rooted at `root`. The directory is created on first write.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, key: &str) -> PathBuf {
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.root.join(format!("{safe_key}.json"))
    }

    /// Save a value under `key`.
    pub fn save<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let json = serde_json::to_string(value)?;
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.file_path(key), json)?;
        Ok(())
    }

    /// Load a value. Returns `None` if the key doesn't exist or fails to decode.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let json = std::fs::read_to_string(self.file_path(key)).ok()?;
        match serde_json::from_str(&json) {
            Ok(value) => Some(value),
            Err(e) => {
                crate::log_warn!("Discarding unreadable stored value '{}': {}", key, e);
                None
            }
        }
    }

    /// Remove `key`. A key that was never stored is not an error.
    pub fn remove(&self, key: &str) -> Result<(), StorageError> {
        match std::fs::remove_file(self.file_path(key)) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    pub fn exists(&self, key: &str) -> bool {
        self.file_path(key).exists()
    }

    /// Remove every persisted credential. Returns whether all of them are gone.
    pub fn clear(&self) -> bool {
        let mut cleared = true;
        for key in KNOWN_KEYS {
            if let Err(e) = self.remove(key) {
                crate::log_warn!("Failed to remove stored '{}': {}", key, e);
                cleared = false;
            }
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_load_remove() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::at(dir.path().join("nested"));

        assert!(!storage.exists(TOKEN_KEY));
        storage.save(TOKEN_KEY, &"abc".to_string()).unwrap();
        assert_eq!(storage.load::<String>(TOKEN_KEY).as_deref(), Some("abc"));

        storage.remove(TOKEN_KEY).unwrap();
        assert_eq!(storage.load::<String>(TOKEN_KEY), None);
        // Already gone.
        storage.remove(TOKEN_KEY).unwrap();
    }

    #[test]
    fn test_clear_removes_all_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::at(dir.path());
        storage.save(TOKEN_KEY, &"abc").unwrap();
        storage.save(USER_KEY, &serde_json::json!({"id": "u1"})).unwrap();

        assert!(storage.clear());
        assert!(!storage.exists(TOKEN_KEY));
        assert!(!storage.exists(USER_KEY));
    }

    #[test]
    fn test_failed_removal_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::at(dir.path());
        storage.save(USER_KEY, &"alice").unwrap();
        // A directory where the token file should be cannot be removed as a file.
        std::fs::create_dir_all(dir.path().join("token.json")).unwrap();

        assert!(matches!(storage.remove(TOKEN_KEY), Err(StorageError::Io(_))));
        assert!(!storage.clear());
        assert!(storage.exists(TOKEN_KEY));
        assert!(!storage.exists(USER_KEY));
    }

    #[test]
    fn test_corrupt_value_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::at(dir.path());
        std::fs::write(dir.path().join("user.json"), "{broken").unwrap();
        assert_eq!(storage.load::<serde_json::Value>(USER_KEY), None);
    }
}
