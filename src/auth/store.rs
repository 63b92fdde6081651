//! Token persistence
//!
//! The [`TokenManager`](super::TokenManager) only knows the [`TokenStore`]
//! contract: load the whole collection, save the whole collection. The
//! collection travels as an untyped JSON document so that record-level
//! validation stays with the manager.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::PersistenceError;

/// Storage backend for the token collection
#[cfg_attr(test, mockall::automock)]
pub trait TokenStore: Send + Sync {
    /// Read the stored document, `None` when nothing was stored yet
    fn load(&self) -> Result<Option<serde_json::Value>, PersistenceError>;

    /// Replace the stored document
    fn save(&self, document: &serde_json::Value) -> Result<(), PersistenceError>;
}

/// Token store backed by a single JSON file
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so a crash mid-save leaves the previous file intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl TokenStore for JsonFileStore {
    fn load(&self) -> Result<Option<serde_json::Value>, PersistenceError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save(&self, document: &serde_json::Value) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let temp = self.temp_path();
        {
            let mut file = fs::File::create(&temp)?;
            serde_json::to_writer_pretty(&mut file, document)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}
