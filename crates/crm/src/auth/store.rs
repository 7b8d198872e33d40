//! Token store boundary: durable home of the token blob

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use crate::error::Result;

/// Durable key-value home of the current token JSON
///
/// The engine never interprets how the blob is stored.
pub trait TokenStore: Send + Sync {
    /// Current blob, or None if nothing was ever stored
    fn get_tokens(&self) -> Result<Option<String>>;

    /// Replace the blob
    fn set_tokens(&self, blob: &str) -> Result<()>;
}

/// Token blob kept in a JSON file
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn get_tokens(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(content))
    }

    fn set_tokens(&self, blob: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically (write to temp, then rename)
        let temp_path = self.path.with_extension("tmp");
        fs::write(&temp_path, blob)?;
        fs::rename(&temp_path, &self.path)?;
        Ok(())
    }
}

/// In-memory token store (tests, short-lived processes)
#[derive(Default)]
pub struct MemoryTokenStore {
    blob: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: RwLock::new(Some(blob.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn get_tokens(&self) -> Result<Option<String>> {
        Ok(self.blob.read().unwrap_or_else(PoisonError::into_inner).clone())
    }

    fn set_tokens(&self, blob: &str) -> Result<()> {
        *self.blob.write().unwrap_or_else(PoisonError::into_inner) = Some(blob.to_string());
        Ok(())
    }
}
