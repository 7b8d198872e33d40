//! File-based page cache
//!
//! Directory structure:
//! ```text
//! pages/
//!   Accounts/
//!     1-50.page
//!     2-50.page
//!   Deals/
//!     1-200-Modified_Time-desc.page
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use super::{PageCache, PageKey};
use crate::error::Result;

/// Page cache stored as one file per page
pub struct FilePageCache {
    root: PathBuf,
}

impl FilePageCache {
    /// Create a new file page cache at the given path
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    /// Cache under ~/.config/crmsync/pages
    pub fn in_config_dir() -> anyhow::Result<Self> {
        let root = config::ensure_config_dir()?.join("pages");
        Ok(Self::new(root)?)
    }

    fn page_path(&self, key: &PageKey) -> PathBuf {
        // Module and sort field are API names, but never let one escape the root
        self.root
            .join(sanitize(&key.module))
            .join(format!("{}-{}.page", key.page, sanitize(&key.shape())))
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

impl PageCache for FilePageCache {
    fn get(&self, key: &PageKey) -> Result<Option<Vec<u8>>> {
        let path = self.page_path(key);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(fs::read(&path)?))
    }

    fn set(&self, key: &PageKey, data: &[u8]) -> Result<()> {
        let path = self.page_path(key);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically (write to temp, then rename)
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, data)?;
        fs::rename(&temp_path, &path)?;

        Ok(())
    }

    fn has(&self, key: &PageKey) -> Result<bool> {
        Ok(self.page_path(key).exists())
    }
}
