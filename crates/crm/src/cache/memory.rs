//! In-memory page cache

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{PageCache, PageKey};
use crate::error::Result;

/// Page cache held in process memory
#[derive(Default)]
pub struct MemoryPageCache {
    entries: RwLock<HashMap<PageKey, Vec<u8>>>,
}

impl MemoryPageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl PageCache for MemoryPageCache {
    fn get(&self, key: &PageKey) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &PageKey, data: &[u8]) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone(), data.to_vec());
        Ok(())
    }

    fn has(&self, key: &PageKey) -> Result<bool> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key))
    }
}
