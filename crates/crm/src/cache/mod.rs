//! Page cache
//!
//! A cache is a plain byte store ([`PageCache`]); what goes in and out of it
//! crosses an explicit codec boundary ([`CacheCodec`]): compress on write,
//! decompress on read. [`PageCacheLayer`] ties the two together for the
//! page fetcher.

mod codec;
mod file;
mod memory;

pub use codec::{CacheCodec, PlainCodec, ZstdCodec};
pub use file::FilePageCache;
pub use memory::MemoryPageCache;

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{PageInfo, PageRequest, Record, SortOrder};

/// Key of one cached page
///
/// Besides module and page number the key carries the request shape (page
/// size and sort), since the same page number holds different records under
/// a different shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageKey {
    pub module: String,
    pub page: u32,
    pub per_page: u32,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
}

impl PageKey {
    /// Key for a page requested with the default shape
    pub fn new(module: impl Into<String>, page: u32) -> Self {
        Self::for_request(&PageRequest::new(module).page(page))
    }

    pub fn for_request(req: &PageRequest) -> Self {
        Self {
            module: req.module.clone(),
            page: req.page,
            per_page: req.per_page,
            sort_by: req.sort_by.clone(),
            sort_order: req.sort_order,
        }
    }

    /// Page size and sort, e.g. `50` or `200-Modified_Time-desc`
    pub fn shape(&self) -> String {
        let mut shape = self.per_page.to_string();
        if self.sort_by.is_some() || self.sort_order.is_some() {
            shape.push('-');
            shape.push_str(self.sort_by.as_deref().unwrap_or_default());
            shape.push('-');
            shape.push_str(self.sort_order.map(|o| o.as_str()).unwrap_or_default());
        }
        shape
    }
}

impl std::fmt::Display for PageKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.module, self.page, self.shape())
    }
}

/// Byte store for cached pages
pub trait PageCache: Send + Sync {
    fn get(&self, key: &PageKey) -> Result<Option<Vec<u8>>>;

    fn set(&self, key: &PageKey, data: &[u8]) -> Result<()>;

    fn has(&self, key: &PageKey) -> Result<bool>;
}

/// Serialized form of a cached page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPage {
    pub records: Vec<Record>,
    pub info: PageInfo,
}

/// A page cache plus the codec its entries are written with
pub struct PageCacheLayer {
    cache: Arc<dyn PageCache>,
    codec: Arc<dyn CacheCodec>,
}

impl PageCacheLayer {
    pub fn new(cache: Arc<dyn PageCache>, codec: Arc<dyn CacheCodec>) -> Self {
        Self { cache, codec }
    }

    /// Pick the codec from the `compress` option
    pub fn with_compression(cache: Arc<dyn PageCache>, compress: bool) -> Self {
        let codec: Arc<dyn CacheCodec> = if compress {
            Arc::new(ZstdCodec::default())
        } else {
            Arc::new(PlainCodec)
        };
        Self::new(cache, codec)
    }

    /// Decoded page, or None on a miss
    pub fn load(&self, key: &PageKey) -> Result<Option<CachedPage>> {
        if !self.cache.has(key)? {
            return Ok(None);
        }
        let Some(raw) = self.cache.get(key)? else {
            return Ok(None);
        };
        let decoded = self.codec.decode(&raw)?;
        Ok(Some(serde_json::from_slice(&decoded)?))
    }

    pub fn store(&self, key: &PageKey, page: &CachedPage) -> Result<()> {
        let encoded = self.codec.encode(&serde_json::to_vec(page)?)?;
        self.cache.set(key, &encoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> CachedPage {
        CachedPage {
            records: vec![Record::new().with("id", "1").with("Name", "Acme")],
            info: PageInfo {
                per_page: 50,
                count: 1,
                page: 1,
                more_records: false,
            },
        }
    }

    #[test]
    fn test_layer_round_trip_compressed() {
        let cache = Arc::new(MemoryPageCache::new());
        let layer = PageCacheLayer::with_compression(cache.clone(), true);
        let key = PageKey::new("Accounts", 1);

        assert!(layer.load(&key).unwrap().is_none());
        layer.store(&key, &page()).unwrap();

        // Stored bytes are compressed, not JSON
        let raw = cache.get(&key).unwrap().unwrap();
        assert!(serde_json::from_slice::<CachedPage>(&raw).is_err());

        assert_eq!(layer.load(&key).unwrap().unwrap(), page());
    }

    #[test]
    fn test_layer_plain() {
        let cache = Arc::new(MemoryPageCache::new());
        let layer = PageCacheLayer::with_compression(cache.clone(), false);
        let key = PageKey::new("Accounts", 2);
        layer.store(&key, &page()).unwrap();

        let raw = cache.get(&key).unwrap().unwrap();
        assert_eq!(serde_json::from_slice::<CachedPage>(&raw).unwrap(), page());
    }

    #[test]
    fn test_key_display() {
        assert_eq!(PageKey::new("Deals", 3).to_string(), "Deals/3/50");

        let sorted = PageRequest::new("Deals")
            .page(3)
            .per_page(200)
            .sort_by("Modified_Time", SortOrder::Desc);
        assert_eq!(
            PageKey::for_request(&sorted).to_string(),
            "Deals/3/200-Modified_Time-desc"
        );
    }

    #[test]
    fn test_request_shape_is_part_of_key() {
        let plain = PageRequest::new("Deals").per_page(2);
        let sorted = PageRequest::new("Deals")
            .per_page(2)
            .sort_by("Modified_Time", SortOrder::Desc);

        assert_ne!(PageKey::for_request(&plain), PageKey::for_request(&sorted));
        assert_ne!(
            PageKey::for_request(&plain),
            PageKey::for_request(&plain.clone().per_page(5))
        );
        assert_eq!(PageKey::for_request(&plain), PageKey::for_request(&plain.at_page(1)));
    }
}
