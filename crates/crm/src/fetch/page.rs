//! Page fetcher: one request for one page of one module

use log::{log, warn};
use std::sync::Arc;

use super::normalize_page;
use crate::api::CrmClient;
use crate::cache::{CachedPage, PageCacheLayer, PageKey};
use crate::config::SyncOptions;
use crate::error::Result;
use crate::models::{PageRequest, PageResult};

/// Fetches and normalizes single pages, optionally through a page cache
pub struct PageFetcher {
    client: Arc<CrmClient>,
    cache: Option<PageCacheLayer>,
    options: SyncOptions,
}

impl PageFetcher {
    pub fn new(client: Arc<CrmClient>, options: SyncOptions) -> Self {
        Self {
            client,
            cache: None,
            options,
        }
    }

    /// Builder method to route fetches through a page cache
    pub fn with_cache(mut self, cache: PageCacheLayer) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Fetch one page
    ///
    /// Fails only when the request is invalid, the credential cannot be
    /// refreshed, or the network call itself fails. Error statuses are
    /// returned inside the result.
    pub fn fetch(&self, req: &PageRequest) -> Result<PageResult> {
        req.validate()?;
        let key = PageKey::for_request(req);

        if let Some(cache) = &self.cache {
            match cache.load(&key) {
                Ok(Some(page)) => {
                    log!(self.options.trace_level(), "[FETCH] {} served from cache", key);
                    return Ok(PageResult::with_records(page.records, 200, page.info));
                }
                Ok(None) => {}
                Err(e) => warn!("[FETCH] Ignoring unreadable cache entry {}: {}", key, e),
            }
        }

        let response = self.client.list_records(req)?;
        let result = normalize_page(&response);
        log!(
            self.options.trace_level(),
            "[FETCH] {} -> status {}, {} records",
            key,
            result.status_code(),
            result.records().len()
        );

        if let Some(cache) = &self.cache
            && result.status_code() == 200
            && result.error().is_none()
            && !result.is_empty()
        {
            let entry = CachedPage {
                records: result.records().to_vec(),
                info: result.info().clone(),
            };
            if let Err(e) = cache.store(&key, &entry) {
                warn!("[FETCH] Failed to cache {}: {}", key, e);
            }
        }

        Ok(result)
    }
}
