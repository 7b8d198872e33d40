//! Pagination and aggregation
//!
//! Walks the pages of a module and folds them into one result:
//! - [`SyncEngine::get_records_modified_after`]: newest-first walk that stops
//!   at the first record older than a threshold
//! - [`SyncEngine::get_all_records`]: every page, sequentially or in
//!   bounded parallel windows
//!
//! Both can cascade into related modules discovered from metadata.

mod all_records;
mod modified_after;

use chrono::{DateTime, Utc};
use log::info;

use crate::config::SyncOptions;
use crate::error::Result;
use crate::fetch::{PageFetcher, SubformResolver};
use crate::models::{PageRequest, PageResult, Record, RelatedCollection};

/// How `get_all_records` walks pages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    /// One page at a time until an empty page
    #[default]
    Sequential,
    /// Windows of `batch_size` concurrent page requests
    Batched,
}

/// Parameters of an incremental (modified-after) walk
#[derive(Debug, Clone)]
pub struct ModifiedAfterParams {
    pub request: PageRequest,
    /// Keep records modified at or after this instant
    pub modified_after: DateTime<Utc>,
    pub fetch_related: bool,
}

impl ModifiedAfterParams {
    pub fn new(request: PageRequest, modified_after: DateTime<Utc>) -> Self {
        Self {
            request,
            modified_after,
            fetch_related: true,
        }
    }

    pub fn fetch_related(mut self, fetch_related: bool) -> Self {
        self.fetch_related = fetch_related;
        self
    }
}

/// Parameters of a full walk
#[derive(Debug, Clone)]
pub struct AllRecordsParams {
    pub request: PageRequest,
    pub strategy: Strategy,
    pub fetch_related: bool,
}

impl AllRecordsParams {
    pub fn new(request: PageRequest) -> Self {
        Self {
            request,
            strategy: Strategy::default(),
            fetch_related: true,
        }
    }

    pub fn strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn fetch_related(mut self, fetch_related: bool) -> Self {
        self.fetch_related = fetch_related;
        self
    }
}

/// Aggregated records of one walk
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncResult {
    pub records: Vec<Record>,
    /// One labeled collection per related module walked
    pub related: Vec<RelatedCollection>,
    /// Page requests issued for the primary module
    pub pages_fetched: u32,
}

/// Page walker over one fetcher and resolver
pub struct SyncEngine {
    fetcher: PageFetcher,
    resolver: SubformResolver,
    options: SyncOptions,
}

impl SyncEngine {
    pub fn new(fetcher: PageFetcher, resolver: SubformResolver, options: SyncOptions) -> Self {
        Self {
            fetcher,
            resolver,
            options,
        }
    }

    pub fn resolver(&self) -> &SubformResolver {
        &self.resolver
    }

    /// One page, with subform resolution when the request asks for it
    ///
    /// Error statuses come back as the page's error marker.
    pub fn get_records(&self, req: &PageRequest) -> Result<PageResult> {
        let page = self.fetcher.fetch(req)?;
        if page.error().is_some() {
            return Ok(page);
        }
        self.resolver.resolve_subforms(page, req)
    }

    /// Like `get_records`, but an error marker becomes `CrmError::Remote`
    fn checked_page(&self, req: &PageRequest) -> Result<PageResult> {
        self.get_records(req)?.into_checked()
    }

    /// Run `walk` for every multi-select lookup module related to `module`
    fn cascade<F>(&self, module: &str, request: &PageRequest, walk: F) -> Result<Vec<RelatedCollection>>
    where
        F: Fn(&PageRequest) -> Result<Vec<Record>>,
    {
        let related = self.resolver.discover_related_modules(module);
        let mut collections = Vec::with_capacity(related.len());
        for module in related {
            let records = walk(&request.for_module(&module.module))?;
            info!(
                "[SYNC] Related module {}: {} records",
                module.module,
                records.len()
            );
            collections.push(RelatedCollection { module, records });
        }
        Ok(collections)
    }
}

/// Dedicated pool with one thread per request of a window
///
/// Window requests block on the network and never run on the global rayon pool.
pub(crate) fn window_pool(options: &SyncOptions) -> Result<rayon::ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(options.window_size())
        .thread_name(|i| format!("crm-window-{}", i))
        .build()?)
}
