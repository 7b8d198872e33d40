//! The public operation surface
//!
//! [`CrmSync`] wires one tenant's transport, credential manager, page cache
//! and clock into the fetcher, the aggregation engine and the bulk exporter.

use anyhow::Context;
use log::{debug, info};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;

use crate::api::{CrmClient, Criteria};
use crate::auth::{CredentialManager, FileTokenStore, OAuthTokenAuthority};
use crate::bulk::{BulkExporter, ExportOutcome};
use crate::cache::{FilePageCache, PageCache, PageCacheLayer};
use crate::clock::{Clock, SystemClock};
use crate::config::{CrmSettings, SyncOptions};
use crate::error::{CrmError, Result};
use crate::fetch::{PageFetcher, SubformResolver, normalize_page, normalize_write};
use crate::http::{Transport, UreqTransport};
use crate::models::{PageRequest, PageResult, Record, RelatedModule, WriteResult};
use crate::sync::{AllRecordsParams, ModifiedAfterParams, SyncEngine, SyncResult, window_pool};

/// Sync engine for one CRM tenant
pub struct CrmSync {
    client: Arc<CrmClient>,
    engine: SyncEngine,
    exporter: BulkExporter,
    options: SyncOptions,
}

impl CrmSync {
    /// Largest number of records the update endpoint accepts per request
    pub const MAX_WRITE_BATCH: usize = 200;

    pub fn new(client: Arc<CrmClient>, clock: Arc<dyn Clock>, options: SyncOptions) -> Self {
        Self::assemble(client, clock, options, None)
    }

    /// Route page fetches through `cache`, compressed per `options.compress`
    pub fn with_page_cache(
        client: Arc<CrmClient>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
        cache: Arc<dyn PageCache>,
    ) -> Self {
        let layer = PageCacheLayer::with_compression(cache, options.compress);
        Self::assemble(client, clock, options, Some(layer))
    }

    /// Production wiring: ureq transport, token blob on disk, system clock
    ///
    /// With `options.cache` set, pages are cached under the config directory.
    pub fn from_settings(settings: &CrmSettings, options: SyncOptions) -> anyhow::Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(UreqTransport::new());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let token_path = settings.resolve_token_path()?;
        debug!("[SYNC] Token store at {}", token_path.display());
        let credentials = CredentialManager::new(
            Arc::new(FileTokenStore::new(&token_path)),
            Arc::new(OAuthTokenAuthority::new(
                transport.clone(),
                &settings.accounts_url,
                settings.client_id.clone(),
                settings.client_secret.clone(),
            )),
            clock.clone(),
            options.token_skew,
        );
        let client = Arc::new(CrmClient::new(transport, Arc::new(credentials), &settings.api_url));

        if options.cache {
            let cache = FilePageCache::in_config_dir().context("Failed to open page cache")?;
            return Ok(Self::with_page_cache(client, clock, options, Arc::new(cache)));
        }
        Ok(Self::new(client, clock, options))
    }

    fn assemble(
        client: Arc<CrmClient>,
        clock: Arc<dyn Clock>,
        options: SyncOptions,
        cache: Option<PageCacheLayer>,
    ) -> Self {
        let mut fetcher = PageFetcher::new(client.clone(), options.clone());
        if let Some(layer) = cache {
            fetcher = fetcher.with_cache(layer);
        }
        let resolver = SubformResolver::new(client.clone(), options.clone());
        Self {
            engine: SyncEngine::new(fetcher, resolver, options.clone()),
            exporter: BulkExporter::new(client.clone(), clock, options.clone()),
            client,
            options,
        }
    }

    pub fn credentials(&self) -> &CredentialManager {
        self.client.credentials()
    }

    pub fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// One page of a module, subforms resolved on request
    pub fn get_records(&self, req: &PageRequest) -> Result<PageResult> {
        self.engine.get_records(req)
    }

    /// One page of records matching `criteria`
    pub fn search_records(
        &self,
        module: &str,
        criteria: &Criteria,
        page: u32,
        per_page: u32,
    ) -> Result<PageResult> {
        require_module(module)?;
        if page == 0 {
            return Err(CrmError::validation("page numbers start at 1"));
        }
        if criteria.is_empty() {
            return Err(CrmError::validation("search criteria has no conditions"));
        }
        let per_page = per_page.clamp(1, PageRequest::MAX_PER_PAGE);
        let response = self.client.search(module, &criteria.render(), page, per_page)?;
        Ok(normalize_page(&response))
    }

    /// Records modified since a point in time, newest first
    pub fn get_records_modified_after(&self, params: &ModifiedAfterParams) -> Result<SyncResult> {
        self.engine.get_records_modified_after(params)
    }

    /// Every record of a module
    pub fn get_all_records(&self, params: &AllRecordsParams) -> Result<SyncResult> {
        self.engine.get_all_records(params)
    }

    /// One record in its detail view, or None if the CRM returns none
    pub fn get_record(&self, module: &str, id: &str) -> Result<Option<Record>> {
        require_module(module)?;
        require_id(id)?;
        self.engine.resolver().fetch_detail(module, id)
    }

    pub fn update_record(&self, module: &str, id: &str, fields: &Record) -> Result<WriteResult> {
        require_module(module)?;
        require_id(id)?;
        let response = self.client.update_record(module, id, fields)?;
        Ok(normalize_write(&response))
    }

    /// Update many records; each must carry its `id`
    ///
    /// Records are sent in chunks of [`Self::MAX_WRITE_BATCH`], with up to
    /// `batch_size` chunks in flight. Outcomes keep the input order.
    pub fn update_records(&self, module: &str, records: &[Record]) -> Result<WriteResult> {
        require_module(module)?;
        if let Some(position) = records.iter().position(|r| r.id().is_none()) {
            return Err(CrmError::validation(format!(
                "record {} of the update has no id",
                position
            )));
        }

        let chunks: Vec<&[Record]> = records.chunks(Self::MAX_WRITE_BATCH).collect();
        let pool = window_pool(&self.options)?;
        let mut merged = WriteResult::default();
        for window in chunks.chunks(self.options.window_size()) {
            let results = pool.install(|| {
                window
                    .par_iter()
                    .with_max_len(1)
                    .map(|chunk| -> Result<WriteResult> {
                        let response = self.client.update_records(module, chunk)?;
                        Ok(normalize_write(&response))
                    })
                    .collect::<Result<Vec<_>>>()
            })?;
            for result in results {
                merged.merge(result);
            }
        }

        info!(
            "[SYNC] Updated {} {} records in {} requests",
            records.len(),
            module,
            chunks.len()
        );
        Ok(merged)
    }

    pub fn insert_record(&self, module: &str, record: &Record) -> Result<WriteResult> {
        require_module(module)?;
        let response = self
            .client
            .insert_records(module, std::slice::from_ref(record))?;
        Ok(normalize_write(&response))
    }

    /// Export a whole module through a bulk read job
    pub fn download_module(&self, module: &str, destination: &Path) -> ExportOutcome {
        self.exporter.export(module, destination)
    }

    /// Modules linked to `module` through multi-select lookups (empty on failure)
    pub fn discover_related_modules(&self, module: &str) -> Vec<RelatedModule> {
        self.engine.resolver().discover_related_modules(module)
    }
}

fn require_module(module: &str) -> Result<()> {
    if module.trim().is_empty() {
        return Err(CrmError::validation("module name is required"));
    }
    Ok(())
}

fn require_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        return Err(CrmError::validation("record id is required"));
    }
    Ok(())
}
