//! Subform and related-module resolution
//!
//! List responses carry summary records only. Subform fields (and anything
//! else only present in the detail view) need one extra request per record.

use log::{log, warn};
use std::sync::Arc;

use super::{normalize_page, remote_error};
use crate::api::CrmClient;
use crate::api::wire::RelatedListsResponse;
use crate::config::SyncOptions;
use crate::error::{CrmError, Result};
use crate::models::{PageRequest, PageResult, Record, RelatedModule};

/// Expands summary records into detail records and discovers related modules
pub struct SubformResolver {
    client: Arc<CrmClient>,
    options: SyncOptions,
}

impl SubformResolver {
    pub fn new(client: Arc<CrmClient>, options: SyncOptions) -> Self {
        Self { client, options }
    }

    /// Replace selected records of `page` with their detail view
    ///
    /// With `has_subform` every record is selected; with `where_subform` only
    /// records whose fields match every predicate entry. Detail requests are
    /// issued one at a time, in page order.
    pub fn resolve_subforms(&self, page: PageResult, req: &PageRequest) -> Result<PageResult> {
        if !req.wants_detail() || page.is_empty() {
            return Ok(page);
        }

        let mut records = page.records().to_vec();
        let mut fetched = 0usize;
        for record in records.iter_mut() {
            if !self.selects(record, req) {
                continue;
            }
            let Some(id) = record.id() else {
                warn!("[SUBFORM] {} record without id, keeping summary", req.module);
                continue;
            };
            if let Some(detail) = self.fetch_detail(&req.module, id.as_str())? {
                *record = detail;
            }
            fetched += 1;
        }

        log!(
            self.options.trace_level(),
            "[SUBFORM] {} page {}: {} detail fetches for {} records",
            req.module,
            req.page,
            fetched,
            records.len()
        );
        Ok(page.replace_records(records))
    }

    fn selects(&self, record: &Record, req: &PageRequest) -> bool {
        if req.has_subform {
            return true;
        }
        req.where_subform
            .as_ref()
            .is_some_and(|predicate| record.matches(predicate))
    }

    /// Detail view of one record, or None when the response holds no record
    pub fn fetch_detail(&self, module: &str, id: &str) -> Result<Option<Record>> {
        let response = self.client.get_record(module, id)?;
        let page = normalize_page(&response).into_checked()?;
        Ok(page.into_records().into_iter().next())
    }

    /// Modules linked to `module` through multi-select lookups
    ///
    /// Never fails: any problem with the metadata call yields an empty list
    /// and a warning naming the credential's expiry window.
    pub fn discover_related_modules(&self, module: &str) -> Vec<RelatedModule> {
        match self.related_modules(module) {
            Ok(related) => related,
            Err(e) => {
                warn!(
                    "[RELATED] Related-list lookup for {} failed: {} ({})",
                    module,
                    e,
                    self.client.credentials().describe_expiry()
                );
                Vec::new()
            }
        }
    }

    fn related_modules(&self, module: &str) -> Result<Vec<RelatedModule>> {
        let response = self.client.related_lists(module)?;
        if !response.is_success() || response.is_blank() {
            return Err(CrmError::Remote {
                status: response.status,
                error: remote_error(&response),
            });
        }

        let body: RelatedListsResponse = response.json()?;
        let mut related: Vec<RelatedModule> = Vec::new();
        for list in body.related_lists {
            let Some(relation_type) = list.relation_type.as_deref() else {
                continue;
            };
            let Some(name) = list.module_name().or_else(|| list.api_name.clone()) else {
                continue;
            };
            let candidate = RelatedModule::new(name, relation_type);
            if candidate.is_multiselect_lookup() && !related.contains(&candidate) {
                related.push(candidate);
            }
        }

        log!(
            self.options.trace_level(),
            "[RELATED] {} has {} multi-select lookup modules",
            module,
            related.len()
        );
        Ok(related)
    }
}
