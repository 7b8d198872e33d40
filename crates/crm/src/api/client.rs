//! Authenticated CRM API client
//!
//! Builds the request for each endpoint, attaches the current access token
//! and hands the request to the transport. Responses come back raw; callers
//! normalize them.

use log::debug;
use serde_json::{Value, json};
use std::sync::Arc;
use url::Url;

use crate::auth::CredentialManager;
use crate::error::{CrmError, Result};
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::models::{PageRequest, Record};

/// CRM REST client bound to one tenant's credentials
pub struct CrmClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<CredentialManager>,
    api_url: String,
}

impl CrmClient {
    /// REST API root, relative to the API host
    const API_ROOT: &'static str = "crm/v2";
    /// Bulk read API root, relative to the API host
    const BULK_READ_ROOT: &'static str = "crm/bulk/v2/read";

    pub fn new(transport: Arc<dyn Transport>, credentials: Arc<CredentialManager>, api_url: &str) -> Self {
        Self {
            transport,
            credentials,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn credentials(&self) -> &CredentialManager {
        &self.credentials
    }

    /// List one page of a module
    pub fn list_records(&self, req: &PageRequest) -> Result<HttpResponse> {
        let mut query = vec![
            ("page", req.page.to_string()),
            ("per_page", req.per_page.to_string()),
        ];
        if let Some(sort_by) = &req.sort_by {
            query.push(("sort_by", sort_by.clone()));
        }
        if let Some(order) = req.sort_order {
            query.push(("sort_order", order.as_str().to_string()));
        }

        let url = self.url(Self::API_ROOT, &[&req.module], &query)?;
        self.send(HttpRequest::get(url), false)
    }

    /// Fetch one record by ID
    pub fn get_record(&self, module: &str, id: &str) -> Result<HttpResponse> {
        let url = self.url(Self::API_ROOT, &[module, id], &[])?;
        self.send(HttpRequest::get(url), false)
    }

    /// Search a module with a criteria expression
    pub fn search(&self, module: &str, criteria: &str, page: u32, per_page: u32) -> Result<HttpResponse> {
        let url = self.url(
            Self::API_ROOT,
            &[module, "search"],
            &[
                ("criteria", criteria.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ],
        )?;
        self.send(HttpRequest::get(url), false)
    }

    /// Update one record by ID
    pub fn update_record(&self, module: &str, id: &str, fields: &Record) -> Result<HttpResponse> {
        let url = self.url(Self::API_ROOT, &[module, id], &[])?;
        self.send(HttpRequest::put(url).json(json!({ "data": [fields] })), false)
    }

    /// Update several records; each must carry its `id`
    pub fn update_records(&self, module: &str, records: &[Record]) -> Result<HttpResponse> {
        let url = self.url(Self::API_ROOT, &[module], &[])?;
        self.send(HttpRequest::put(url).json(json!({ "data": records })), false)
    }

    /// Insert records
    pub fn insert_records(&self, module: &str, records: &[Record]) -> Result<HttpResponse> {
        let url = self.url(Self::API_ROOT, &[module], &[])?;
        self.send(HttpRequest::post(url).json(json!({ "data": records })), false)
    }

    /// Related-list metadata of a module
    pub fn related_lists(&self, module: &str) -> Result<HttpResponse> {
        let url = self.url(
            Self::API_ROOT,
            &["settings", "related_lists"],
            &[("module", module.to_string())],
        )?;
        self.send(HttpRequest::get(url), false)
    }

    /// Create a bulk read job for a whole module
    ///
    /// Jobs outlive a normal request, so the credential is regenerated first.
    pub fn create_bulk_read(&self, module: &str) -> Result<HttpResponse> {
        let url = self.url(Self::BULK_READ_ROOT, &[], &[])?;
        let body: Value = json!({ "query": { "module": module, "page": 1 } });
        self.send(HttpRequest::post(url).json(body), true)
    }

    /// Status of a bulk read job
    pub fn bulk_read_status(&self, job_id: &str) -> Result<HttpResponse> {
        let url = self.url(Self::BULK_READ_ROOT, &[job_id], &[])?;
        self.send(HttpRequest::get(url), false)
    }

    /// Result archive of a completed bulk read job
    pub fn bulk_read_result(&self, job_id: &str) -> Result<HttpResponse> {
        let url = self.url(Self::BULK_READ_ROOT, &[job_id, "result"], &[])?;
        self.send(HttpRequest::get(url), false)
    }

    fn send(&self, request: HttpRequest, force_regenerate: bool) -> Result<HttpResponse> {
        let credential = self.credentials.ensure_valid(force_regenerate)?;
        let request = request.header("Authorization", credential.authorization());
        debug!("[API] {} {}", request.method.as_str(), request.url);
        self.transport.execute(&request)
    }

    /// `{api_url}/{root}/{segments...}?{query}` with each segment percent-encoded
    fn url(&self, root: &str, segments: &[&str], query: &[(&str, String)]) -> Result<String> {
        let mut url = Url::parse(&format!("{}/{}", self.api_url, root))
            .map_err(|e| CrmError::validation(format!("invalid API url {}: {}", self.api_url, e)))?;
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| CrmError::validation(format!("API url cannot be a base: {}", self.api_url)))?;
            path.extend(segments);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url.into())
    }
}
