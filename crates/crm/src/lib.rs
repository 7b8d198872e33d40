//! CRM crate - record synchronization against the Zoho CRM v2 REST API
//!
//! This crate provides:
//! - A shared OAuth credential cache with single-writer refresh
//! - Page fetching with error-status normalization and an optional page cache
//! - Subform expansion and multi-select lookup discovery
//! - Incremental (modified-after) and full pagination, sequential or batched
//! - Bulk read exports, polled to completion and extracted to CSV
//!
//! HTTP is synchronous (ureq) behind the [`Transport`] trait, so the engine
//! runs on any executor or none, and tests substitute an in-process fake.

pub mod api;
pub mod auth;
pub mod bulk;
pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod http;
pub mod models;
pub mod service;
pub mod sync;

pub use api::{CrmClient, Criteria, Operator};
pub use auth::{
    Credential, CredentialManager, FileTokenStore, MemoryTokenStore, OAuthTokenAuthority,
    StoredTokens, TokenAuthority, TokenGrant, TokenStore,
};
pub use bulk::{BulkExporter, ExportOutcome};
pub use cache::{FilePageCache, MemoryPageCache, PageCache, PageKey};
pub use clock::{Clock, SystemClock};
pub use crate::config::{CrmSettings, SyncOptions};
pub use error::{CrmError, Result};
pub use http::{HttpRequest, HttpResponse, Transport, UreqTransport};
pub use models::{
    BulkJob, BulkState, PageInfo, PageRequest, PageResult, Record, RecordId, RelatedCollection,
    RelatedModule, RemoteError, SortOrder, WriteOutcome, WriteResult,
};
pub use service::CrmSync;
pub use sync::{AllRecordsParams, ModifiedAfterParams, Strategy, SyncResult};

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::{Cursor, Write};
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, Utc};

    use crate::api::CrmClient;
    use crate::auth::{CredentialManager, MemoryTokenStore, StoredTokens, TokenAuthority, TokenGrant};
    use crate::clock::SystemClock;
    use crate::error::Result;
    use crate::http::{HttpRequest, HttpResponse, Transport};

    type Handler = dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync;

    /// Transport answering from a closure and recording every request
    pub struct ScriptedTransport {
        handler: Box<Handler>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub fn new<F>(handler: F) -> Self
        where
            F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
        {
            Self {
                handler: Box::new(handler),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute(&self, request: &HttpRequest) -> Result<HttpResponse> {
            self.requests.lock().unwrap().push(request.clone());
            (self.handler)(request)
        }
    }

    /// Authority that always mints `test-token`
    struct StaticAuthority;

    impl TokenAuthority for StaticAuthority {
        fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
            Ok(TokenGrant {
                access_token: "test-token".to_string(),
                refresh_token: None,
                expires_in: Some(3600),
                expires_in_sec: None,
                api_domain: None,
            })
        }
    }

    /// Credentials holding a stored `test-token` valid for a day
    pub fn fresh_credentials() -> Arc<CredentialManager> {
        let blob = StoredTokens {
            access_token: "test-token".to_string(),
            expires_in: 86_400,
            refresh_token: "test-refresh".to_string(),
            expires_at: Some(Utc::now() + Duration::days(1)),
        }
        .to_json()
        .unwrap();

        Arc::new(CredentialManager::new(
            Arc::new(MemoryTokenStore::with_blob(blob)),
            Arc::new(StaticAuthority),
            Arc::new(SystemClock),
            std::time::Duration::from_secs(600),
        ))
    }

    pub fn client_with(transport: Arc<dyn Transport>) -> Arc<CrmClient> {
        Arc::new(CrmClient::new(
            transport,
            fresh_credentials(),
            "https://www.zohoapis.test",
        ))
    }

    /// First value of a query parameter of the request URL
    pub fn query_param(request: &HttpRequest, name: &str) -> Option<String> {
        url::Url::parse(&request.url)
            .ok()?
            .query_pairs()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.into_owned())
    }

    /// Zip archive holding the given (name, content) files
    pub fn zip_archive(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }
}
