//! CRM REST API surface
//!
//! This module provides:
//! - the authenticated client that knows every endpoint the engine uses
//! - the search criteria grammar

mod client;
mod criteria;

pub use client::CrmClient;
pub use criteria::{Criteria, Operator};

/// Wire shapes of CRM responses
pub mod wire {
    use serde::Deserialize;
    use serde_json::Value;

    use crate::models::{PageInfo, Record, WriteOutcome};

    /// Body of list, search and get-by-id responses
    #[derive(Debug, Deserialize)]
    pub struct RecordsResponse {
        #[serde(default)]
        pub data: Option<Vec<Record>>,
        #[serde(default)]
        pub info: Option<PageInfo>,
    }

    /// Body of insert and update responses
    #[derive(Debug, Deserialize)]
    pub struct WriteResponse {
        #[serde(default)]
        pub data: Vec<WriteOutcome>,
    }

    /// Body of the related-lists metadata endpoint
    #[derive(Debug, Deserialize)]
    pub struct RelatedListsResponse {
        pub related_lists: Vec<RelatedList>,
    }

    /// One related list; `module` is either an API name or an object holding one
    #[derive(Debug, Deserialize)]
    pub struct RelatedList {
        #[serde(default)]
        pub api_name: Option<String>,
        #[serde(default)]
        pub module: Option<Value>,
        #[serde(default, rename = "type")]
        pub relation_type: Option<String>,
    }

    impl RelatedList {
        /// API name of the module holding the related records
        pub fn module_name(&self) -> Option<String> {
            match &self.module {
                Some(Value::String(name)) if !name.is_empty() => Some(name.clone()),
                Some(Value::Object(obj)) => obj
                    .get("api_name")
                    .and_then(Value::as_str)
                    .filter(|name| !name.is_empty())
                    .map(str::to_string),
                _ => None,
            }
        }
    }

    /// Body of bulk create and status responses
    #[derive(Debug, Deserialize)]
    pub struct BulkResponse {
        #[serde(default)]
        pub data: Vec<BulkEntry>,
    }

    /// One bulk job entry; creation nests the job under `details`
    #[derive(Debug, Deserialize)]
    pub struct BulkEntry {
        #[serde(default)]
        pub id: Option<Value>,
        #[serde(default)]
        pub state: Option<String>,
        #[serde(default)]
        pub status: Option<String>,
        #[serde(default)]
        pub details: Option<BulkDetails>,
    }

    #[derive(Debug, Deserialize)]
    pub struct BulkDetails {
        #[serde(default)]
        pub id: Option<Value>,
        #[serde(default)]
        pub state: Option<String>,
    }

    impl BulkEntry {
        pub fn job_id(&self) -> Option<String> {
            self.details
                .as_ref()
                .and_then(|d| d.id.as_ref())
                .or(self.id.as_ref())
                .and_then(id_string)
        }

        pub fn state(&self) -> Option<&str> {
            self.state
                .as_deref()
                .or_else(|| self.details.as_ref().and_then(|d| d.state.as_deref()))
        }
    }

    fn id_string(value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
