//! Page requests and normalized page results

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::Record;
use crate::error::{CrmError, Result};

/// Sort direction for list requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

/// One page of one module
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub module: String,
    /// 1-based page number
    pub page: u32,
    pub per_page: u32,
    pub sort_by: Option<String>,
    pub sort_order: Option<SortOrder>,
    /// Fetch full detail for every record on the page
    pub has_subform: bool,
    /// Fetch full detail only for records matching all of these fields
    pub where_subform: Option<BTreeMap<String, Value>>,
}

impl PageRequest {
    pub const DEFAULT_PER_PAGE: u32 = 50;
    /// Largest page the list endpoint accepts
    pub const MAX_PER_PAGE: u32 = 200;

    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            page: 1,
            per_page: Self::DEFAULT_PER_PAGE,
            sort_by: None,
            sort_order: None,
            has_subform: false,
            where_subform: None,
        }
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    /// Page size, clamped to `1..=MAX_PER_PAGE`
    pub fn per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.clamp(1, Self::MAX_PER_PAGE);
        self
    }

    pub fn sort_by(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.sort_by = Some(field.into());
        self.sort_order = Some(order);
        self
    }

    pub fn with_subform(mut self) -> Self {
        self.has_subform = true;
        self
    }

    /// Add a `field == value` condition to the detail-fetch predicate
    pub fn where_subform(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_subform
            .get_or_insert_with(BTreeMap::new)
            .insert(field.into(), value.into());
        self
    }

    /// Same request for another page
    pub fn at_page(&self, page: u32) -> Self {
        Self {
            page,
            ..self.clone()
        }
    }

    /// Same request for another module, without the subform options
    pub fn for_module(&self, module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            page: 1,
            has_subform: false,
            where_subform: None,
            ..self.clone()
        }
    }

    /// Whether the subform resolver has anything to do for this request
    pub fn wants_detail(&self) -> bool {
        self.has_subform || self.where_subform.is_some()
    }

    /// Check required fields before any network call
    pub fn validate(&self) -> Result<()> {
        if self.module.trim().is_empty() {
            return Err(CrmError::validation("module is required"));
        }
        if self.page == 0 {
            return Err(CrmError::validation("page numbers start at 1"));
        }
        Ok(())
    }
}

/// Pagination metadata returned alongside a page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PageInfo {
    #[serde(default)]
    pub per_page: u32,
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub more_records: bool,
}

/// Error body returned by the CRM (`code`, `message`, `details`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl RemoteError {
    /// Marker used when a body could not be parsed
    pub const MALFORMED_BODY: &'static str = "MALFORMED_BODY";

    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Normalized outcome of one page fetch
///
/// A result carries records or an error marker, never both.
#[derive(Debug, Clone, PartialEq)]
pub struct PageResult {
    records: Vec<Record>,
    status_code: u16,
    info: PageInfo,
    error: Option<RemoteError>,
}

impl PageResult {
    /// Status used for a missing or empty body
    pub const NO_CONTENT: u16 = 204;

    pub fn with_records(records: Vec<Record>, status_code: u16, info: PageInfo) -> Self {
        Self {
            records,
            status_code,
            info,
            error: None,
        }
    }

    /// No records, no error
    pub fn empty(status_code: u16) -> Self {
        Self {
            records: Vec::new(),
            status_code,
            info: PageInfo::default(),
            error: None,
        }
    }

    /// No records, with an error marker
    pub fn failed(status_code: u16, error: RemoteError) -> Self {
        Self {
            records: Vec::new(),
            status_code,
            info: PageInfo::default(),
            error: Some(error),
        }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn info(&self) -> &PageInfo {
        &self.info
    }

    pub fn error(&self) -> Option<&RemoteError> {
        self.error.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether the server reported another page after this one
    pub fn has_more(&self) -> bool {
        self.info.more_records
    }

    /// Replace the records, keeping status and metadata
    pub fn replace_records(self, records: Vec<Record>) -> Self {
        Self { records, ..self }
    }

    /// Turn an error marker into `CrmError::Remote`
    pub fn into_checked(self) -> Result<Self> {
        match self.error {
            Some(error) => Err(CrmError::Remote {
                status: self.status_code,
                error,
            }),
            None => Ok(self),
        }
    }
}
