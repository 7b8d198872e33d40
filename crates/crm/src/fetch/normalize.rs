//! CRM response normalization
//!
//! Converts raw HTTP responses into page results and write results. A
//! non-2xx status is captured in the value, never raised.

use serde_json::Value;

use crate::api::wire::{RecordsResponse, WriteResponse};
use crate::http::HttpResponse;
use crate::models::{PageResult, RemoteError, WriteResult};

/// Characters of a non-JSON error body kept in the error marker
const MAX_ERROR_TEXT: usize = 512;

/// Normalize a list, search or get-by-id response
///
/// - status >= 400: no records, error marker from the body
/// - empty body: no records, status 204
/// - 200: records and pagination info (malformed JSON gets an error marker)
/// - any other status: no records, status kept, no marker
pub fn normalize_page(response: &HttpResponse) -> PageResult {
    if response.status >= 400 {
        return PageResult::failed(response.status, remote_error(response));
    }
    if response.is_blank() {
        return PageResult::empty(PageResult::NO_CONTENT);
    }
    if response.status != 200 {
        return PageResult::empty(response.status);
    }

    match response.json::<RecordsResponse>() {
        Ok(body) => match body.data {
            Some(records) if !records.is_empty() => {
                PageResult::with_records(records, response.status, body.info.unwrap_or_default())
            }
            _ => PageResult::empty(response.status),
        },
        Err(e) => PageResult::failed(
            response.status,
            RemoteError::new(RemoteError::MALFORMED_BODY, e.to_string()),
        ),
    }
}

/// Normalize an insert or update response
///
/// Error responses yield a single failed outcome carrying the error body.
pub fn normalize_write(response: &HttpResponse) -> WriteResult {
    if response.is_blank() {
        return WriteResult {
            status_code: response.status,
            outcomes: Vec::new(),
        };
    }

    match response.json::<WriteResponse>() {
        Ok(body) if !body.data.is_empty() => WriteResult {
            status_code: response.status,
            outcomes: body.data,
        },
        _ => {
            let error = remote_error(response);
            let mut details = serde_json::Map::new();
            if let Some(Value::Object(extra)) = error.details {
                details = extra;
            }
            WriteResult {
                status_code: response.status,
                outcomes: vec![crate::models::WriteOutcome {
                    code: error.code,
                    status: "error".to_string(),
                    message: error.message,
                    details,
                }],
            }
        }
    }
}

/// Extract the CRM error body (`code`, `message`, `details`)
///
/// Some endpoints wrap the error in `data[0]`; anything unparseable becomes
/// an `HTTP_<status>` marker with the raw text.
pub fn remote_error(response: &HttpResponse) -> RemoteError {
    let parsed: Option<Value> = serde_json::from_slice(&response.body).ok();

    let candidate = parsed.as_ref().and_then(|body| {
        if body.get("code").is_some() {
            Some(body)
        } else {
            body.get("data").and_then(|d| d.get(0))
        }
    });

    if let Some(error) = candidate.and_then(|v| serde_json::from_value::<RemoteError>(v.clone()).ok())
        && !error.code.is_empty()
    {
        return error;
    }

    let text: String = response.text().chars().take(MAX_ERROR_TEXT).collect();
    RemoteError::new(format!("HTTP_{}", response.status), text)
}
