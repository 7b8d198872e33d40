use chrono::{DateTime, Utc};
use log::{info, log};

use super::{ModifiedAfterParams, SyncEngine, SyncResult};
use crate::error::Result;
use crate::models::{PageRequest, Record, SortOrder};

impl SyncEngine {
    /// Records modified at or after `params.modified_after`
    ///
    /// Pages are requested newest first, so the walk ends at the first record
    /// below the threshold. A record without a readable `Modified_Time`
    /// counts as below it.
    pub fn get_records_modified_after(&self, params: &ModifiedAfterParams) -> Result<SyncResult> {
        params.request.validate()?;
        let request = params
            .request
            .clone()
            .sort_by(Record::MODIFIED_TIME, SortOrder::Desc);

        info!(
            "[SYNC] {} modified after {}",
            request.module,
            params.modified_after.to_rfc3339()
        );
        let (records, pages_fetched) = self.walk_modified_after(&request, params.modified_after)?;

        let related = if params.fetch_related {
            self.cascade(&request.module, &request, |req| {
                self.walk_modified_after(req, params.modified_after)
                    .map(|(records, _)| records)
            })?
        } else {
            Vec::new()
        };

        info!(
            "[SYNC] {} modified after: {} records over {} pages",
            request.module,
            records.len(),
            pages_fetched
        );
        Ok(SyncResult {
            records,
            related,
            pages_fetched,
        })
    }

    fn walk_modified_after(
        &self,
        request: &PageRequest,
        threshold: DateTime<Utc>,
    ) -> Result<(Vec<Record>, u32)> {
        let mut records = Vec::new();
        let mut pages_fetched = 0u32;
        let mut page_number = 1u32;

        loop {
            let page = self.checked_page(&request.at_page(page_number))?;
            pages_fetched += 1;
            if page.is_empty() {
                break;
            }

            let more = page.has_more();
            let mut crossed = false;
            for record in page.into_records() {
                if record.modified_time().is_some_and(|t| t >= threshold) {
                    records.push(record);
                } else {
                    crossed = true;
                    break;
                }
            }

            log!(
                self.options.trace_level(),
                "[SYNC] {} page {}: {} kept so far",
                request.module,
                page_number,
                records.len()
            );
            if crossed || !more {
                break;
            }
            page_number += 1;
        }

        Ok((records, pages_fetched))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use serde_json::{Value, json};

    use super::*;
    use crate::config::SyncOptions;
    use crate::error::CrmError;
    use crate::http::HttpResponse;
    use crate::models::RelatedModule;
    use crate::sync::testing::engine;
    use crate::test_support::{ScriptedTransport, query_param};

    fn record(id: u32, modified: &str) -> Value {
        json!({"id": id.to_string(), "Modified_Time": modified})
    }

    fn page(records: Vec<Value>, more: bool) -> HttpResponse {
        HttpResponse::json_body(
            200,
            &json!({"data": records, "info": {"per_page": 2, "count": 2, "page": 1, "more_records": more}}),
        )
    }

    fn threshold() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_stops_at_first_older_record() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            Ok(match query_param(req, "page").as_deref() {
                Some("1") => page(
                    vec![
                        record(1, "2024-03-05T10:00:00+00:00"),
                        record(2, "2024-03-03T10:00:00+01:00"),
                    ],
                    true,
                ),
                Some("2") => page(
                    vec![
                        record(3, "2024-03-01T00:00:00Z"),
                        record(4, "2024-02-28T23:59:59+00:00"),
                    ],
                    true,
                ),
                _ => page(vec![record(5, "2024-02-01T00:00:00+00:00")], false),
            })
        }));
        let engine = engine(transport.clone(), SyncOptions::default());
        let params = ModifiedAfterParams::new(PageRequest::new("Leads").per_page(2), threshold())
            .fetch_related(false);

        let result = engine.get_records_modified_after(&params).unwrap();

        let ids: Vec<String> = result.records.iter().map(|r| r.id().unwrap().to_string()).collect();
        assert_eq!(ids, vec!["1", "2", "3"]);
        assert_eq!(result.pages_fetched, 2);
        assert_eq!(transport.call_count(), 2);

        let first = &transport.requests()[0];
        assert_eq!(query_param(first, "sort_by").as_deref(), Some("Modified_Time"));
        assert_eq!(query_param(first, "sort_order").as_deref(), Some("desc"));
    }

    #[test]
    fn test_stops_when_no_more_records() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(page(vec![record(1, "2024-03-05T10:00:00+00:00")], false))
        }));
        let engine = engine(transport.clone(), SyncOptions::default());
        let params =
            ModifiedAfterParams::new(PageRequest::new("Leads"), threshold()).fetch_related(false);

        let result = engine.get_records_modified_after(&params).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_missing_timestamp_ends_walk() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(page(
                vec![record(1, "2024-03-05T10:00:00+00:00"), json!({"id": "2"})],
                true,
            ))
        }));
        let engine = engine(transport.clone(), SyncOptions::default());
        let params =
            ModifiedAfterParams::new(PageRequest::new("Leads"), threshold()).fetch_related(false);

        let result = engine.get_records_modified_after(&params).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_error_page_aborts_walk() {
        let transport = Arc::new(ScriptedTransport::new(|_| {
            Ok(HttpResponse::json_body(
                401,
                &json!({"code": "INVALID_TOKEN", "message": "invalid oauth token"}),
            ))
        }));
        let engine = engine(transport, SyncOptions::default());
        let params =
            ModifiedAfterParams::new(PageRequest::new("Leads"), threshold()).fetch_related(false);

        let err = engine.get_records_modified_after(&params).unwrap_err();
        assert!(matches!(err, CrmError::Remote { status: 401, .. }));
    }

    #[test]
    fn test_cascades_into_related_modules() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            if req.url.contains("/settings/related_lists") {
                return Ok(HttpResponse::json_body(
                    200,
                    &json!({"related_lists": [
                        {"api_name": "Linked", "module": {"api_name": "Leads_X_Products"}, "type": "multiselectlookup"}
                    ]}),
                ));
            }
            if req.url.contains("/Leads_X_Products") {
                return Ok(page(vec![record(90, "2024-03-02T00:00:00+00:00")], false));
            }
            Ok(page(vec![record(1, "2024-03-05T10:00:00+00:00")], false))
        }));
        let engine = engine(transport, SyncOptions::default());
        let params = ModifiedAfterParams::new(PageRequest::new("Leads"), threshold());

        let result = engine.get_records_modified_after(&params).unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.related.len(), 1);
        assert_eq!(
            result.related[0].module,
            RelatedModule::multiselect_lookup("Leads_X_Products")
        );
        assert_eq!(result.related[0].records[0].id().unwrap().as_str(), "90");
    }
}
