use log::{info, log};
use rayon::prelude::*;

use super::{AllRecordsParams, Strategy, SyncEngine, SyncResult, window_pool};
use crate::error::Result;
use crate::models::{PageRequest, PageResult, Record};

impl SyncEngine {
    /// Every record of a module
    ///
    /// The walk ends at the first empty page. With [`Strategy::Batched`] a
    /// whole window of pages is in flight at once; the records of the window
    /// that contained the empty page are still kept.
    pub fn get_all_records(&self, params: &AllRecordsParams) -> Result<SyncResult> {
        params.request.validate()?;
        let request = &params.request;

        info!(
            "[SYNC] All records of {} ({:?})",
            request.module, params.strategy
        );
        let (records, pages_fetched) = self.walk_all(request, params.strategy)?;

        let related = if params.fetch_related {
            self.cascade(&request.module, request, |req| {
                self.walk_all(req, params.strategy).map(|(records, _)| records)
            })?
        } else {
            Vec::new()
        };

        info!(
            "[SYNC] {}: {} records over {} pages",
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

    fn walk_all(&self, request: &PageRequest, strategy: Strategy) -> Result<(Vec<Record>, u32)> {
        match strategy {
            Strategy::Sequential => self.walk_sequential(request),
            Strategy::Batched => self.walk_batched(request),
        }
    }

    fn walk_sequential(&self, request: &PageRequest) -> Result<(Vec<Record>, u32)> {
        let mut records = Vec::new();
        let mut page_number = 1u32;

        loop {
            let page = self.checked_page(&request.at_page(page_number))?;
            if page.is_empty() {
                return Ok((records, page_number));
            }
            log!(
                self.options.trace_level(),
                "[SYNC] {} page {}: {} records",
                request.module,
                page_number,
                page.records().len()
            );
            records.extend(page.into_records());
            page_number += 1;
        }
    }

    fn walk_batched(&self, request: &PageRequest) -> Result<(Vec<Record>, u32)> {
        // window_size is at most MAX_BATCH_SIZE
        let window = self.options.window_size() as u32;
        let pool = window_pool(&self.options)?;
        let mut records = Vec::new();
        let mut first = 1u32;

        loop {
            // Collected in page order regardless of completion order
            let pages: Vec<PageResult> = pool.install(|| {
                (first..first + window)
                    .into_par_iter()
                    .with_max_len(1)
                    .map(|page_number| self.checked_page(&request.at_page(page_number)))
                    .collect::<Result<Vec<_>>>()
            })?;

            let exhausted = pages.iter().any(PageResult::is_empty);
            for page in pages {
                records.extend(page.into_records());
            }
            log!(
                self.options.trace_level(),
                "[SYNC] {} pages {}..{}: {} records so far",
                request.module,
                first,
                first + window - 1,
                records.len()
            );

            first += window;
            if exhausted {
                return Ok((records, first - 1));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::config::SyncOptions;
    use crate::error::CrmError;
    use crate::http::HttpResponse;
    use crate::sync::testing::engine;
    use crate::test_support::{ScriptedTransport, query_param};

    /// Serves `sizes[page - 1]` records for each page, zero past the end
    fn sized_pages(sizes: &'static [usize]) -> Arc<ScriptedTransport> {
        Arc::new(ScriptedTransport::new(move |req| {
            let page: usize = query_param(req, "page")
                .and_then(|p| p.parse().ok())
                .unwrap_or(1);
            let count = sizes.get(page - 1).copied().unwrap_or(0);
            if count == 0 {
                return Ok(HttpResponse::new(204, ""));
            }
            let data: Vec<_> = (0..count)
                .map(|i| json!({"id": format!("{}-{}", page, i)}))
                .collect();
            Ok(HttpResponse::json_body(
                200,
                &json!({"data": data, "info": {"page": page, "count": count, "per_page": 2, "more_records": true}}),
            ))
        }))
    }

    fn requested_pages(transport: &ScriptedTransport) -> Vec<u32> {
        let mut pages: Vec<u32> = transport
            .requests()
            .iter()
            .filter_map(|r| query_param(r, "page").and_then(|p| p.parse().ok()))
            .collect();
        pages.sort_unstable();
        pages
    }

    #[test]
    fn test_sequential_until_empty_page() {
        let transport = sized_pages(&[2, 2, 1]);
        let engine = engine(transport.clone(), SyncOptions::default());
        let params = AllRecordsParams::new(PageRequest::new("Contacts")).fetch_related(false);

        let result = engine.get_all_records(&params).unwrap();
        assert_eq!(result.records.len(), 5);
        assert_eq!(result.pages_fetched, 4);
        assert_eq!(requested_pages(&transport), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_batched_keeps_terminating_window() {
        let transport = sized_pages(&[2, 2, 0, 2]);
        let engine = engine(transport.clone(), SyncOptions::default().batch_size(2));
        let params = AllRecordsParams::new(PageRequest::new("Contacts"))
            .strategy(Strategy::Batched)
            .fetch_related(false);

        let result = engine.get_all_records(&params).unwrap();

        // Window 1 = pages 1-2, window 2 = pages 3-4 (page 3 empty, page 4 kept)
        assert_eq!(result.records.len(), 6);
        assert_eq!(requested_pages(&transport), vec![1, 2, 3, 4]);
        assert_eq!(result.pages_fetched, 4);
    }

    #[test]
    fn test_batched_stops_after_empty_window() {
        let transport = sized_pages(&[2, 2]);
        let engine = engine(transport.clone(), SyncOptions::default().batch_size(2));
        let params = AllRecordsParams::new(PageRequest::new("Contacts"))
            .strategy(Strategy::Batched)
            .fetch_related(false);

        let result = engine.get_all_records(&params).unwrap();
        assert_eq!(result.records.len(), 4);
        assert_eq!(requested_pages(&transport), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_batched_preserves_page_order() {
        let transport = sized_pages(&[2, 2, 2, 1]);
        let engine = engine(transport, SyncOptions::default().batch_size(3));
        let params = AllRecordsParams::new(PageRequest::new("Contacts"))
            .strategy(Strategy::Batched)
            .fetch_related(false);

        let ids: Vec<String> = engine
            .get_all_records(&params)
            .unwrap()
            .records
            .iter()
            .map(|r| r.id().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["1-0", "1-1", "2-0", "2-1", "3-0", "3-1", "4-0"]);
    }

    #[test]
    fn test_batched_window_is_fully_in_flight() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let transport = {
            let (in_flight, peak) = (in_flight.clone(), peak.clone());
            Arc::new(ScriptedTransport::new(move |req| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(150));
                in_flight.fetch_sub(1, Ordering::SeqCst);

                let page = query_param(req, "page").unwrap_or_default();
                if page == "1" {
                    return Ok(HttpResponse::json_body(200, &json!({"data": [{"id": "1"}]})));
                }
                Ok(HttpResponse::new(204, ""))
            }))
        };
        let engine = engine(transport.clone(), SyncOptions::default().batch_size(6));
        let params = AllRecordsParams::new(PageRequest::new("Contacts"))
            .strategy(Strategy::Batched)
            .fetch_related(false);

        let result = engine.get_all_records(&params).unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(transport.call_count(), 6);
        assert_eq!(peak.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn test_oversized_batch_size_still_terminates() {
        let transport = sized_pages(&[2, 2]);
        let options = SyncOptions {
            batch_size: usize::MAX,
            ..SyncOptions::default()
        };
        let engine = engine(transport.clone(), options);
        let params = AllRecordsParams::new(PageRequest::new("Contacts"))
            .strategy(Strategy::Batched)
            .fetch_related(false);

        let result = engine.get_all_records(&params).unwrap();
        assert_eq!(result.records.len(), 4);
        assert_eq!(result.pages_fetched, SyncOptions::MAX_BATCH_SIZE as u32);
        assert_eq!(transport.call_count(), SyncOptions::MAX_BATCH_SIZE);
    }

    #[test]
    fn test_error_marker_aborts() {
        let transport = Arc::new(ScriptedTransport::new(|req| {
            if query_param(req, "page").as_deref() == Some("2") {
                return Ok(HttpResponse::new(500, "internal error"));
            }
            Ok(HttpResponse::json_body(200, &json!({"data": [{"id": "1"}]})))
        }));
        let engine = engine(transport, SyncOptions::default());
        let params = AllRecordsParams::new(PageRequest::new("Contacts")).fetch_related(false);

        let err = engine.get_all_records(&params).unwrap_err();
        assert!(matches!(err, CrmError::Remote { status: 500, .. }));
    }
}
