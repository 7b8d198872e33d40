//! Domain models for CRM records, pages and jobs

mod bulk;
mod page;
mod record;
mod related;
mod write;

pub use bulk::{BulkJob, BulkState};
pub use page::{PageInfo, PageRequest, PageResult, RemoteError, SortOrder};
pub use record::{Record, RecordId};
pub use related::{RelatedCollection, RelatedModule};
pub use write::{WriteOutcome, WriteResult};
