//! Page fetching
//!
//! This module provides:
//! - the page fetcher (one bounded list request, normalized)
//! - the subform / related-module resolver
//! - response normalization shared by every read and write path

mod normalize;
mod page;
mod subform;

pub use normalize::{normalize_page, normalize_write, remote_error};
pub use page::PageFetcher;
pub use subform::SubformResolver;
