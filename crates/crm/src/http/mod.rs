//! HTTP transport boundary
//!
//! The engine never talks to the network directly: every call goes through a
//! [`Transport`], so tests can substitute an in-process fake CRM.

mod transport;

pub use transport::{HttpRequest, HttpResponse, Method, RequestBody, Transport, UreqTransport};
