//! OAuth credential handling
//!
//! This module provides:
//! - the credential value and the persisted token blob
//! - the token store boundary (where the blob lives)
//! - the token authority boundary (refresh-token grant)
//! - the shared credential manager that decides when to refresh

mod authority;
mod credential;
mod manager;
mod store;

pub use authority::{OAuthTokenAuthority, TokenAuthority, TokenGrant};
pub use credential::{Credential, StoredTokens};
pub use manager::CredentialManager;
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
