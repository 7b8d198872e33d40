//! Engine options and CRM connection settings
//!
//! `CrmSettings` is loaded from (in order of priority):
//! 1. JSON file (~/.config/crmsync/crm.json)
//! 2. Runtime environment variables (fallback)
//!
//! `SyncOptions` is an explicit value handed to the engine at construction.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings filename in the crmsync config directory
const SETTINGS_FILE: &str = "crm.json";

/// Default token blob filename in the crmsync config directory
pub const TOKENS_FILE: &str = "crm-tokens.json";

/// Tunables for the sync engine
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOptions {
    /// Promote per-page and per-record traces to info level
    pub debug: bool,
    /// Concurrent page requests per window (batched strategies)
    pub batch_size: usize,
    /// Route page fetches through the page cache
    pub cache: bool,
    /// Compress page cache entries
    pub compress: bool,
    /// A token is refreshed once it is within this margin of expiry
    pub token_skew: Duration,
    /// Delay between bulk job status checks
    pub poll_interval: Duration,
    /// Give up on a bulk job after this many status checks (None = never)
    pub max_poll_attempts: Option<u32>,
}

impl SyncOptions {
    pub const DEFAULT_BATCH_SIZE: usize = 5;
    /// Upper bound on a window; each request in flight holds one worker thread
    pub const MAX_BATCH_SIZE: usize = 64;
    pub const DEFAULT_TOKEN_SKEW: Duration = Duration::from_secs(10 * 60);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Window size for batched requests, clamped to `1..=MAX_BATCH_SIZE`
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.clamp(1, Self::MAX_BATCH_SIZE);
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.cache = cache;
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn token_skew(mut self, skew: Duration) -> Self {
        self.token_skew = skew;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn max_poll_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_poll_attempts = attempts;
        self
    }

    /// Effective window size, whatever was assigned to `batch_size`
    pub(crate) fn window_size(&self) -> usize {
        self.batch_size.clamp(1, Self::MAX_BATCH_SIZE)
    }

    /// Log level for chatty per-page traces
    pub(crate) fn trace_level(&self) -> log::Level {
        if self.debug {
            log::Level::Info
        } else {
            log::Level::Debug
        }
    }
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debug: false,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            cache: false,
            compress: false,
            token_skew: Self::DEFAULT_TOKEN_SKEW,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
            max_poll_attempts: None,
        }
    }
}

/// Connection settings for one CRM tenant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrmSettings {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// API host, e.g. https://www.zohoapis.com
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Accounts (token authority) host, e.g. https://accounts.zoho.com
    #[serde(default = "default_accounts_url")]
    pub accounts_url: String,
    /// Where the token blob lives (defaults to the config directory)
    #[serde(default)]
    pub token_path: Option<PathBuf>,
}

fn default_api_url() -> String {
    CrmSettings::DEFAULT_API_URL.to_string()
}

fn default_accounts_url() -> String {
    CrmSettings::DEFAULT_ACCOUNTS_URL.to_string()
}

impl CrmSettings {
    pub const DEFAULT_API_URL: &'static str = "https://www.zohoapis.com";
    pub const DEFAULT_ACCOUNTS_URL: &'static str = "https://accounts.zoho.com";

    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            api_url: default_api_url(),
            accounts_url: default_accounts_url(),
            token_path: None,
        }
    }

    /// Builder method to point at another data center or a test server
    pub fn with_urls(mut self, api_url: impl Into<String>, accounts_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self.accounts_url = accounts_url.into();
        self
    }

    /// Load settings from the config file, falling back to the environment
    pub fn load() -> Result<Self> {
        if config::config_exists(SETTINGS_FILE) {
            let settings: CrmSettings = config::load_json(SETTINGS_FILE)?;
            return Ok(settings);
        }

        Self::from_env()
    }

    /// Load settings from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        config::load_json_file(path)
    }

    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse CRM settings JSON")
    }

    /// Load settings from environment variables
    pub fn from_env() -> Result<Self> {
        let client_id =
            std::env::var("CRM_CLIENT_ID").context("CRM_CLIENT_ID environment variable not set")?;
        let client_secret = std::env::var("CRM_CLIENT_SECRET")
            .context("CRM_CLIENT_SECRET environment variable not set")?;

        let mut settings = Self::new(client_id, client_secret);
        if let Ok(api_url) = std::env::var("CRM_API_URL") {
            settings.api_url = api_url;
        }
        if let Ok(accounts_url) = std::env::var("CRM_ACCOUNTS_URL") {
            settings.accounts_url = accounts_url;
        }
        if let Ok(token_path) = std::env::var("CRM_TOKEN_PATH") {
            settings.token_path = Some(PathBuf::from(token_path));
        }
        Ok(settings)
    }

    /// Token blob location: explicit path, else ~/.config/crmsync/crm-tokens.json
    pub fn resolve_token_path(&self) -> Result<PathBuf> {
        match &self.token_path {
            Some(path) => Ok(path.clone()),
            None => config::config_path(TOKENS_FILE).context("Could not determine config directory"),
        }
    }

    /// Check if settings are available (file or env vars)
    pub fn is_available() -> bool {
        if config::config_exists(SETTINGS_FILE) {
            return true;
        }
        std::env::var("CRM_CLIENT_ID").is_ok() && std::env::var("CRM_CLIENT_SECRET").is_ok()
    }
}
