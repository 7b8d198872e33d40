//! Shared credential cache with single-writer refresh

use chrono::Duration;
use log::{debug, info, warn};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{Credential, StoredTokens, TokenAuthority, TokenStore};
use crate::clock::Clock;
use crate::error::{CrmError, Result};

/// Holds the current credential and refreshes it when due
///
/// One instance is shared by reference between every operation of a tenant.
/// Readers take the cached value under a read lock; refreshes run one at a
/// time behind `refresh_lock` and re-check freshness after acquiring it, so
/// concurrent callers on an expired token cause a single authority call.
pub struct CredentialManager {
    store: Arc<dyn TokenStore>,
    authority: Arc<dyn TokenAuthority>,
    clock: Arc<dyn Clock>,
    skew: Duration,
    current: RwLock<Option<Arc<Credential>>>,
    refresh_lock: Mutex<()>,
}

impl CredentialManager {
    pub fn new(
        store: Arc<dyn TokenStore>,
        authority: Arc<dyn TokenAuthority>,
        clock: Arc<dyn Clock>,
        skew: std::time::Duration,
    ) -> Self {
        Self {
            store,
            authority,
            clock,
            skew: Duration::from_std(skew).unwrap_or_else(|_| Duration::minutes(10)),
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    /// Get a usable credential, refreshing it if it is within the skew of expiry
    ///
    /// With `force_regenerate`, a due refresh always mints a new access token
    /// from the stored refresh token instead of adopting a still-valid token
    /// another process may have stored. Used before long-lived bulk jobs.
    pub fn ensure_valid(&self, force_regenerate: bool) -> Result<Arc<Credential>> {
        if let Some(credential) = self.fresh_cached() {
            return Ok(credential);
        }

        let _guard = self.refresh_lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Another caller may have refreshed while we waited
        if let Some(credential) = self.fresh_cached() {
            return Ok(credential);
        }

        self.regenerate(force_regenerate)
    }

    /// Time left on the cached credential, if any
    pub fn expiry_window(&self) -> Option<Duration> {
        self.cached().map(|c| c.remaining(self.clock.now()))
    }

    /// Human-readable expiry window for diagnostics
    pub fn describe_expiry(&self) -> String {
        match self.cached() {
            Some(c) => format!(
                "token expires at {} ({}s from now)",
                c.expires_at.to_rfc3339(),
                c.remaining(self.clock.now()).num_seconds()
            ),
            None => "no cached token".to_string(),
        }
    }

    fn cached(&self) -> Option<Arc<Credential>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn fresh_cached(&self) -> Option<Arc<Credential>> {
        self.cached()
            .filter(|c| c.is_fresh(self.clock.now(), self.skew))
    }

    fn install(&self, credential: Credential) -> Arc<Credential> {
        let credential = Arc::new(credential);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        credential
    }

    fn load_stored(&self) -> Result<Option<StoredTokens>> {
        let blob = self
            .store
            .get_tokens()
            .map_err(|e| CrmError::auth(format!("Failed to read token store: {}", e)))?;
        blob.as_deref().map(StoredTokens::parse).transpose()
    }

    /// Must be called with `refresh_lock` held
    fn regenerate(&self, force_regenerate: bool) -> Result<Arc<Credential>> {
        let stored = self.load_stored()?;

        if !force_regenerate
            && let Some(credential) = stored.as_ref().and_then(StoredTokens::credential)
            && credential.is_fresh(self.clock.now(), self.skew)
        {
            debug!("[AUTH] Adopting stored access token (expires {})", credential.expires_at);
            return Ok(self.install(credential));
        }

        let refresh_token = match (&stored, self.cached()) {
            (Some(stored), _) => stored.refresh_token.clone(),
            (None, Some(cached)) => cached.refresh_token.clone(),
            (None, None) => {
                return Err(CrmError::auth(
                    "no stored credential; the token store must be bootstrapped first",
                ));
            }
        };

        info!(
            "[AUTH] Refreshing access token{}",
            if force_regenerate { " (forced)" } else { "" }
        );
        let grant = self.authority.refresh(&refresh_token).map_err(|e| match e {
            CrmError::Auth(_) => e,
            other => CrmError::auth(format!("token refresh failed: {}", other)),
        })?;

        let credential = Credential::issue(&grant, &refresh_token, self.clock.now());
        let blob = StoredTokens::from_credential(&credential, grant.lifetime_secs()).to_json()?;
        if let Err(e) = self.store.set_tokens(&blob) {
            warn!("[AUTH] Refreshed token could not be persisted: {}", e);
            return Err(CrmError::auth(format!("Failed to persist refreshed token: {}", e)));
        }

        Ok(self.install(credential))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, TokenGrant};
    use crate::clock::manual::ManualClock;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Authority that counts calls and hands out numbered tokens
    struct CountingAuthority {
        calls: AtomicUsize,
        fail: bool,
        delay: std::time::Duration,
    }

    impl CountingAuthority {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail: false,
                delay: std::time::Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TokenAuthority for CountingAuthority {
        fn refresh(&self, _refresh_token: &str) -> Result<TokenGrant> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(CrmError::Transport("connection reset".to_string()));
            }
            Ok(TokenGrant {
                access_token: format!("access-{}", n),
                refresh_token: None,
                expires_in: Some(3600),
                expires_in_sec: None,
                api_domain: None,
            })
        }
    }

    fn start() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn expired_blob() -> String {
        let expired = start() - Duration::hours(1);
        format!(
            r#"{{"access_token":"old","expires_in":3600,"refresh_token":"1000.refresh","expires_at":{}}}"#,
            expired.timestamp_millis()
        )
    }

    fn manager(
        store: Arc<MemoryTokenStore>,
        authority: Arc<CountingAuthority>,
        clock: Arc<ManualClock>,
    ) -> CredentialManager {
        CredentialManager::new(store, authority, clock, std::time::Duration::from_secs(600))
    }

    #[test]
    fn test_expired_token_is_refreshed_and_persisted() {
        let store = Arc::new(MemoryTokenStore::with_blob(expired_blob()));
        let authority = Arc::new(CountingAuthority::new());
        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager(store.clone(), authority.clone(), clock);

        let cred = manager.ensure_valid(false).unwrap();
        assert_eq!(cred.access_token, "access-1");
        assert_eq!(cred.refresh_token, "1000.refresh");
        assert_eq!(cred.expires_at, start() + Duration::hours(1));
        assert_eq!(authority.calls(), 1);

        let persisted = StoredTokens::parse(&store.get_tokens().unwrap().unwrap()).unwrap();
        assert_eq!(persisted.access_token, "access-1");
        assert_eq!(persisted.refresh_token, "1000.refresh");
        assert_eq!(persisted.expires_in, 3600);

        // Cached now: no further calls
        manager.ensure_valid(false).unwrap();
        assert_eq!(authority.calls(), 1);
    }

    #[test]
    fn test_refresh_happens_inside_skew() {
        let store = Arc::new(MemoryTokenStore::with_blob(expired_blob()));
        let authority = Arc::new(CountingAuthority::new());
        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager(store, authority.clone(), clock.clone());

        manager.ensure_valid(false).unwrap();
        clock.advance(Duration::minutes(49));
        assert_eq!(manager.ensure_valid(false).unwrap().access_token, "access-1");

        clock.advance(Duration::minutes(2));
        assert_eq!(manager.ensure_valid(false).unwrap().access_token, "access-2");
        assert_eq!(authority.calls(), 2);
    }

    #[test]
    fn test_fresh_stored_token_is_adopted_unless_forced() {
        let expires = start() + Duration::hours(1);
        let blob = format!(
            r#"{{"access_token":"stored","expires_in":3600,"refresh_token":"r","expires_at":{}}}"#,
            expires.timestamp_millis()
        );
        let authority = Arc::new(CountingAuthority::new());
        let clock = Arc::new(ManualClock::new(start()));

        let lazy = manager(
            Arc::new(MemoryTokenStore::with_blob(blob.clone())),
            authority.clone(),
            clock.clone(),
        );
        assert_eq!(lazy.ensure_valid(false).unwrap().access_token, "stored");
        assert_eq!(authority.calls(), 0);

        let forced = manager(Arc::new(MemoryTokenStore::with_blob(blob)), authority.clone(), clock);
        assert_eq!(forced.ensure_valid(true).unwrap().access_token, "access-1");
        assert_eq!(authority.calls(), 1);
    }

    #[test]
    fn test_failed_refresh_leaves_cache_unchanged() {
        let store = Arc::new(MemoryTokenStore::with_blob(expired_blob()));
        let good = Arc::new(CountingAuthority::new());
        let clock = Arc::new(ManualClock::new(start()));
        let manager = CredentialManager::new(
            store.clone(),
            good,
            clock.clone(),
            std::time::Duration::from_secs(600),
        );
        let first = manager.ensure_valid(false).unwrap();

        // Same cache, failing authority
        let failing = Arc::new(CountingAuthority {
            fail: true,
            ..CountingAuthority::new()
        });
        let manager = CredentialManager {
            authority: failing,
            ..manager
        };
        clock.advance(Duration::hours(2));

        let err = manager.ensure_valid(false).unwrap_err();
        assert!(err.is_auth());
        assert_eq!(manager.cached().unwrap(), first);
        let persisted = StoredTokens::parse(&store.get_tokens().unwrap().unwrap()).unwrap();
        assert_eq!(persisted.access_token, first.access_token);
    }

    #[test]
    fn test_missing_store_is_auth_error() {
        let manager = manager(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(CountingAuthority::new()),
            Arc::new(ManualClock::new(start())),
        );
        assert!(manager.ensure_valid(false).unwrap_err().is_auth());
    }

    #[test]
    fn test_corrupt_store_fails_loudly() {
        let manager = manager(
            Arc::new(MemoryTokenStore::with_blob(r#"{"access_token":"a","refresh_token":"r"}"#)),
            Arc::new(CountingAuthority::new()),
            Arc::new(ManualClock::new(start())),
        );
        let err = manager.ensure_valid(false).unwrap_err();
        assert!(err.to_string().contains("expires_in"));
    }

    #[test]
    fn test_concurrent_callers_share_one_refresh() {
        let store = Arc::new(MemoryTokenStore::with_blob(expired_blob()));
        let authority = Arc::new(CountingAuthority {
            delay: std::time::Duration::from_millis(50),
            ..CountingAuthority::new()
        });
        let clock = Arc::new(ManualClock::new(start()));
        let manager = manager(store, authority.clone(), clock);

        let tokens: Vec<String> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..10)
                .map(|_| s.spawn(|| manager.ensure_valid(false).unwrap().access_token.clone()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(authority.calls(), 1);
        assert!(tokens.iter().all(|t| t == "access-1"));
    }

    #[test]
    fn test_describe_expiry() {
        let manager = manager(
            Arc::new(MemoryTokenStore::with_blob(expired_blob())),
            Arc::new(CountingAuthority::new()),
            Arc::new(ManualClock::new(start())),
        );
        assert_eq!(manager.describe_expiry(), "no cached token");
        manager.ensure_valid(false).unwrap();
        assert!(manager.describe_expiry().contains("3600s from now"));
        assert_eq!(manager.expiry_window(), Some(Duration::hours(1)));
    }
}
