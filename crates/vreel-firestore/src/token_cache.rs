//! Access-token caching for Firestore authentication.
//!
//! Tokens are refreshed a minute before they expire. Refresh is single-flight
//! behind a write lock, and a failed refresh keeps serving the old token while
//! it is still technically valid.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use gcp_auth::TokenProvider;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::{FirestoreError, FirestoreResult};

/// Refresh this long before expiry.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Assumed lifetime when the provider reports none.
const FALLBACK_TTL: Duration = Duration::from_secs(50 * 60);

/// OAuth scope for the Firestore REST API.
pub const FIRESTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";

pub struct CachedToken {
    value: String,
    expires_at: Instant,
}

impl CachedToken {
    fn fresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN < self.expires_at
    }

    fn usable(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Where bearer tokens come from.
pub enum TokenSource {
    /// Service-account tokens, cached.
    ServiceAccount {
        provider: Arc<dyn TokenProvider>,
        cache: RwLock<Option<CachedToken>>,
    },
    /// A fixed token (the emulator accepts `owner`).
    Static(String),
}

impl TokenSource {
    pub fn service_account(provider: Arc<dyn TokenProvider>) -> Self {
        Self::ServiceAccount {
            provider,
            cache: RwLock::new(None),
        }
    }

    /// Drop the cached token so the next call refreshes.
    pub async fn invalidate(&self) {
        if let Self::ServiceAccount { cache, .. } = self {
            *cache.write().await = None;
        }
    }

    /// Current bearer token.
    pub async fn token(&self) -> FirestoreResult<String> {
        let (provider, cache) = match self {
            Self::Static(token) => return Ok(token.clone()),
            Self::ServiceAccount { provider, cache } => (provider, cache),
        };

        if let Some(cached) = cache.read().await.as_ref().filter(|c| c.fresh()) {
            return Ok(cached.value.clone());
        }

        let mut guard = cache.write().await;
        // Another task may have refreshed while we waited for the lock.
        if let Some(cached) = guard.as_ref().filter(|c| c.fresh()) {
            return Ok(cached.value.clone());
        }

        match provider.token(&[FIRESTORE_SCOPE]).await {
            Ok(token) => {
                let remaining = (token.expires_at() - Utc::now())
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                let ttl = if remaining.is_zero() { FALLBACK_TTL } else { remaining };
                let value = token.as_str().to_string();
                *guard = Some(CachedToken {
                    value: value.clone(),
                    expires_at: Instant::now() + ttl,
                });
                debug!(ttl_secs = ttl.as_secs(), "Refreshed Firestore token");
                Ok(value)
            }
            Err(e) => match guard.as_ref().filter(|c| c.usable()) {
                Some(cached) => {
                    warn!(error = %e, "Token refresh failed, reusing current token");
                    Ok(cached.value.clone())
                }
                None => Err(FirestoreError::auth_error(format!(
                    "Failed to obtain auth token: {}",
                    e
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let source = TokenSource::Static("owner".into());
        assert_eq!(source.token().await.unwrap(), "owner");
        source.invalidate().await;
        assert_eq!(source.token().await.unwrap(), "owner");
    }

    #[test]
    fn test_cached_token_margin() {
        let token = CachedToken {
            value: "t".into(),
            expires_at: Instant::now() + Duration::from_secs(30),
        };
        assert!(!token.fresh());
        assert!(token.usable());
    }
}
