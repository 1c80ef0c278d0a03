//! # OAuth Token Cache
//!
//! In-memory cache for the Daraja OAuth access token.
//!
//! Daraja tokens live ~3599 seconds. The cache treats a token as stale
//! 60 seconds before its actual expiry so a token never dies mid-flight
//! between our check and the gateway's.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

/// Margin before expiry at which a cached token stops being served.
const EXPIRY_MARGIN_SECS: u64 = 60;

/// Fallback lifetime when the gateway omits `expires_in`.
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 3599;

/// A cached OAuth access token.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub token: String,
    /// When the token expires (local monotonic time).
    pub expires_at: Instant,
}

impl AccessToken {
    /// Creates a token valid for `lifetime_secs` from now.
    pub fn new(token: impl Into<String>, lifetime_secs: u64) -> Self {
        AccessToken {
            token: token.into(),
            expires_at: Instant::now() + Duration::from_secs(lifetime_secs),
        }
    }

    /// Still safely usable (expiry at least the margin away).
    pub fn is_fresh(&self) -> bool {
        Instant::now() + Duration::from_secs(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

/// Shared token cache.
///
/// Cloning is cheap; all clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct TokenCache {
    slot: Arc<RwLock<Option<AccessToken>>>,
}

impl TokenCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        TokenCache::default()
    }

    /// Returns the cached token if it is still fresh.
    pub async fn fresh(&self) -> Option<String> {
        let guard = self.slot.read().await;
        guard
            .as_ref()
            .filter(|t| t.is_fresh())
            .map(|t| t.token.clone())
    }

    /// Stores a freshly acquired token.
    pub async fn store(&self, token: AccessToken) {
        debug!("Caching gateway access token");
        *self.slot.write().await = Some(token);
    }

    /// Drops the cached token (e.g. after a 401 from the gateway).
    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
