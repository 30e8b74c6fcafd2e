//! Vendor access tokens.
//!
//! One current token is shared process-wide through [`TokenStore`]. Many
//! poll tasks read it; only [`TokenManager::refresh`] writes it.

mod iopgps;
mod persistence;

pub use iopgps::{signature, IopgpsTokenIssuer};
pub use persistence::{FileTokenPersistence, NoopTokenPersistence};

use crate::errors::AuthError;
use crate::ports::{TokenIssuer, TokenPersistence};
use crate::utils::now_unix;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Token lifetime granted by the vendor.
pub const TOKEN_LIFETIME_SECONDS: i64 = 2 * 3600;

/// Renew this long before the token expires.
pub const TOKEN_REFRESH_MARGIN_SECONDS: i64 = 20 * 60;

/// A bearer token and the time it was issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The token value.
    pub value: String,
    /// Issue time, unix seconds.
    pub issued_at: i64,
}

impl AccessToken {
    /// Creates a token.
    #[must_use]
    pub fn new(value: impl Into<String>, issued_at: i64) -> Self {
        Self {
            value: value.into(),
            issued_at,
        }
    }

    /// Returns true while the token is usable without renewal.
    #[must_use]
    pub fn is_fresh(&self, now: i64, lifetime_seconds: i64, margin_seconds: i64) -> bool {
        !self.value.is_empty() && now < self.issued_at + lifetime_seconds - margin_seconds
    }
}

/// Holder of the current token.
#[derive(Debug, Default)]
pub struct TokenStore {
    current: RwLock<Option<AccessToken>>,
}

impl TokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `token`.
    #[must_use]
    pub fn with_token(token: AccessToken) -> Self {
        Self {
            current: RwLock::new(Some(token)),
        }
    }

    /// Returns the current token value, if any.
    #[must_use]
    pub fn value(&self) -> Option<String> {
        self.current.read().as_ref().map(|t| t.value.clone())
    }

    /// Returns the current token.
    #[must_use]
    pub fn get(&self) -> Option<AccessToken> {
        self.current.read().clone()
    }

    /// Replaces the current token.
    pub fn set(&self, token: AccessToken) {
        *self.current.write() = Some(token);
    }
}

/// Outcome of a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRefresh {
    /// The current token was still fresh.
    Reused,
    /// A new token was issued.
    Renewed,
}

/// Keeps the token store fresh.
pub struct TokenManager {
    store: Arc<TokenStore>,
    issuer: Arc<dyn TokenIssuer>,
    persistence: Arc<dyn TokenPersistence>,
    lifetime_seconds: i64,
    margin_seconds: i64,
}

impl TokenManager {
    /// Creates a manager with the vendor's default lifetime and margin.
    #[must_use]
    pub fn new(
        store: Arc<TokenStore>,
        issuer: Arc<dyn TokenIssuer>,
        persistence: Arc<dyn TokenPersistence>,
    ) -> Self {
        Self {
            store,
            issuer,
            persistence,
            lifetime_seconds: TOKEN_LIFETIME_SECONDS,
            margin_seconds: TOKEN_REFRESH_MARGIN_SECONDS,
        }
    }

    /// Overrides the lifetime and margin.
    #[must_use]
    pub fn with_lifetime(mut self, lifetime_seconds: i64, margin_seconds: i64) -> Self {
        self.lifetime_seconds = lifetime_seconds;
        self.margin_seconds = margin_seconds;
        self
    }

    /// Returns the shared store.
    #[must_use]
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Loads a persisted token into the store if it is still fresh.
    ///
    /// Returns true if a token was loaded.
    pub async fn load_persisted(&self) -> bool {
        match self.persistence.load().await {
            Ok(Some(token)) if token.is_fresh(now_unix(), self.lifetime_seconds, self.margin_seconds) => {
                tracing::info!(issued_at = token.issued_at, "Loaded persisted access token");
                self.store.set(token);
                true
            }
            Ok(_) => false,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted access token");
                false
            }
        }
    }

    /// Renews the token unless the current one is still fresh at `now`.
    ///
    /// On failure the previous token stays in place.
    pub async fn refresh_at(&self, now: i64) -> Result<TokenRefresh, AuthError> {
        if let Some(current) = self.store.get() {
            if current.is_fresh(now, self.lifetime_seconds, self.margin_seconds) {
                tracing::debug!(issued_at = current.issued_at, "Access token still fresh");
                return Ok(TokenRefresh::Reused);
            }
        }

        let token = match self.issuer.issue().await {
            Ok(token) => token,
            Err(e) => {
                tracing::error!(error = %e, "Token refresh failed, keeping previous token");
                return Err(e);
            }
        };

        self.store.set(token.clone());
        tracing::info!(issued_at = token.issued_at, "Access token renewed");

        if let Err(e) = self.persistence.save(&token).await {
            tracing::warn!(error = %e, "Failed to persist access token");
        }

        Ok(TokenRefresh::Renewed)
    }

    /// Renews the token unless the current one is still fresh.
    pub async fn refresh(&self) -> Result<TokenRefresh, AuthError> {
        self.refresh_at(now_unix()).await
    }
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("has_token", &self.store.get().is_some())
            .field("lifetime_seconds", &self.lifetime_seconds)
            .field("margin_seconds", &self.margin_seconds)
            .finish_non_exhaustive()
    }
}
