/// Authenticated API client with refresh-and-retry-once token handling
///
/// Every logical call attaches the stored access token, and on an
/// unauthorized response performs exactly one refresh exchange before a
/// single retry. Refreshes are de-duplicated: concurrent callers that hit
/// a 401 while a refresh is in flight wait for it and reuse its result
/// instead of racing the provider with parallel exchanges.

use crate::backend::{ApiRequest, ApiResponse, Backend};
use crate::error::{ClientError, Result};
use crate::models::TokenPair;
use crate::storage::TokenStore;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct AuthenticatedClient<B: Backend> {
    backend: B,
    store: Arc<TokenStore>,
    refresh_lock: Mutex<()>,
}

/// Unauthorized is HTTP 401 or an explicit token-invalid payload marker.
/// Some backends answer 200 with an error code in the body.
fn is_unauthorized(response: &ApiResponse) -> bool {
    if response.status == 401 {
        return true;
    }
    response.body.get("code").and_then(|c| c.as_str()) == Some("token_not_valid")
}

impl<B: Backend> AuthenticatedClient<B> {
    pub fn new(backend: B, store: Arc<TokenStore>) -> Self {
        AuthenticatedClient {
            backend,
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Execute a request without touching stored tokens (login, signup,
    /// anything pre-authentication).
    pub async fn call_anonymous(&self, req: ApiRequest) -> Result<ApiResponse> {
        self.backend.execute(req).await
    }

    /// Execute one logical authenticated request.
    ///
    /// On an unauthorized response, refreshes the token pair once and
    /// retries once; the retried response is returned as-is unless it is
    /// again unauthorized, which ends the session. Transport errors
    /// surface as `Network` untouched; retry policy for those belongs to
    /// the caller.
    pub async fn call(&self, req: ApiRequest) -> Result<ApiResponse> {
        let access = self.store.load().map(|pair| pair.access_token);

        let mut attempt = req.clone();
        attempt.bearer = access.clone();
        let response = self.backend.execute(attempt).await?;

        if !is_unauthorized(&response) {
            return Ok(response);
        }

        log::debug!("Unauthorized on {}, attempting token refresh", req.path);
        let fresh_access = self.refresh(access).await?;

        let mut retry = req;
        retry.bearer = Some(fresh_access);
        let retried = self.backend.execute(retry).await?;

        if is_unauthorized(&retried) {
            log::info!("Retry still unauthorized, ending session");
            self.store.clear()?;
            return Err(ClientError::SessionExpired);
        }

        Ok(retried)
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// `stale_access` is the access token the caller just failed with.
    /// Holding the lock, a caller that finds the stored token already
    /// different from its stale one reuses the newer token; only one
    /// refresh request reaches the backend per expiry.
    async fn refresh(&self, stale_access: Option<String>) -> Result<String> {
        let _guard = self.refresh_lock.lock().await;

        let pair = match self.store.load() {
            Some(pair) => pair,
            None => {
                // Nothing to refresh with
                self.store.clear()?;
                return Err(ClientError::SessionExpired);
            }
        };

        if stale_access.as_deref() != Some(pair.access_token.as_str()) {
            log::debug!("Token already refreshed by a concurrent caller");
            return Ok(pair.access_token);
        }

        let req = ApiRequest::post(
            "/token/refresh",
            json!({ "refresh_token": pair.refresh_token }),
        );

        let response = match self.backend.execute(req).await {
            Ok(response) => response,
            Err(e) => {
                log::warn!("Refresh exchange failed: {}", e);
                self.store.clear()?;
                return Err(ClientError::SessionExpired);
            }
        };

        if !response.is_success() {
            log::info!("Refresh token rejected with status {}", response.status);
            self.store.clear()?;
            return Err(ClientError::SessionExpired);
        }

        let access_token = response
            .body
            .get("access_token")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ClientError::Server("Refresh response missing access_token".to_string()))?
            .to_string();

        // The provider may rotate the refresh token; keep the old one when
        // the response omits it.
        let refresh_token = response
            .body
            .get("refresh_token")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .unwrap_or(pair.refresh_token);

        let new_pair = TokenPair {
            access_token: access_token.clone(),
            refresh_token,
        };
        self.store.save(&new_pair)?;
        log::debug!("Token pair refreshed");

        Ok(access_token)
    }
}
