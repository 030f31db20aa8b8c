/// Application session state machine
///
/// SignedOut -> Loading -> SignedIn, with logout returning to SignedOut.
/// Every transition into SignedIn re-fetches the profile so the cached
/// copy never silently diverges from backend truth.

use crate::api::ServerApi;
use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::models::User;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    SignedOut,
    Loading,
    SignedIn(User),
}

pub struct SessionGate<B: Backend> {
    api: ServerApi<B>,
    state: Mutex<SessionState>,
}

impl<B: Backend> SessionGate<B> {
    pub fn new(api: ServerApi<B>) -> Self {
        SessionGate {
            api,
            state: Mutex::new(SessionState::SignedOut),
        }
    }

    pub fn api(&self) -> &ServerApi<B> {
        &self.api
    }

    /// Current state snapshot
    pub async fn state(&self) -> SessionState {
        self.state.lock().await.clone()
    }

    /// Resolve the session at process start using any persisted tokens.
    ///
    /// An expired session lands in SignedOut with the store cleared (the
    /// client cleared it during the failed refresh). Any other failure
    /// also lands in SignedOut but keeps the stored pair so a later
    /// `resolve` can retry; a flaky network must not sign the user out.
    pub async fn resolve(&self) -> Result<SessionState> {
        *self.state.lock().await = SessionState::Loading;

        if self.api.client().store().load().is_none() {
            log::debug!("No persisted tokens, starting signed out");
            let state = SessionState::SignedOut;
            *self.state.lock().await = state.clone();
            return Ok(state);
        }

        match self.api.fetch_profile().await {
            Ok(user) => {
                self.api.client().store().save_profile(&user)?;
                let state = SessionState::SignedIn(user);
                *self.state.lock().await = state.clone();
                Ok(state)
            }
            Err(ClientError::SessionExpired) => {
                log::info!("Persisted session expired, sign-in required");
                let state = SessionState::SignedOut;
                *self.state.lock().await = state.clone();
                Ok(state)
            }
            Err(e) => {
                log::warn!("Profile fetch failed, tokens preserved for retry: {}", e);
                *self.state.lock().await = SessionState::SignedOut;
                Err(e)
            }
        }
    }

    /// Exchange credentials for a session. On success the pair is
    /// persisted and the profile freshly fetched.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        let pair = self.api.login(username, password).await?;
        self.api.client().store().save(&pair)?;

        let user = self.api.fetch_profile().await?;
        self.api.client().store().save_profile(&user)?;

        *self.state.lock().await = SessionState::SignedIn(user.clone());
        log::info!("Signed in as {}", user.username);
        Ok(user)
    }

    /// Register, then behave as login with the same credentials
    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<User> {
        self.api.signup(username, email, password).await?;
        self.login(username, password).await
    }

    /// Clear all per-user local state and return to SignedOut; idempotent
    pub async fn logout(&self) -> Result<()> {
        self.api.client().store().clear()?;
        *self.state.lock().await = SessionState::SignedOut;
        log::info!("Signed out");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_equality() {
        assert_eq!(SessionState::SignedOut, SessionState::SignedOut);
        assert_ne!(SessionState::SignedOut, SessionState::Loading);
    }

    // Transition behavior runs against scripted backends in
    // tests/session_tests.rs.
}
