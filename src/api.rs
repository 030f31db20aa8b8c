/// Typed endpoint wrappers over the authenticated client
///
/// Every network-touching feature goes through these; no call site
/// hand-rolls auth or retry handling.

use crate::backend::{ApiRequest, ApiResponse, Backend};
use crate::cart::{CartLine, OrderRequest};
use crate::client::AuthenticatedClient;
use crate::error::{ClientError, Result};
use crate::models::{TokenPair, User, WireMessage};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

pub struct ServerApi<B: Backend> {
    client: Arc<AuthenticatedClient<B>>,
}

impl<B: Backend> Clone for ServerApi<B> {
    fn clone(&self) -> Self {
        ServerApi {
            client: self.client.clone(),
        }
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Deserialize)]
struct OrderResponse {
    pub order_id: i64,
}

fn expect_success(response: ApiResponse, what: &str) -> Result<serde_json::Value> {
    if response.is_success() {
        Ok(response.body)
    } else {
        Err(ClientError::Server(format!(
            "{} failed with status {}",
            what, response.status
        )))
    }
}

impl<B: Backend> ServerApi<B> {
    pub fn new(client: Arc<AuthenticatedClient<B>>) -> Self {
        ServerApi { client }
    }

    pub fn client(&self) -> &Arc<AuthenticatedClient<B>> {
        &self.client
    }

    /// Exchange credentials for a token pair. Does not persist the pair;
    /// that is the session gate's job.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair> {
        let req = ApiRequest::post(
            "/token",
            json!({ "username": username, "password": password }),
        );
        let response = self.client.call_anonymous(req).await?;

        match response.status {
            400 | 401 => Err(ClientError::InvalidCredentials),
            status if (200..300).contains(&status) => {
                let tokens: TokenResponse = serde_json::from_value(response.body)?;
                Ok(TokenPair {
                    access_token: tokens.access_token,
                    refresh_token: tokens.refresh_token,
                })
            }
            status => Err(ClientError::Server(format!(
                "Login failed with status {}",
                status
            ))),
        }
    }

    /// Register a new account. The caller follows up with a login using
    /// the same credentials.
    pub async fn signup(&self, username: &str, email: &str, password: &str) -> Result<()> {
        let req = ApiRequest::post(
            "/signup",
            json!({ "username": username, "email": email, "password": password }),
        );
        let response = self.client.call_anonymous(req).await?;

        match response.status {
            400 | 409 => Err(ClientError::InvalidCredentials),
            status if (200..300).contains(&status) => Ok(()),
            status => Err(ClientError::Server(format!(
                "Signup failed with status {}",
                status
            ))),
        }
    }

    /// Fetch the signed-in user's profile
    pub async fn fetch_profile(&self) -> Result<User> {
        let response = self.client.call(ApiRequest::get("/profile/me")).await?;
        let body = expect_success(response, "Profile fetch")?;
        let user: User = serde_json::from_value(body)?;
        Ok(user)
    }

    /// Fetch message history for a conversation, ordered oldest to newest
    pub async fn chat_history(&self, conversation_id: i64) -> Result<Vec<WireMessage>> {
        let path = format!("/chat/history/{}", conversation_id);
        let response = self.client.call(ApiRequest::get(path)).await?;
        let body = expect_success(response, "History fetch")?;
        let messages: Vec<WireMessage> = serde_json::from_value(body)?;
        Ok(messages)
    }

    /// Mark a batch of messages read for the current user
    pub async fn mark_read(&self, message_ids: &[i64]) -> Result<()> {
        if message_ids.is_empty() {
            return Ok(());
        }
        let req = ApiRequest::post("/chat/mark-read", json!({ "message_ids": message_ids }));
        let response = self.client.call(req).await?;
        expect_success(response, "Mark-read")?;
        Ok(())
    }

    /// Fetch the backend's authoritative cart for the signed-in user
    pub async fn fetch_cart(&self) -> Result<Vec<CartLine>> {
        let response = self.client.call(ApiRequest::get("/cart")).await?;
        let body = expect_success(response, "Cart fetch")?;
        let lines: Vec<CartLine> = serde_json::from_value(body)?;
        Ok(lines)
    }

    /// Place an order built by the cart ledger's checkout payload
    pub async fn place_order(&self, order: &OrderRequest) -> Result<i64> {
        let req = ApiRequest::post("/orders", serde_json::to_value(order)?);
        let response = self.client.call(req).await?;
        let body = expect_success(response, "Order placement")?;
        let placed: OrderResponse = serde_json::from_value(body)?;
        Ok(placed.order_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ApiResponse;

    #[test]
    fn test_expect_success_passes_body_through() {
        let response = ApiResponse {
            status: 200,
            body: json!({"id": 1}),
        };
        let body = expect_success(response, "Test").unwrap();
        assert_eq!(body["id"], 1);
    }

    #[test]
    fn test_expect_success_maps_error_status() {
        let response = ApiResponse {
            status: 503,
            body: serde_json::Value::Null,
        };
        let err = expect_success(response, "Test").unwrap_err();
        assert!(matches!(err, ClientError::Server(_)));
        assert!(err.to_string().contains("503"));
    }

    // Endpoint behavior against scripted backends is covered in
    // tests/client_tests.rs and tests/session_tests.rs.
}
