//! Shared test fixtures: a scripted HTTP backend and a scripted chat
//! transport, so the refresh/session/chat state machines run without a
//! live server.
#![allow(dead_code)]

use async_trait::async_trait;
use dhaba_client::backend::{ApiRequest, ApiResponse, Backend, Method};
use dhaba_client::error::{ClientError, Result};
use dhaba_client::models::{ChatEvent, OutboundFrame, WireMessage};
use dhaba_client::websocket::ChatTransport;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Mutex;

pub const USERNAME: &str = "ayesha";
pub const PASSWORD: &str = "secret";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Issue a fresh pair on each refresh
    Issue,
    /// Refresh endpoint rejects the refresh token
    Reject,
    /// Refresh endpoint is unreachable
    NetworkFail,
}

/// Scripted backend. Protected endpoints accept exactly the token held in
/// `valid_access`; everything else is a 401. Refresh behavior and call
/// counts are programmable so tests can assert the retry/de-duplication
/// properties.
pub struct FakeBackend {
    pub valid_access: Mutex<String>,
    pub refresh_mode: StdMutex<RefreshMode>,
    pub refresh_calls: AtomicU64,
    pub protected_calls: AtomicU64,
    /// Rotated refresh token included in refresh responses when set
    pub rotated_refresh: Option<String>,
    pub history: Vec<WireMessage>,
    pub mark_read_batches: StdMutex<Vec<Vec<i64>>>,
    /// Order payloads received on the orders endpoint
    pub orders: StdMutex<Vec<Value>>,
    /// Fail every protected call at the transport level
    pub network_down: StdMutex<bool>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        FakeBackend {
            valid_access: Mutex::new("access-0".to_string()),
            refresh_mode: StdMutex::new(RefreshMode::Issue),
            refresh_calls: AtomicU64::new(0),
            protected_calls: AtomicU64::new(0),
            rotated_refresh: None,
            history: Vec::new(),
            mark_read_batches: StdMutex::new(Vec::new()),
            orders: StdMutex::new(Vec::new()),
            network_down: StdMutex::new(false),
        }
    }
}

impl FakeBackend {
    pub fn profile_body() -> Value {
        json!({
            "id": 7,
            "username": USERNAME,
            "email": "ayesha@example.com",
            "bio": "late night biryani"
        })
    }

    pub fn set_refresh_mode(&self, mode: RefreshMode) {
        *self.refresh_mode.lock().unwrap() = mode;
    }

    pub fn set_network_down(&self, down: bool) {
        *self.network_down.lock().unwrap() = down;
    }

    async fn handle_refresh(&self, body: &Value) -> Result<ApiResponse> {
        let calls = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let mode = *self.refresh_mode.lock().unwrap();

        match mode {
            RefreshMode::NetworkFail => {
                Err(ClientError::Network("refresh endpoint unreachable".to_string()))
            }
            RefreshMode::Reject => Ok(ApiResponse {
                status: 401,
                body: json!({"code": "token_not_valid"}),
            }),
            RefreshMode::Issue => {
                assert!(
                    body.get("refresh_token").and_then(|v| v.as_str()).is_some(),
                    "refresh request must carry the refresh token"
                );
                let fresh = format!("access-{}", calls);
                *self.valid_access.lock().await = fresh.clone();

                let mut response = json!({ "access_token": fresh });
                if let Some(rotated) = &self.rotated_refresh {
                    response["refresh_token"] = json!(rotated);
                }
                Ok(ApiResponse { status: 200, body: response })
            }
        }
    }

    async fn handle_protected(&self, req: &ApiRequest) -> Result<ApiResponse> {
        if *self.network_down.lock().unwrap() {
            return Err(ClientError::Network("connection refused".to_string()));
        }

        self.protected_calls.fetch_add(1, Ordering::SeqCst);
        // Widen the window so concurrent callers all observe the stale
        // token before any refresh completes
        tokio::time::sleep(Duration::from_millis(2)).await;

        let valid = self.valid_access.lock().await.clone();
        if req.bearer.as_deref() != Some(valid.as_str()) {
            return Ok(ApiResponse {
                status: 401,
                body: json!({"code": "token_not_valid"}),
            });
        }

        let body = match (req.method, req.path.as_str()) {
            (Method::Get, "/profile/me") => Self::profile_body(),
            (Method::Get, path) if path.starts_with("/chat/history/") => {
                serde_json::to_value(&self.history).unwrap()
            }
            (Method::Post, "/chat/mark-read") => {
                let ids: Vec<i64> = req.body.as_ref().unwrap()["message_ids"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .map(|v| v.as_i64().unwrap())
                    .collect();
                self.mark_read_batches.lock().unwrap().push(ids);
                json!({"ok": true})
            }
            (Method::Get, "/cart") => json!([]),
            (Method::Post, "/orders") => {
                self.orders
                    .lock()
                    .unwrap()
                    .push(req.body.clone().unwrap_or(Value::Null));
                json!({"order_id": 55})
            }
            _ => return Ok(ApiResponse { status: 404, body: Value::Null }),
        };

        Ok(ApiResponse { status: 200, body })
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn execute(&self, req: ApiRequest) -> Result<ApiResponse> {
        match (req.method, req.path.as_str()) {
            (Method::Post, "/token/refresh") => {
                self.handle_refresh(req.body.as_ref().unwrap_or(&Value::Null)).await
            }
            (Method::Post, "/token") => {
                let body = req.body.as_ref().unwrap();
                if body["username"] == USERNAME && body["password"] == PASSWORD {
                    let access = "access-login".to_string();
                    *self.valid_access.lock().await = access.clone();
                    Ok(ApiResponse {
                        status: 200,
                        body: json!({
                            "access_token": access,
                            "refresh_token": "refresh-login"
                        }),
                    })
                } else {
                    Ok(ApiResponse { status: 401, body: Value::Null })
                }
            }
            (Method::Post, "/signup") => Ok(ApiResponse {
                status: 201,
                body: json!({"ok": true}),
            }),
            _ => self.handle_protected(&req).await,
        }
    }
}

/// Scripted chat transport: pops pre-loaded incoming events, records sent
/// frames for inspection, and optionally fails sends.
pub struct FakeTransport {
    incoming: VecDeque<ChatEvent>,
    pub sent: Arc<StdMutex<Vec<OutboundFrame>>>,
    pub fail_sends: bool,
    pub closed: Arc<StdMutex<bool>>,
}

impl FakeTransport {
    pub fn new(incoming: Vec<ChatEvent>) -> Self {
        FakeTransport {
            incoming: incoming.into(),
            sent: Arc::new(StdMutex::new(Vec::new())),
            fail_sends: false,
            closed: Arc::new(StdMutex::new(false)),
        }
    }
}

#[async_trait]
impl ChatTransport for FakeTransport {
    async fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        if self.fail_sends {
            return Err(ClientError::WebSocket("send failed".to_string()));
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChatEvent>> {
        Ok(self.incoming.pop_front())
    }

    fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }
}

/// A wire message as the server would deliver it
pub fn wire(id: i64, sender_id: i64, body: &str, read_by: Vec<i64>) -> WireMessage {
    WireMessage {
        id,
        sender_id,
        body: body.to_string(),
        sent_at: chrono::Utc::now(),
        client_ref: None,
        read_by,
    }
}
