/// Dhaba Client Library
/// Backend-facing core for a food-ordering app: authenticated API client
/// with token refresh, session state machine, realtime chat session, and
/// cart ledger.

pub mod api;
pub mod backend;
pub mod cart;
pub mod chat;
pub mod cli;
pub mod client;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;
pub mod websocket;

pub use client::AuthenticatedClient;
pub use error::{ClientError, Result};
pub use session::{SessionGate, SessionState};
