//! Data models and DTOs for the dhaba client

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Access/refresh token pair issued by the backend.
/// Both fields are persisted together or not at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Signed-in user profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
}

/// Delivery provenance of a chat message held in a session.
///
/// A message starts `Pending` when the local user submits it, becomes
/// `Committed` once the server echo carrying its correlation id arrives,
/// or `Failed` if the transport rejected the send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Pending,
    Committed,
    Failed,
}

/// One chat message as tracked by a [`crate::chat::ChatSession`].
#[derive(Debug, Clone)]
pub struct ChatMessage {
    /// Server-assigned id, present once committed.
    pub server_id: Option<i64>,
    /// Client-generated correlation id for messages this client sent.
    pub client_ref: Option<Uuid>,
    pub conversation_id: i64,
    pub sender_id: i64,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    pub read_by: HashSet<i64>,
    pub delivery: Delivery,
}

impl ChatMessage {
    /// Build the committed form of a wire message.
    pub fn committed(conversation_id: i64, wire: WireMessage) -> Self {
        ChatMessage {
            server_id: Some(wire.id),
            client_ref: wire.client_ref,
            conversation_id,
            sender_id: wire.sender_id,
            body: wire.body,
            sent_at: wire.sent_at,
            read_by: wire.read_by.into_iter().collect(),
            delivery: Delivery::Committed,
        }
    }
}

/// Message payload as it appears on the wire (history and live channel).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: i64,
    pub sender_id: i64,
    pub body: String,
    pub sent_at: DateTime<Utc>,
    /// Echoed back by the server when the sender supplied one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<Uuid>,
    #[serde(default)]
    pub read_by: Vec<i64>,
}

/// Envelope discriminator for events arriving on the realtime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    /// A committed message, either a peer's or the echo of our own send
    #[serde(rename = "message")]
    Message(WireMessage),
    /// Typing-indicator toggle for one participant
    #[serde(rename = "typing")]
    Typing { user_id: i64, is_typing: bool },
    /// Read receipt for a single message
    #[serde(rename = "read")]
    Read { message_id: i64, user_id: i64 },
}

/// Frames this client sends over the realtime channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundFrame {
    #[serde(rename = "message")]
    Message { body: String, client_ref: Uuid },
    #[serde(rename = "typing")]
    Typing { is_typing: bool },
}

/// Command types for the CLI
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Login(String),
    Logout,
    Cart,
    Checkout,
    Chat(i64),
    Message(String),
    Quit,
}

impl Command {
    /// Parse a command string
    pub fn parse(input: &str) -> Result<Self, String> {
        let input = input.trim();

        if input == "/quit" || input == "/exit" {
            return Ok(Command::Quit);
        }

        if input == "/logout" {
            return Ok(Command::Logout);
        }

        if input == "/cart" {
            return Ok(Command::Cart);
        }

        if input == "/checkout" {
            return Ok(Command::Checkout);
        }

        if let Some(username) = input.strip_prefix("/login ") {
            if username.is_empty() {
                return Err("Usage: /login <username>".to_string());
            }
            return Ok(Command::Login(username.to_string()));
        }

        if let Some(conversation) = input.strip_prefix("/chat ") {
            let id = conversation
                .trim()
                .parse::<i64>()
                .map_err(|_| "Usage: /chat <conversation-id>".to_string())?;
            return Ok(Command::Chat(id));
        }

        if input.starts_with('/') {
            return Err(format!("Unknown command: {}", input));
        }

        Ok(Command::Message(input.to_string()))
    }
}
