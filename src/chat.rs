/// Realtime chat session for one conversation
///
/// Holds the ordered message sequence, the set of participants currently
/// typing, and the channel connection state. Outbound messages are echoed
/// locally before server acknowledgment and reconciled against the
/// committed echo by client-generated correlation id, so a user sending
/// the same text twice still ends up with two distinct messages.

use crate::api::ServerApi;
use crate::backend::Backend;
use crate::error::{ClientError, Result};
use crate::models::{ChatEvent, ChatMessage, Delivery, OutboundFrame, WireMessage};
use crate::websocket::ChatTransport;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connection {
    Connected,
    Disconnected,
}

pub struct ChatSession<B: Backend, T: ChatTransport> {
    api: Arc<ServerApi<B>>,
    conversation_id: i64,
    current_user: i64,
    messages: Vec<ChatMessage>,
    typing: HashSet<i64>,
    transport: Option<T>,
}

impl<B: Backend, T: ChatTransport> ChatSession<B, T> {
    /// Open a session: fetch history, connect the realtime channel, and
    /// batch-mark any unread history entries as read.
    ///
    /// `connect` receives the current access token for use as the channel
    /// handshake auth parameter. History failures propagate as-is;
    /// handshake failures surface as `ChatUnavailable` from the transport.
    pub async fn open<F, Fut>(
        api: Arc<ServerApi<B>>,
        conversation_id: i64,
        current_user: i64,
        connect: F,
    ) -> Result<Self>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let history = api.chat_history(conversation_id).await?;

        let access_token = api
            .client()
            .store()
            .load()
            .map(|pair| pair.access_token)
            .unwrap_or_default();
        let transport = connect(access_token).await?;

        let mut messages: Vec<ChatMessage> = history
            .into_iter()
            .map(|wire| ChatMessage::committed(conversation_id, wire))
            .collect();

        let unread: Vec<i64> = messages
            .iter()
            .filter(|m| !m.read_by.contains(&current_user))
            .filter_map(|m| m.server_id)
            .collect();

        if !unread.is_empty() {
            log::debug!(
                "Marking {} history messages read in conversation {}",
                unread.len(),
                conversation_id
            );
            api.mark_read(&unread).await?;
            for message in &mut messages {
                message.read_by.insert(current_user);
            }
        }

        Ok(ChatSession {
            api,
            conversation_id,
            current_user,
            messages,
            typing: HashSet::new(),
            transport: Some(transport),
        })
    }

    pub fn conversation_id(&self) -> i64 {
        self.conversation_id
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn typing_users(&self) -> &HashSet<i64> {
        &self.typing
    }

    pub fn connection(&self) -> Connection {
        if self.transport.is_some() {
            Connection::Connected
        } else {
            Connection::Disconnected
        }
    }

    /// Send a message with optimistic local echo.
    ///
    /// The pending message appears in the sequence immediately; a
    /// transport failure flags it `Failed` rather than dropping it.
    /// Returns the correlation id assigned to the send attempt.
    pub async fn send(&mut self, body: &str) -> Result<Uuid> {
        if body.trim().is_empty() {
            return Err(ClientError::Validation("Message body is empty".to_string()));
        }

        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| ClientError::State("Chat session is closed".to_string()))?;

        let client_ref = Uuid::new_v4();
        let mut read_by = HashSet::new();
        read_by.insert(self.current_user);

        self.messages.push(ChatMessage {
            server_id: None,
            client_ref: Some(client_ref),
            conversation_id: self.conversation_id,
            sender_id: self.current_user,
            body: body.to_string(),
            sent_at: chrono::Utc::now(),
            read_by,
            delivery: Delivery::Pending,
        });

        let frame = OutboundFrame::Message {
            body: body.to_string(),
            client_ref,
        };

        if let Err(e) = transport.send(frame).await {
            log::warn!("Send failed for {}: {}", client_ref, e);
            self.flag_failed(client_ref);
            return Err(e);
        }

        Ok(client_ref)
    }

    /// Broadcast this user's typing indicator
    pub async fn set_typing(&mut self, is_typing: bool) -> Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| ClientError::State("Chat session is closed".to_string()))?;
        transport.send(OutboundFrame::Typing { is_typing }).await
    }

    /// Apply one incoming event. Events are applied in arrival order.
    pub fn on_incoming(&mut self, event: ChatEvent) {
        match event {
            ChatEvent::Message(wire) => self.apply_message(wire),
            ChatEvent::Typing { user_id, is_typing } => {
                if is_typing {
                    self.typing.insert(user_id);
                } else {
                    self.typing.remove(&user_id);
                }
            }
            ChatEvent::Read { message_id, user_id } => {
                if let Some(message) = self
                    .messages
                    .iter_mut()
                    .find(|m| m.server_id == Some(message_id))
                {
                    message.read_by.insert(user_id);
                }
            }
        }
    }

    /// Receive and apply the next transport event.
    ///
    /// Returns `false` once the channel has closed; the session flips to
    /// Disconnected and the caller decides whether to reopen.
    pub async fn pump_next(&mut self) -> Result<bool> {
        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => return Ok(false),
        };

        match transport.next_event().await? {
            Some(event) => {
                self.on_incoming(event);
                Ok(true)
            }
            None => {
                log::info!("Channel closed for conversation {}", self.conversation_id);
                self.close();
                Ok(false)
            }
        }
    }

    /// Batch-mark any committed messages the current user has not read
    /// yet. Used after new messages arrive while the conversation is on
    /// screen; `open` already covers the history backlog.
    pub async fn mark_unread_read(&mut self) -> Result<()> {
        let unread: Vec<i64> = self
            .messages
            .iter()
            .filter(|m| m.delivery == Delivery::Committed && !m.read_by.contains(&self.current_user))
            .filter_map(|m| m.server_id)
            .collect();

        if unread.is_empty() {
            return Ok(());
        }

        self.api.mark_read(&unread).await?;
        for message in &mut self.messages {
            if message.server_id.map_or(false, |id| unread.contains(&id)) {
                message.read_by.insert(self.current_user);
            }
        }
        Ok(())
    }

    /// Tear down the channel; idempotent. Already-transmitted sends
    /// resolve or fail on their own; the session just stops listening.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.typing.clear();
    }

    fn flag_failed(&mut self, client_ref: Uuid) {
        if let Some(message) = self
            .messages
            .iter_mut()
            .find(|m| m.client_ref == Some(client_ref) && m.delivery == Delivery::Pending)
        {
            message.delivery = Delivery::Failed;
        }
    }

    /// Committed echo of our own send replaces the pending entry in place,
    /// preserving its position; everything else appends. A re-delivered
    /// committed id is ignored.
    fn apply_message(&mut self, wire: WireMessage) {
        if self.messages.iter().any(|m| m.server_id == Some(wire.id)) {
            log::debug!("Duplicate delivery of message {}, ignoring", wire.id);
            return;
        }

        if let Some(client_ref) = wire.client_ref {
            if let Some(position) = self.messages.iter().position(|m| {
                m.client_ref == Some(client_ref) && m.delivery != Delivery::Committed
            }) {
                self.messages[position] = ChatMessage::committed(self.conversation_id, wire);
                return;
            }
        }

        self.messages
            .push(ChatMessage::committed(self.conversation_id, wire));
    }
}

/// Convenience alias for sessions running over the production stack
pub type LiveChatSession<B> = ChatSession<B, crate::websocket::WsTransport>;

/// Open a session over the production WebSocket transport
pub async fn open_live<B: Backend>(
    api: Arc<ServerApi<B>>,
    base_url: &str,
    conversation_id: i64,
    current_user: i64,
) -> Result<LiveChatSession<B>> {
    let base = base_url.to_string();
    ChatSession::open(api, conversation_id, current_user, move |token| async move {
        crate::websocket::WsTransport::connect(&base, conversation_id, &token).await
    })
    .await
}
