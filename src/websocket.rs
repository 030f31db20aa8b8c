/// Realtime channel transport for chat sessions
///
/// `ChatTransport` is the seam between the session state machine and the
/// wire; the production implementation runs over tokio-tungstenite with
/// split sink/stream halves bridged through unbounded channels.

use crate::error::{ClientError, Result};
use crate::models::{ChatEvent, OutboundFrame};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

/// Duplex JSON-framed channel scoped to one conversation
#[async_trait]
pub trait ChatTransport: Send {
    async fn send(&mut self, frame: OutboundFrame) -> Result<()>;
    /// Next incoming event, or `None` once the channel has closed
    async fn next_event(&mut self) -> Result<Option<ChatEvent>>;
    /// Tear down the channel; idempotent
    fn close(&mut self);
}

/// Derive the realtime channel URL from the HTTP base URL, carrying the
/// access token as an auth query parameter for the handshake.
pub fn chat_url(base_url: &str, conversation_id: i64, access_token: &str) -> Result<Url> {
    let ws_base = base_url
        .replace("http://", "ws://")
        .replace("https://", "wss://");
    let mut url = Url::parse(&format!("{}/ws/chat/{}", ws_base, conversation_id))
        .map_err(|e| ClientError::Config(format!("Invalid server URL: {}", e)))?;
    url.query_pairs_mut().append_pair("token", access_token);
    Ok(url)
}

pub struct WsTransport {
    sender: futures::channel::mpsc::UnboundedSender<Message>,
    receiver: futures::channel::mpsc::UnboundedReceiver<Message>,
}

impl WsTransport {
    /// Connect and complete the handshake for one conversation
    pub async fn connect(
        base_url: &str,
        conversation_id: i64,
        access_token: &str,
    ) -> Result<Self> {
        let url = chat_url(base_url, conversation_id, access_token)?;

        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::ChatUnavailable(format!("Handshake failed: {}", e)))?;
        let (mut write, mut read) = ws_stream.split();

        let (tx, mut rx) = futures::channel::mpsc::unbounded::<Message>();
        let (tx_in, rx_in) = futures::channel::mpsc::unbounded::<Message>();

        // Outgoing pump
        tokio::spawn(async move {
            while let Some(msg) = rx.next().await {
                if let Err(e) = write.send(msg).await {
                    log::error!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
        });

        // Incoming pump
        tokio::spawn(async move {
            while let Some(msg) = read.next().await {
                match msg {
                    Ok(msg) => {
                        if tx_in.unbounded_send(msg).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        log::error!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
            log::debug!("Incoming pump for conversation {} stopped", conversation_id);
        });

        Ok(Self {
            sender: tx,
            receiver: rx_in,
        })
    }
}

#[async_trait]
impl ChatTransport for WsTransport {
    async fn send(&mut self, frame: OutboundFrame) -> Result<()> {
        let json = serde_json::to_string(&frame)?;
        self.sender
            .unbounded_send(Message::Text(json.into()))
            .map_err(|e| ClientError::WebSocket(format!("Failed to queue frame: {}", e)))?;
        Ok(())
    }

    async fn next_event(&mut self) -> Result<Option<ChatEvent>> {
        while let Some(msg) = self.receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let event: ChatEvent = serde_json::from_str(&text)?;
                    return Ok(Some(event));
                }
                Message::Close(_) => return Ok(None),
                // Ping/pong and binary frames are not part of the protocol
                _ => continue,
            }
        }
        Ok(None)
    }

    fn close(&mut self) {
        self.sender.close_channel();
    }
}
