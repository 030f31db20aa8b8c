//! CLI interface for the dhaba client
//!
//! Provides command parsing, async stdin reading, and the interactive
//! loop that drives the session gate, cart ledger, and chat session.

use crate::backend::HttpBackend;
use crate::cart::{format_rupees, CartLedger, CheckoutOrigin};
use crate::chat::open_live;
use crate::error::{ClientError, Result};
use crate::models::{Command, Delivery};
use crate::session::{SessionGate, SessionState};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::mpsc;

/// Parse a command from user input
pub fn parse_command(input: &str) -> Result<Command> {
    Command::parse(input).map_err(ClientError::Validation)
}

/// Format a chat message for display
pub fn format_message(conversation: i64, sender: i64, text: &str, delivery: Delivery) -> String {
    let marker = match delivery {
        Delivery::Pending => " …",
        Delivery::Failed => " ✗",
        Delivery::Committed => "",
    };
    format!("#{} <{}> {}{}", conversation, sender, text, marker)
}

/// Async line reader backed by its own task. Lines flow through a
/// channel, so losing a `select!` race cancels only the channel recv,
/// never an in-flight read: partially typed input survives the race.
pub struct LineReader {
    rx: mpsc::UnboundedReceiver<std::io::Result<String>>,
}

impl LineReader {
    /// Reader over this process's stdin
    pub fn stdin() -> Self {
        Self::from_reader(tokio::io::stdin())
    }

    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut reader = BufReader::new(reader);
            loop {
                let mut line = String::new();
                match reader.read_line(&mut line).await {
                    Ok(0) => break, // EOF
                    Ok(_) => {
                        if line.ends_with('\n') {
                            line.pop();
                            if line.ends_with('\r') {
                                line.pop();
                            }
                        }
                        if tx.send(Ok(line)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                }
            }
        });
        LineReader { rx }
    }

    /// Print the prompt, then yield the next full line (None on EOF).
    /// Safe to race under `select!`.
    pub async fn next_line(&mut self, prompt: &str) -> Result<Option<String>> {
        if !prompt.is_empty() {
            print!("{}", prompt);
            let _ = std::io::stdout().flush();
        }
        match self.rx.recv().await {
            Some(Ok(line)) => Ok(Some(line)),
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }
}

/// Run the interactive command loop until /quit or EOF
pub async fn run_loop(gate: &SessionGate<HttpBackend>, base_url: &str) -> Result<()> {
    let mut cart = CartLedger::new();
    let mut reader = LineReader::stdin();

    println!(
        "Commands: /login <username>, /logout, /cart, /checkout, /chat <conversation-id>, /quit"
    );

    while let Some(line) = reader.next_line("> ").await? {
        if line.is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        match command {
            Command::Login(username) => {
                let password = match reader.next_line("password: ").await? {
                    Some(password) => password,
                    None => break,
                };
                match gate.login(&username, &password).await {
                    Ok(user) => println!("signed in as {}", user.username),
                    Err(e) => println!("login failed: {}", e),
                }
            }
            Command::Logout => {
                gate.logout().await?;
                cart.clear();
                println!("signed out");
            }
            Command::Cart => match gate.api().fetch_cart().await {
                Ok(lines) => {
                    cart.replace_all(lines);
                    for line in cart.lines() {
                        println!(
                            "  {}x item {} ({}, {:?}) @ {}",
                            line.quantity,
                            line.item_id,
                            line.variant_label,
                            line.spice_level,
                            format_rupees(line.unit_price)
                        );
                    }
                    println!("total: {}", format_rupees(cart.total()));
                }
                Err(e) => println!("cart fetch failed: {}", e),
            },
            Command::Checkout => {
                let order = match cart.checkout_payload(CheckoutOrigin::FromCart) {
                    Ok(order) => order,
                    Err(e) => {
                        println!("{}", e);
                        continue;
                    }
                };
                match gate.api().place_order(&order).await {
                    Ok(order_id) => {
                        println!(
                            "order {} placed, total {}",
                            order_id,
                            format_rupees(order.total_paisa)
                        );
                        cart.clear();
                    }
                    Err(e) => println!("order failed: {}", e),
                }
            }
            Command::Chat(conversation_id) => {
                let user = match gate.state().await {
                    SessionState::SignedIn(user) => user,
                    _ => {
                        println!("sign in first");
                        continue;
                    }
                };
                run_chat(gate, base_url, conversation_id, user.id, &mut reader).await?;
            }
            Command::Message(_) => {
                println!("open a conversation first: /chat <conversation-id>");
            }
            Command::Quit => break,
        }
    }

    Ok(())
}

/// Interactive chat sub-loop: typed lines are sent, incoming events are
/// drained before each prompt, /quit leaves the conversation.
async fn run_chat(
    gate: &SessionGate<HttpBackend>,
    base_url: &str,
    conversation_id: i64,
    user_id: i64,
    reader: &mut LineReader,
) -> Result<()> {
    let api = std::sync::Arc::new(gate.api().clone());
    let mut session = match open_live(api, base_url, conversation_id, user_id).await {
        Ok(session) => session,
        Err(e) => {
            println!("could not open chat: {}", e);
            return Ok(());
        }
    };

    for message in session.messages() {
        println!(
            "{}",
            format_message(conversation_id, message.sender_id, &message.body, message.delivery)
        );
    }
    println!("connected to conversation {}; /quit to leave", conversation_id);

    loop {
        let seen = session.messages().len();
        tokio::select! {
            pumped = session.pump_next() => {
                match pumped {
                    Ok(true) => {
                        // Print only when the event grew the sequence;
                        // typing toggles and receipts stay silent
                        if session.messages().len() > seen {
                            if let Some(message) = session.messages().last() {
                                println!(
                                    "{}",
                                    format_message(conversation_id, message.sender_id, &message.body, message.delivery)
                                );
                            }
                            if let Err(e) = session.mark_unread_read().await {
                                log::warn!("Mark-read failed: {}", e);
                            }
                        }
                    }
                    Ok(false) => {
                        println!("disconnected");
                        break;
                    }
                    Err(e) => {
                        log::warn!("Event error: {}", e);
                    }
                }
            }
            line = reader.next_line("> ") => {
                match line? {
                    None => break,
                    Some(text) if text == "/quit" || text == "/exit" => break,
                    Some(text) if text.trim().is_empty() => continue,
                    Some(text) => {
                        if let Err(e) = session.send(&text).await {
                            println!("send failed: {}", e);
                        }
                    }
                }
            }
        }
    }

    session.close();
    Ok(())
}
