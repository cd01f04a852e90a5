//! Websocket connection to the trivia server.
//!
//! [`WsClient::start`] connects once and reports what happens on the
//! connection as [`WsEvent`]s. It never reconnects: a failed or closed
//! connection is handed back to the UI, which resets to the address prompt.

use std::{
    ops::ControlFlow,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use async_trait::async_trait;
use futures_channel::mpsc::UnboundedSender;
use futures_util::{StreamExt as _, future, pin_mut};
use thiserror::Error;
use tokio::{select, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{self, Message},
};
use trivia_ws::models::ClientMessage;
use url::Url;

/// How often the client pings the server
pub const PING_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum ConnectWsError {
    #[error("Invalid server address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error(transparent)]
    Connect(#[from] tungstenite::Error),
}

/// Checks that `address` is a `ws://` or `wss://` URL before connecting.
///
/// # Errors
///
/// * If `address` does not parse as a URL
/// * If the scheme is not `ws` or `wss`
pub fn parse_address(address: &str) -> Result<Url, ConnectWsError> {
    let invalid = |reason: String| ConnectWsError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let url = Url::parse(address.trim()).map_err(|e| invalid(e.to_string()))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        scheme => Err(invalid(format!("unsupported scheme '{scheme}'"))),
    }
}

/// Outbound frames queued for the writer.
#[derive(Debug)]
pub enum WsMessage {
    TextMessage(String),
    Ping,
}

/// What happened on the connection, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsEvent {
    Connected,
    /// A text frame from the server
    Message(String),
    /// The connection ended, from either side
    Closed,
}

#[derive(Debug, Error)]
pub enum WebsocketSendError {
    #[error("Unknown: {0}")]
    Unknown(String),
}

#[async_trait]
pub trait WebsocketSender: Send + Sync {
    /// # Errors
    ///
    /// * If the connection's outbound channel is closed
    async fn send(&self, data: &str) -> Result<(), WebsocketSendError>;

    /// # Errors
    ///
    /// * If the connection's outbound channel is closed
    async fn ping(&self) -> Result<(), WebsocketSendError>;
}

impl core::fmt::Debug for dyn WebsocketSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{WebsocketSender}}")
    }
}

type SharedSender = Arc<RwLock<Option<UnboundedSender<WsMessage>>>>;

/// Sends to, and closes, the connection of the [`WsClient`] it was created with.
#[derive(Debug, Clone)]
pub struct WsHandle {
    sender: SharedSender,
    cancellation_token: CancellationToken,
}

impl WsHandle {
    pub fn close(&self) {
        self.cancellation_token.cancel();
    }

    /// # Errors
    ///
    /// * If the message fails to serialize
    /// * If the connection's outbound channel is closed
    pub async fn send_message(&self, message: &ClientMessage) -> Result<(), WebsocketSendError> {
        let text = message
            .to_json()
            .map_err(|e| WebsocketSendError::Unknown(e.to_string()))?;

        self.send(&text).await
    }

    fn queue(&self, message: WsMessage) -> Result<(), WebsocketSendError> {
        if let Some(sender) = self
            .sender
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            sender
                .unbounded_send(message)
                .map_err(|e| WebsocketSendError::Unknown(e.to_string()))?;
        }
        Ok(())
    }
}

#[async_trait]
impl WebsocketSender for WsHandle {
    /// Does nothing before the connection is established.
    async fn send(&self, data: &str) -> Result<(), WebsocketSendError> {
        self.queue(WsMessage::TextMessage(data.to_string()))
    }

    async fn ping(&self) -> Result<(), WebsocketSendError> {
        self.queue(WsMessage::Ping)
    }
}

#[derive(Debug, Clone)]
pub struct WsClient {
    url: Url,
    sender: SharedSender,
    cancellation_token: CancellationToken,
}

impl WsClient {
    /// Returns the client and a handle to send through and close it.
    #[must_use]
    pub fn new(url: Url) -> (Self, WsHandle) {
        let sender = Arc::new(RwLock::new(None));
        let cancellation_token = CancellationToken::new();
        let handle = WsHandle {
            sender: sender.clone(),
            cancellation_token: cancellation_token.clone(),
        };

        (
            Self {
                url,
                sender,
                cancellation_token,
            },
            handle,
        )
    }

    fn message_handler(tx: &mpsc::UnboundedSender<WsEvent>, m: Message) -> ControlFlow<()> {
        log::trace!("Message from ws server: {m:?}");

        let text = match m {
            Message::Text(text) => text.to_string(),
            Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    log::warn!("Ignoring non-UTF-8 binary frame: {e}");
                    return ControlFlow::Continue(());
                }
            },
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {
                return ControlFlow::Continue(());
            }
            Message::Close(frame) => {
                log::debug!("Server closed the connection: {frame:?}");
                return ControlFlow::Break(());
            }
        };

        if tx.send(WsEvent::Message(text)).is_err() {
            log::debug!("Event receiver dropped");
            return ControlFlow::Break(());
        }

        ControlFlow::Continue(())
    }

    /// Connects and runs the connection until it closes or the handle closes it.
    ///
    /// Sends [`WsEvent::Connected`] once the handshake completes and
    /// [`WsEvent::Closed`] when the connection ends. A failed connection
    /// attempt sends neither.
    ///
    /// # Errors
    ///
    /// * If the connection cannot be established
    #[allow(clippy::too_many_lines)]
    pub async fn start(&self, tx: mpsc::UnboundedSender<WsEvent>) -> Result<(), ConnectWsError> {
        let close_token = CancellationToken::new();
        let (txf, rxf) = futures_channel::mpsc::unbounded();

        log::debug!("Connecting to websocket '{}'...", self.url);

        #[allow(clippy::redundant_pub_crate)]
        let (ws_stream, _) = select!(
            resp = connect_async(self.url.as_str()) => resp?,
            () = self.cancellation_token.cancelled() => {
                log::debug!("Cancelling connect");
                return Ok(());
            }
        );

        log::debug!("WebSocket handshake has been successfully completed");

        self.sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(txf.clone());

        let _ = tx.send(WsEvent::Connected);

        let (write, mut read) = ws_stream.split();

        let ws_writer = rxf
            .map(|message| match message {
                WsMessage::TextMessage(message) => {
                    trivia_logging::debug_or_trace!(
                        ("Sending text packet"),
                        ("Sending text packet message={message}")
                    );
                    Ok(Message::text(message))
                }
                WsMessage::Ping => {
                    log::trace!("Sending ping");
                    Ok(Message::Ping(Vec::new().into()))
                }
            })
            .forward(write);

        let ws_reader = async {
            while let Some(m) = read.next().await {
                let m = match m {
                    Ok(m) => m,
                    Err(e) => {
                        log::error!("Receive loop error: {e:?}");
                        break;
                    }
                };

                if Self::message_handler(&tx, m).is_break() {
                    break;
                }
            }
        };

        let pinger = tokio::spawn({
            let txf = txf.clone();
            let close_token = close_token.clone();
            let cancellation_token = self.cancellation_token.clone();

            async move {
                loop {
                    #[allow(clippy::redundant_pub_crate)]
                    {
                        select!(
                            () = close_token.cancelled() => { break; }
                            () = cancellation_token.cancelled() => { break; }
                            () = tokio::time::sleep(PING_INTERVAL) => {
                                log::trace!("Sending ping to server");
                                if let Err(e) = txf.unbounded_send(WsMessage::Ping) {
                                    log::error!("Pinger send error: {e:?}");
                                    close_token.cancel();
                                    break;
                                }
                            }
                        );
                    }
                }
            }
        });

        pin_mut!(ws_writer, ws_reader);
        #[allow(clippy::redundant_pub_crate)]
        {
            select!(
                () = close_token.cancelled() => {}
                () = self.cancellation_token.cancelled() => {}
                _ = future::select(ws_writer, ws_reader) => {}
            );
        }

        close_token.cancel();
        self.sender
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        log::debug!("start: Waiting for pinger to finish...");
        if let Err(e) = pinger.await {
            log::warn!("start: Pinger failed to finish: {e:?}");
        }

        log::info!("WebSocket connection closed");
        let _ = tx.send(WsEvent::Closed);

        Ok(())
    }
}
