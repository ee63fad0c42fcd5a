//! WebSocket transport for the client.
//!
//! Provides [`WsDriver`], a [`Driver`] that carries channel events as JSON
//! text frames. This is a thin layer that only moves events; protocol logic
//! remains in the Sans-IO [`crate::SyncClient`].

use std::time::Duration;

use festsync_core::Identity;
use festsync_proto::{Inbound, Outbound};
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::Driver;

/// How long `recv` waits for an event before reporting nothing ready.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Buffered events per direction.
const CHANNEL_CAPACITY: usize = 64;

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    Connection(String),

    /// No open transport to send on.
    #[error("not connected")]
    NotConnected,
}

/// Open socket plus the task bridging it to channels.
struct Link {
    to_server: mpsc::Sender<Outbound>,
    from_server: mpsc::Receiver<Inbound>,
    abort_handle: tokio::task::AbortHandle,
}

/// WebSocket [`Driver`].
///
/// The identity is passed as `user_id` and `name` query parameters on the
/// upgrade request. Completing the upgrade counts as the handshake ack.
pub struct WsDriver {
    url: String,
    poll_interval: Duration,
    link: Option<Link>,
}

impl WsDriver {
    /// Create a driver for the channel endpoint at `url` (`ws://` or
    /// `wss://`).
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into(), poll_interval: DEFAULT_POLL_INTERVAL, link: None }
    }

    /// Override how long `recv` waits before returning `None`.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    fn endpoint(&self, identity: &Identity) -> String {
        let separator = if self.url.contains('?') { '&' } else { '?' };
        let name: String = identity
            .display_name
            .bytes()
            .map(|b| match b {
                b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                    char::from(b).to_string()
                },
                _ => format!("%{b:02X}"),
            })
            .collect();
        format!("{}{separator}user_id={}&name={name}", self.url, identity.user_id)
    }
}

impl Driver for WsDriver {
    type Error = TransportError;

    async fn open(&mut self, identity: &Identity) -> Result<(), TransportError> {
        self.close("reopen");

        let endpoint = self.endpoint(identity);
        let (socket, _response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let (to_server_tx, to_server_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (from_server_tx, from_server_rx) = mpsc::channel(CHANNEL_CAPACITY);

        // The upgrade succeeded: that is the handshake ack
        from_server_tx
            .send(Inbound::Connect)
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let handle = tokio::spawn(run_socket(socket, to_server_rx, from_server_tx));
        self.link = Some(Link {
            to_server: to_server_tx,
            from_server: from_server_rx,
            abort_handle: handle.abort_handle(),
        });

        tracing::debug!(user_id = identity.user_id, url = %self.url, "websocket open");
        Ok(())
    }

    fn close(&mut self, reason: &str) {
        if let Some(link) = self.link.take() {
            tracing::debug!(%reason, "closing websocket");
            link.abort_handle.abort();
        }
    }

    async fn send(&mut self, event: Outbound) -> Result<(), TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        link.to_server.send(event).await.map_err(|_| TransportError::NotConnected)
    }

    async fn recv(&mut self) -> Option<Inbound> {
        let poll_interval = self.poll_interval;
        let link = self.link.as_mut()?;

        match tokio::time::timeout(poll_interval, link.from_server.recv()).await {
            Ok(Some(inbound)) => Some(inbound),
            Ok(None) => {
                self.link = None;
                Some(Inbound::Disconnect { reason: "websocket task ended".to_string() })
            },
            Err(_elapsed) => None,
        }
    }

    fn is_open(&self) -> bool {
        self.link.is_some()
    }
}

/// Bridge one socket to the driver's channels until either side ends.
async fn run_socket<S>(
    socket: S,
    mut to_server: mpsc::Receiver<Outbound>,
    from_server: mpsc::Sender<Inbound>,
) where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
        + futures_util::Sink<WsMessage, Error = tokio_tungstenite::tungstenite::Error>
        + Unpin,
{
    let (mut sink, mut stream) = socket.split();

    let reason = loop {
        tokio::select! {
            outgoing = to_server.recv() => {
                let Some(event) = outgoing else {
                    break "driver dropped".to_string();
                };
                let text = match event.encode() {
                    Ok(text) => text,
                    Err(error) => {
                        tracing::warn!(%error, event = event.name(), "dropping unencodable event");
                        continue;
                    },
                };
                if let Err(error) = sink.send(WsMessage::text(text)).await {
                    break error.to_string();
                }
            },
            incoming = stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => match Inbound::decode(text.as_str()) {
                        Ok(inbound) => {
                            if from_server.send(inbound).await.is_err() {
                                break "driver dropped".to_string();
                            }
                        },
                        Err(error) => tracing::warn!(%error, "undecodable inbound frame"),
                    },
                    Some(Ok(WsMessage::Close(frame))) => {
                        break frame.map_or_else(|| "closed by server".to_string(), |f| f.reason.as_str().to_string());
                    },
                    Some(Ok(_)) => {},
                    Some(Err(error)) => break error.to_string(),
                    None => break "stream ended".to_string(),
                }
            },
        }
    };

    tracing::info!(%reason, "websocket closed");
    let _ = from_server.send(Inbound::Disconnect { reason }).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_carries_identity() {
        let driver = WsDriver::new("ws://fest.example/channel");
        let url = driver.endpoint(&Identity::new(12, "Class 2-B"));
        assert_eq!(url, "ws://fest.example/channel?user_id=12&name=Class%202-B");

        let driver = WsDriver::new("ws://fest.example/channel?v=2");
        assert!(driver.endpoint(&Identity::new(1, "a")).starts_with("ws://fest.example/channel?v=2&"));
    }

    #[tokio::test]
    async fn closed_driver_reports_nothing() {
        let mut driver = WsDriver::new("ws://127.0.0.1:9");
        assert!(!driver.is_open());
        assert!(driver.recv().await.is_none());
        assert!(matches!(
            driver.send(Outbound::TypingStop { conversation_id: 1 }).await,
            Err(TransportError::NotConnected)
        ));
    }
}
