//! Duplex frame transport to the remote model.
//!
//! Sessions only see [`Connector`] and [`Transport`]. [`WsConnector`] speaks
//! WebSocket through `tokio-tungstenite`; [`ChannelConnector`] is an
//! in-process pair used to drive sessions with scripted server frames.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use super::protocol::ClientFrame;
use crate::error::{PlannerError, Result};

/// One open connection.
#[async_trait]
pub trait Transport: Send {
    /// Send one frame.
    async fn send(&mut self, frame: &ClientFrame) -> Result<()>;

    /// Next inbound text frame, or `None` once the peer has closed.
    ///
    /// Must be cancel-safe: sessions race it against timers in `select!`.
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Close the connection. Calling it twice is harmless.
    async fn close(&mut self);
}

/// Opens connections.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn Transport>>;
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Connects to the model endpoint over WebSocket.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: url::Url,
}

impl WsConnector {
    /// `url` must already carry the API key query parameter.
    pub fn new(url: url::Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        let host = self.url.host_str().unwrap_or("<none>").to_owned();
        let (stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| PlannerError::Transport(format!("connect to {host} failed: {e}")))?;
        info!("connected to model endpoint at {host}");
        Ok(Box::new(WsTransport {
            stream,
            closed: false,
        }))
    }
}

/// An open WebSocket connection.
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
        if self.closed {
            return Err(PlannerError::Transport("connection already closed".into()));
        }
        let json = frame.to_json()?;
        debug!(kind = frame.kind(), bytes = json.len(), "sending frame");
        self.stream
            .send(Message::Text(json))
            .await
            .map_err(|e| PlannerError::Transport(format!("send failed: {e}")))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        if self.closed {
            return Ok(None);
        }
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(Some(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Ok(Some(text)),
                    Err(e) => warn!("dropping non-UTF-8 binary frame: {e}"),
                },
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "peer closed connection");
                    return Ok(None);
                }
                Some(Ok(_)) => {}
                Some(Err(
                    tokio_tungstenite::tungstenite::Error::ConnectionClosed
                    | tokio_tungstenite::tungstenite::Error::AlreadyClosed,
                ))
                | None => return Ok(None),
                Some(Err(e)) => return Err(PlannerError::Transport(format!("receive failed: {e}"))),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.stream.close(None).await {
            debug!("close handshake failed: {e}");
        }
    }
}

// ---------------------------------------------------------------------------
// In-process channel
// ---------------------------------------------------------------------------

/// What the scripted server end pushes to the client.
#[derive(Debug, Clone)]
enum Inbound {
    Frame(String),
    Fail(String),
}

/// Client side of an in-process connection.
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, frame: &ClientFrame) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(PlannerError::Transport("connection already closed".into()));
        }
        self.outbound
            .send(frame.to_json()?)
            .map_err(|_| PlannerError::Transport("peer went away".into()))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        match self.inbound.recv().await {
            Some(Inbound::Frame(text)) => Ok(Some(text)),
            Some(Inbound::Fail(reason)) => Err(PlannerError::Transport(reason)),
            None => Ok(None),
        }
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.inbound.close();
    }
}

/// Hands out a single [`ChannelTransport`]; later connects fail.
pub struct ChannelConnector {
    pending: Mutex<Option<ChannelTransport>>,
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>> {
        match self.pending.lock().await.take() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(PlannerError::Transport("connection refused".into())),
        }
    }
}

impl ChannelConnector {
    /// A connector whose only connection is driven by the returned peer.
    pub fn pair() -> (Self, ChannelPeer) {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let transport = ChannelTransport {
            outbound: out_tx,
            inbound: in_rx,
            closed: Arc::clone(&closed),
        };
        let connector = Self {
            pending: Mutex::new(Some(transport)),
        };
        let peer = ChannelPeer {
            received: out_rx,
            inbound: Some(in_tx),
            closed,
        };
        (connector, peer)
    }

    /// A connector that refuses every connection.
    pub fn refusing() -> Self {
        Self {
            pending: Mutex::new(None),
        }
    }
}

/// Server side of an in-process connection.
pub struct ChannelPeer {
    received: mpsc::UnboundedReceiver<String>,
    inbound: Option<mpsc::UnboundedSender<Inbound>>,
    closed: Arc<AtomicBool>,
}

impl ChannelPeer {
    /// Next frame the client sent, parsed as JSON.
    pub async fn next_frame(&mut self) -> Option<serde_json::Value> {
        let text = self.received.recv().await?;
        serde_json::from_str(&text).ok()
    }

    /// Push a server frame to the client.
    pub fn send(&self, frame: serde_json::Value) {
        self.send_text(frame.to_string());
    }

    pub fn send_text(&self, text: impl Into<String>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Inbound::Frame(text.into()));
        }
    }

    /// Make the client's next receive fail with a transport error.
    pub fn fail(&self, reason: impl Into<String>) {
        if let Some(tx) = &self.inbound {
            let _ = tx.send(Inbound::Fail(reason.into()));
        }
    }

    /// Close from the server side; the client sees end of stream.
    pub fn hang_up(&mut self) {
        self.inbound = None;
    }

    /// Whether the client has closed its end.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn channel_pair_carries_frames_both_ways() {
        let (connector, mut peer) = ChannelConnector::pair();
        let mut transport = connector.connect().await.unwrap();

        transport.send(&ClientFrame::user_text("hi")).await.unwrap();
        let frame = peer.next_frame().await.unwrap();
        assert_eq!(frame["client_content"]["turns"][0]["parts"][0]["text"], "hi");

        peer.send(json!({"setupComplete": {}}));
        assert_eq!(
            transport.recv().await.unwrap().as_deref(),
            Some(r#"{"setupComplete":{}}"#)
        );
    }

    #[tokio::test]
    async fn second_connect_is_refused() {
        let (connector, _peer) = ChannelConnector::pair();
        assert!(connector.connect().await.is_ok());
        assert!(matches!(
            connector.connect().await,
            Err(PlannerError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn hang_up_ends_stream_and_fail_errors() {
        let (connector, mut peer) = ChannelConnector::pair();
        let mut transport = connector.connect().await.unwrap();
        peer.fail("reset by peer");
        assert!(transport.recv().await.is_err());
        peer.hang_up();
        assert!(transport.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn close_is_visible_to_peer_and_idempotent() {
        let (connector, peer) = ChannelConnector::pair();
        let mut transport = connector.connect().await.unwrap();
        transport.close().await;
        transport.close().await;
        assert!(peer.client_closed());
        assert!(transport.send(&ClientFrame::user_text("x")).await.is_err());
        assert!(transport.recv().await.unwrap().is_none());
    }
}
