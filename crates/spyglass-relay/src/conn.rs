//! Capability traits over one direction of a WebSocket.
//!
//! A relay session only needs three capabilities from a connection:
//! read-next-frame, write-frame, and close. Modeling them as traits keeps the
//! session logic independent of the concrete socket types (axum on the
//! inbound leg, tungstenite on the outbound leg) and lets tests substitute
//! in-memory doubles without a network stack.

use async_trait::async_trait;
use axum::extract::ws::{Message as AxumMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::RelayError;
use crate::frame::Frame;

/// The outbound socket type produced by dialing the browser.
pub type UpstreamSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Read half of a relayed connection.
#[async_trait]
pub trait FrameStream: Send {
    /// Next frame, a transport error, or `None` once the peer is gone.
    async fn next_frame(&mut self) -> Option<Result<Frame, RelayError>>;
}

/// Write half of a relayed connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Write one frame.
    async fn send_frame(&mut self, frame: Frame) -> Result<(), RelayError>;
    /// Close the connection. Safe to call on an already-dead socket.
    async fn close(&mut self) -> Result<(), RelayError>;
}

/// Split an accepted client socket into its two capability halves.
pub fn split_client(socket: WebSocket) -> (ClientReader, ClientWriter) {
    let (sink, stream) = socket.split();
    (ClientReader(stream), ClientWriter(sink))
}

/// Split a dialed upstream socket into its two capability halves.
pub fn split_upstream(socket: UpstreamSocket) -> (UpstreamReader, UpstreamWriter) {
    let (sink, stream) = socket.split();
    (UpstreamReader(stream), UpstreamWriter(sink))
}

/// Read half of the inbound (automation client) connection.
pub struct ClientReader(SplitStream<WebSocket>);

#[async_trait]
impl FrameStream for ClientReader {
    async fn next_frame(&mut self) -> Option<Result<Frame, RelayError>> {
        let msg = self.0.next().await?;
        Some(
            msg.map(Frame::from)
                .map_err(|e| RelayError::Client(e.to_string())),
        )
    }
}

/// Write half of the inbound (automation client) connection.
pub struct ClientWriter(SplitSink<WebSocket, AxumMessage>);

#[async_trait]
impl FrameSink for ClientWriter {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), RelayError> {
        self.0
            .send(frame.into())
            .await
            .map_err(|e| RelayError::Client(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.0
            .close()
            .await
            .map_err(|e| RelayError::Client(e.to_string()))
    }
}

/// Read half of the outbound (browser) connection.
pub struct UpstreamReader(SplitStream<UpstreamSocket>);

#[async_trait]
impl FrameStream for UpstreamReader {
    async fn next_frame(&mut self) -> Option<Result<Frame, RelayError>> {
        loop {
            return match self.0.next().await? {
                Ok(msg) => match Frame::from_tungstenite(msg) {
                    Some(frame) => Some(Ok(frame)),
                    // Raw frame surfaced in a mode we never enable; skip it.
                    None => continue,
                },
                Err(e) => Some(Err(RelayError::Upstream(e.to_string()))),
            };
        }
    }
}

/// Write half of the outbound (browser) connection.
pub struct UpstreamWriter(SplitSink<UpstreamSocket, TungsteniteMessage>);

#[async_trait]
impl FrameSink for UpstreamWriter {
    async fn send_frame(&mut self, frame: Frame) -> Result<(), RelayError> {
        self.0
            .send(frame.into_tungstenite())
            .await
            .map_err(|e| RelayError::Upstream(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), RelayError> {
        self.0
            .close()
            .await
            .map_err(|e| RelayError::Upstream(e.to_string()))
    }
}
