//! Protocol-agnostic WebSocket frame model.
//!
//! The relay carries opaque traffic: JSON command messages as text frames
//! and, potentially, binary payloads. The inbound leg speaks axum's message
//! type and the outbound leg speaks tungstenite's; [`Frame`] is the neutral
//! form both convert through, preserving the text/binary distinction exactly.

use axum::extract::ws::Message as AxumMessage;
use bytes::Bytes;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

/// One WebSocket frame, independent of the transport library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A text data frame (UTF-8).
    Text(String),
    /// A binary data frame.
    Binary(Bytes),
    /// A ping control frame with its application payload.
    Ping(Bytes),
    /// A pong control frame with its application payload.
    Pong(Bytes),
    /// A close frame. The status/reason are not relayed.
    Close,
}

impl Frame {
    /// Whether this is an ordinary data frame to be forwarded.
    pub fn is_data(&self) -> bool {
        matches!(self, Self::Text(_) | Self::Binary(_))
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(t) => t.len(),
            Self::Binary(b) | Self::Ping(b) | Self::Pong(b) => b.len(),
            Self::Close => 0,
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Convert a tungstenite message read from the upstream socket.
    ///
    /// Returns `None` for raw frames, which tungstenite only surfaces in
    /// manual-frame mode that the relay never enables.
    pub fn from_tungstenite(msg: TungsteniteMessage) -> Option<Self> {
        match msg {
            TungsteniteMessage::Text(t) => Some(Self::Text(t.as_str().to_owned())),
            TungsteniteMessage::Binary(b) => Some(Self::Binary(b)),
            TungsteniteMessage::Ping(p) => Some(Self::Ping(p)),
            TungsteniteMessage::Pong(p) => Some(Self::Pong(p)),
            TungsteniteMessage::Close(_) => Some(Self::Close),
            TungsteniteMessage::Frame(_) => None,
        }
    }

    /// Convert into a tungstenite message for the upstream socket.
    pub fn into_tungstenite(self) -> TungsteniteMessage {
        match self {
            Self::Text(t) => TungsteniteMessage::Text(t.into()),
            Self::Binary(b) => TungsteniteMessage::Binary(b),
            Self::Ping(p) => TungsteniteMessage::Ping(p),
            Self::Pong(p) => TungsteniteMessage::Pong(p),
            Self::Close => TungsteniteMessage::Close(None),
        }
    }
}

impl From<AxumMessage> for Frame {
    fn from(msg: AxumMessage) -> Self {
        match msg {
            AxumMessage::Text(t) => Self::Text(t.as_str().to_owned()),
            AxumMessage::Binary(b) => Self::Binary(b),
            AxumMessage::Ping(p) => Self::Ping(p),
            AxumMessage::Pong(p) => Self::Pong(p),
            AxumMessage::Close(_) => Self::Close,
        }
    }
}

impl From<Frame> for AxumMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(t) => Self::Text(t.into()),
            Frame::Binary(b) => Self::Binary(b),
            Frame::Ping(p) => Self::Ping(p),
            Frame::Pong(p) => Self::Pong(p),
            Frame::Close => Self::Close(None),
        }
    }
}
