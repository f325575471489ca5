//! Outbound frames.
//!
//! The set of payloads the hub ever sends is closed; each variant serializes
//! with a `type` discriminator matching what clients switch on.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{RoomId, UserId};

/// Attachment reference carried by a chat message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Media {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl Media {
    /// Media is attached only when both the URL and the type are present.
    pub fn from_parts(url: Option<&str>, kind: Option<&str>) -> Option<Self> {
        match (url, kind) {
            (Some(url), Some(kind)) if !url.is_empty() && !kind.is_empty() => Some(Self {
                url: url.to_string(),
                kind: kind.to_string(),
            }),
            _ => None,
        }
    }
}

/// A persisted chat message as delivered to room participants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageFrame {
    pub id: String,
    pub sender: UserId,
    pub content: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    #[serde(rename = "roomID")]
    pub room_id: RoomId,
    #[serde(
        rename = "clientCorrelationID",
        skip_serializing_if = "Option::is_none"
    )]
    pub client_correlation_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypingFrame {
    pub sender: UserId,
    #[serde(rename = "roomID")]
    pub room_id: RoomId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PresenceFrame {
    pub from: UserId,
    pub online: bool,
}

/// Every payload the hub sends to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundFrame {
    Message(MessageFrame),
    Typing(TypingFrame),
    Presence(PresenceFrame),
}

impl OutboundFrame {
    /// Static label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::Typing(_) => "typing",
            Self::Presence(_) => "presence",
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<MessageFrame> for OutboundFrame {
    fn from(frame: MessageFrame) -> Self {
        Self::Message(frame)
    }
}

impl From<TypingFrame> for OutboundFrame {
    fn from(frame: TypingFrame) -> Self {
        Self::Typing(frame)
    }
}

impl From<PresenceFrame> for OutboundFrame {
    fn from(frame: PresenceFrame) -> Self {
        Self::Presence(frame)
    }
}
