//! Inbound envelope decoding.

use serde::Deserialize;

use super::RoomId;
use crate::error::ProtocolError;

/// Classification of an inbound envelope by its `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeKind {
    /// Chat message: membership check, persist, fan out to the room.
    Message,
    /// Typing indicator: fan out to the room, never persisted.
    Typing,
    /// Online/offline announcement: fan out to every connected session.
    Presence,
    /// Anything else; logged and ignored.
    Unknown,
}

impl EnvelopeKind {
    /// Static label for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Message => "message",
            Self::Typing => "typing",
            Self::Presence => "presence",
            Self::Unknown => "unknown",
        }
    }
}

/// A decoded inbound client payload.
///
/// Field names follow the current client protocol; the legacy names
/// `chatid`, `mediaUrl` and `clientId` are accepted as aliases. A payload
/// that carries both spellings of one field is a duplicate field and fails
/// to decode as a whole.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "roomID", alias = "chatid", default)]
    pub room_id: Option<RoomId>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "mediaURL", alias = "mediaUrl", default)]
    pub media_url: Option<String>,
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub online: bool,
    #[serde(rename = "clientCorrelationID", alias = "clientId", default)]
    pub client_correlation_id: Option<String>,
}

impl Envelope {
    /// Decode a JSON payload.
    pub fn decode(payload: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(payload).map_err(ProtocolError::Malformed)
    }

    pub fn classify(&self) -> EnvelopeKind {
        match self.kind.as_str() {
            "message" => EnvelopeKind::Message,
            "typing" => EnvelopeKind::Typing,
            "presence" => EnvelopeKind::Presence,
            _ => EnvelopeKind::Unknown,
        }
    }

    /// The target room, required for message and typing envelopes.
    pub fn require_room(&self) -> Result<&RoomId, ProtocolError> {
        match &self.room_id {
            Some(room) if !room.as_str().is_empty() => Ok(room),
            _ => Err(ProtocolError::MissingRoom(self.classify().as_str())),
        }
    }
}
