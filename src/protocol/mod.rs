//! Wire protocol: inbound envelopes and outbound frames.
//!
//! Everything that crosses the WebSocket is JSON text. Inbound payloads are
//! decoded into an [`Envelope`] and classified by its `type` field; outbound
//! payloads are built once as an [`OutboundFrame`], shared across recipients
//! by `Arc`, and serialized by each session's writer task.

mod envelope;
mod frame;

pub use envelope::{Envelope, EnvelopeKind};
pub use frame::{Media, MessageFrame, OutboundFrame, PresenceFrame, TypingFrame};

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(
    /// Authenticated user identity (the token subject).
    UserId
);

string_id!(
    /// Room (conversation) identifier.
    RoomId
);
