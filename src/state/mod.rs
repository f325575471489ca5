//! State management module.
//!
//! Contains the [`Hub`] (shared hub state), the [`ConnectionRegistry`] and
//! per-connection [`Session`]s.

mod hub;
mod registry;
mod session;

pub use hub::Hub;
pub use registry::ConnectionRegistry;
pub use session::{CloseReason, EnqueueError, Session, SharedFrame};
#[cfg(test)]
pub use session::SessionState;
