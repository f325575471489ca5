//! Integration test common infrastructure.
//!
//! Provides utilities for spawning a hub process, minting tokens and
//! driving WebSocket clients against it.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;

use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;

/// Shared secret written into every test server's config.
pub const SECRET: &str = "integration-secret-integration-secret";

/// Mint a token for `user` valid for one hour.
pub fn token_for(user: &str) -> String {
    let exp = chrono::Utc::now().timestamp() + 3600;
    encode(
        &Header::default(),
        &json!({ "sub": user, "exp": exp }),
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("token encoding")
}
