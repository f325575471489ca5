//! Test WebSocket client.
//!
//! Sends JSON envelopes and asserts on the JSON frames the hub pushes back.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http::StatusCode;
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected test client.
pub struct TestClient {
    ws: Ws,
    user: String,
}

impl TestClient {
    /// Connect as `user` and wait until the hub has registered the session.
    ///
    /// Registration is confirmed by announcing presence and waiting for the
    /// hub to echo it back, so other connected clients will see one
    /// presence frame from this user.
    pub async fn connect(address: &str, user: &str) -> anyhow::Result<Self> {
        let token = super::token_for(user);
        let (ws, _) = connect_async(format!("ws://{address}/ws?token={token}")).await?;
        let mut client = Self {
            ws,
            user: user.to_string(),
        };

        client.send(json!({ "type": "presence", "online": true })).await?;
        let me = client.user.clone();
        client
            .recv_matching(|f| f["type"] == "presence" && f["from"] == me.as_str())
            .await?;
        Ok(client)
    }

    /// Attempt an upgrade on `path_and_query` and return the HTTP status it was refused with.
    pub async fn rejected_status(address: &str, path_and_query: &str) -> anyhow::Result<StatusCode> {
        match connect_async(format!("ws://{address}{path_and_query}")).await {
            Ok(_) => anyhow::bail!("upgrade unexpectedly succeeded"),
            Err(tungstenite::Error::Http(response)) => Ok(response.status()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Send one JSON envelope.
    pub async fn send(&mut self, envelope: Value) -> anyhow::Result<()> {
        self.ws.send(Message::Text(envelope.to_string())).await?;
        Ok(())
    }

    /// Receive the next JSON frame.
    pub async fn recv(&mut self) -> anyhow::Result<Value> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive the next JSON frame, skipping control frames.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Value> {
        timeout(dur, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Text(text))) => return Ok(serde_json::from_str(&text)?),
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                    Some(Ok(other)) => anyhow::bail!("unexpected frame: {other:?}"),
                    Some(Err(e)) => return Err(e.into()),
                    None => anyhow::bail!("connection closed"),
                }
            }
        })
        .await?
    }

    /// Receive frames until one satisfies `predicate`, discarding the rest.
    pub async fn recv_matching<F>(&mut self, mut predicate: F) -> anyhow::Result<Value>
    where
        F: FnMut(&Value) -> bool,
    {
        loop {
            let frame = self.recv().await?;
            if predicate(&frame) {
                return Ok(frame);
            }
        }
    }

    /// Whether the server ends this connection within `dur`.
    pub async fn closed_within(&mut self, dur: Duration) -> bool {
        let closed = timeout(dur, async {
            loop {
                match self.ws.next().await {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        closed.is_ok()
    }
}
