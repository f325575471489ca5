//! Gateway - TCP/TLS listener that upgrades connections to WebSocket sessions.
//!
//! The Gateway binds one socket and spawns a task per accepted client. Each
//! task runs the optional TLS handshake, then the WebSocket upgrade. The
//! upgrade request is checked for path, Origin and credential before the
//! 101 response is sent; a rejected request gets a plain HTTP error and no
//! session is ever created.

use std::io::{BufReader, Cursor};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use http::header::{AUTHORIZATION, ORIGIN};
use rustls_pemfile::{certs, private_key};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::auth::{AuthError, Authenticator, bearer_token};
use crate::config::{ListenConfig, TlsConfig};
use crate::metrics;
use crate::network::Connection;
use crate::protocol::UserId;
use crate::state::Hub;
use crate::telemetry::spans;

/// Upper bound on TLS handshake plus WebSocket upgrade for one client.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// The Gateway accepts incoming TCP/TLS connections and spawns sessions.
pub struct Gateway {
    listener: TcpListener,
    tls: Option<TlsAcceptor>,
    upgrader: Upgrader,
}

impl Gateway {
    /// Bind the gateway to the configured address.
    pub async fn bind(
        listen: ListenConfig,
        tls_config: Option<TlsConfig>,
        auth: Arc<dyn Authenticator>,
        hub: Arc<Hub>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(listen.address).await?;
        let tls = match tls_config {
            Some(ref cfg) => Some(Self::load_tls(cfg)?),
            None => None,
        };
        info!(
            address = %listener.local_addr()?,
            path = %listen.path,
            tls = tls.is_some(),
            "WebSocket listener bound"
        );

        Ok(Self {
            listener,
            tls,
            upgrader: Upgrader {
                listen: Arc::new(listen),
                auth,
                hub,
            },
        })
    }

    #[cfg(test)]
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Load TLS certificates and create TlsAcceptor.
    fn load_tls(config: &TlsConfig) -> anyhow::Result<TlsAcceptor> {
        let cert_file = std::fs::read(&config.cert_path)?;
        let cert_reader = &mut BufReader::new(Cursor::new(cert_file));
        let certs: Vec<CertificateDer> = certs(cert_reader).collect::<Result<Vec<_>, _>>()?;

        if certs.is_empty() {
            anyhow::bail!("No certificates found in {}", config.cert_path);
        }

        let key_file = std::fs::read(&config.key_path)?;
        let key_reader = &mut BufReader::new(Cursor::new(key_file));
        let Some(key) = private_key(key_reader)? else {
            anyhow::bail!("No private keys found in {}", config.key_path);
        };

        let tls_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)?;

        Ok(TlsAcceptor::from(Arc::new(tls_config)))
    }

    /// Accept connections until `shutdown` fires.
    ///
    /// Sessions already running are not touched; the hub closes those.
    #[instrument(skip_all, name = "gateway")]
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            let (stream, addr) = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Gateway stopping");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                        continue;
                    }
                },
            };

            debug!(%addr, "Connection accepted");
            let span = spans::upgrade(&addr, self.tls.is_some());
            let upgrader = self.upgrader.clone();
            let tls = self.tls.clone();
            tokio::spawn(upgrader.serve(stream, addr, tls).instrument(span));
        }
    }
}

/// Why an upgrade request was refused.
#[derive(Debug)]
enum Rejection {
    WrongPath,
    OriginNotAllowed,
    Unauthorized(AuthError),
}

impl Rejection {
    fn reason(&self) -> &'static str {
        match self {
            Self::WrongPath => "not_found",
            Self::OriginNotAllowed => "forbidden_origin",
            Self::Unauthorized(_) => "unauthorized",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::WrongPath => StatusCode::NOT_FOUND,
            Self::OriginNotAllowed => StatusCode::FORBIDDEN,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        }
    }

    fn record(&self) {
        metrics::upgrade_rejected(self.reason());
        match self {
            Self::WrongPath => debug!("Upgrade rejected: wrong path"),
            Self::OriginNotAllowed => warn!("Upgrade rejected: origin not allowed"),
            Self::Unauthorized(e) => {
                metrics::auth_failure(e.error_code());
                info!(error = %e, code = e.error_code(), "Upgrade rejected: authentication failed");
            }
        }
    }

    fn into_response(self) -> ErrorResponse {
        let body = match &self {
            Self::WrongPath => "not found".to_string(),
            Self::OriginNotAllowed => "origin not allowed".to_string(),
            Self::Unauthorized(e) => e.to_string(),
        };
        let mut response = ErrorResponse::new(Some(body));
        *response.status_mut() = self.status();
        response
    }
}

/// Per-connection upgrade logic, cloned into each accept task.
#[derive(Clone)]
struct Upgrader {
    listen: Arc<ListenConfig>,
    auth: Arc<dyn Authenticator>,
    hub: Arc<Hub>,
}

impl Upgrader {
    async fn serve(self, stream: TcpStream, addr: SocketAddr, tls: Option<TlsAcceptor>) {
        let Some(acceptor) = tls else {
            self.upgrade(stream, addr).await;
            return;
        };
        match timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
            Ok(Ok(tls_stream)) => self.upgrade(tls_stream, addr).await,
            Ok(Err(e)) => warn!(error = %e, "TLS handshake failed"),
            Err(_) => warn!("TLS handshake timed out"),
        }
    }

    async fn upgrade<S>(self, stream: S, addr: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut user = None;
        let callback = |req: &Request, response: Response| match self.authorize(req) {
            Ok(id) => {
                user = Some(id);
                Ok(response)
            }
            Err(rejection) => {
                rejection.record();
                Err(rejection.into_response())
            }
        };

        let handshake = accept_hdr_async_with_config(stream, callback, Some(self.ws_config()));
        let ws = match timeout(HANDSHAKE_TIMEOUT, handshake).await {
            Ok(Ok(ws)) => ws,
            Ok(Err(e)) => {
                debug!(error = %e, "WebSocket upgrade failed");
                return;
            }
            Err(_) => {
                warn!("WebSocket upgrade timed out");
                metrics::upgrade_rejected("timeout");
                return;
            }
        };
        let Some(user) = user else {
            return;
        };

        info!(%user, "WebSocket upgrade accepted");
        Connection::new(ws, user, addr, self.hub).run().await;
    }

    fn ws_config(&self) -> WebSocketConfig {
        let max = self.hub.settings().max_message_bytes;
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(max);
        config.max_frame_size = Some(max);
        config
    }

    /// Check path, Origin and credential of an upgrade request.
    fn authorize(&self, req: &Request) -> Result<UserId, Rejection> {
        if req.uri().path() != self.listen.path {
            return Err(Rejection::WrongPath);
        }

        let origin = req.headers().get(ORIGIN).and_then(|v| v.to_str().ok());
        if !self.listen.origin_allowed(origin) {
            return Err(Rejection::OriginNotAllowed);
        }

        let credential = req
            .uri()
            .query()
            .and_then(|q| query_param(q, "token"))
            .or_else(|| {
                req.headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(bearer_token)
            })
            .ok_or(Rejection::Unauthorized(AuthError::MissingCredential))?;

        self.auth
            .authenticate(credential)
            .map_err(Rejection::Unauthorized)
    }
}

/// Value of the first `name=value` pair in a query string.
fn query_param<'a>(query: &'a str, name: &str) -> Option<&'a str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}
