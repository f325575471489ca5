//! Telemetry utilities for dispatch timing and connection spans.

use std::time::Instant;

/// Guard for timing envelope dispatch and recording metrics.
///
/// Records dispatch latency when dropped.
pub struct DispatchTimer {
    kind: &'static str,
    start: Instant,
}

impl DispatchTimer {
    /// Start timing a dispatch of envelope type `kind`.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            start: Instant::now(),
        }
    }
}

impl Drop for DispatchTimer {
    fn drop(&mut self) {
        let duration = self.start.elapsed().as_secs_f64();
        crate::metrics::record_dispatch(self.kind, duration);
    }
}

/// Standardized span constructors.
pub mod spans {
    use std::net::SocketAddr;
    use tracing::{Span, info_span};

    /// Span covering one accepted socket from TCP accept to upgrade outcome.
    pub fn upgrade(addr: &SocketAddr, tls: bool) -> Span {
        info_span!("upgrade", addr = %addr, tls)
    }
}
