//! Prometheus metrics collection for merehub.
//!
//! Exposed on the `/metrics` HTTP endpoint (see [`crate::http`]). Tracks
//! session lifecycle, envelope throughput, fan-out and backpressure drops.
//!
//! ## Hub Metrics
//!
//! - `merehub_sessions_active` - Registered sessions (gauge)
//! - `merehub_sessions_closed_total{reason}` - Sessions torn down by reason
//! - `merehub_envelopes_total{type}` - Inbound envelopes by type
//! - `merehub_dispatch_duration_seconds{type}` - Dispatch latency histogram
//! - `merehub_frames_dropped_total{type}` - Frames dropped on full queues
//! - `merehub_fanout_recipients` - Recipients per broadcast (histogram)

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};
use std::sync::OnceLock;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

pub fn registry() -> &'static Registry {
    REGISTRY.get_or_init(Registry::new)
}

// ========================================================================
// Counters (monotonic increasing)
// ========================================================================

/// Sessions that completed the upgrade and registered.
pub static SESSIONS_OPENED: OnceLock<IntCounter> = OnceLock::new();

/// Sessions torn down, by close reason.
pub static SESSIONS_CLOSED: OnceLock<IntCounterVec> = OnceLock::new();

/// Upgrade requests refused before a session existed, by reason.
pub static UPGRADES_REJECTED: OnceLock<IntCounterVec> = OnceLock::new();

/// Credential validation failures, by error code.
pub static AUTH_FAILURES: OnceLock<IntCounterVec> = OnceLock::new();

/// Chat messages persisted.
pub static MESSAGES_PERSISTED: OnceLock<IntCounter> = OnceLock::new();

// ========================================================================
// Gauges (can increase/decrease)
// ========================================================================

/// Currently active sessions.
pub static SESSIONS_ACTIVE: OnceLock<IntGauge> = OnceLock::new();

// ========================================================================
// Dispatch & Delivery
// ========================================================================

/// Inbound envelopes by type.
pub static ENVELOPES: OnceLock<IntCounterVec> = OnceLock::new();

/// Envelope dispatch latency by type.
pub static DISPATCH_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Dispatch errors by envelope type and error code.
pub static DISPATCH_ERRORS: OnceLock<IntCounterVec> = OnceLock::new();

/// Frames written to a socket, by frame type.
pub static FRAMES_SENT: OnceLock<IntCounterVec> = OnceLock::new();

/// Frames dropped because a recipient queue was full, by frame type.
pub static FRAMES_DROPPED: OnceLock<IntCounterVec> = OnceLock::new();

/// Recipients resolved per broadcast.
pub static FANOUT: OnceLock<Histogram> = OnceLock::new();

/// Initialize the Prometheus metrics registry.
///
/// Must be called once at server startup before any metrics are recorded.
/// Recording before `init` is a silent no-op.
pub fn init() {
    let r = registry();

    macro_rules! register {
        ($metric:ident, $init:expr) => {
            match $init {
                Ok(m) => {
                    if let Err(e) = r.register(Box::new(m.clone())) {
                        tracing::warn!(error = %e, concat!("Failed to register metric ", stringify!($metric)));
                    }
                    let _ = $metric.set(m);
                }
                Err(e) => {
                    tracing::error!(error = %e, concat!("Failed to create metric ", stringify!($metric)));
                }
            }
        };
    }

    register!(SESSIONS_OPENED, IntCounter::new("merehub_sessions_opened_total", "Sessions opened"));
    register!(SESSIONS_CLOSED, IntCounterVec::new(Opts::new("merehub_sessions_closed_total", "Sessions closed by reason"), &["reason"]));
    register!(UPGRADES_REJECTED, IntCounterVec::new(Opts::new("merehub_upgrades_rejected_total", "Upgrade requests rejected by reason"), &["reason"]));
    register!(AUTH_FAILURES, IntCounterVec::new(Opts::new("merehub_auth_failures_total", "Credential validation failures"), &["code"]));
    register!(MESSAGES_PERSISTED, IntCounter::new("merehub_messages_persisted_total", "Chat messages persisted"));
    register!(SESSIONS_ACTIVE, IntGauge::new("merehub_sessions_active", "Currently active sessions"));

    register!(ENVELOPES, IntCounterVec::new(Opts::new("merehub_envelopes_total", "Inbound envelopes by type"), &["type"]));
    register!(DISPATCH_LATENCY, HistogramVec::new(
        HistogramOpts::new("merehub_dispatch_duration_seconds", "Envelope dispatch latency by type")
            .buckets(vec![0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5]),
        &["type"]));
    register!(DISPATCH_ERRORS, IntCounterVec::new(Opts::new("merehub_dispatch_errors_total", "Dispatch errors by type and code"), &["type", "error"]));
    register!(FRAMES_SENT, IntCounterVec::new(Opts::new("merehub_frames_sent_total", "Frames written to sockets"), &["type"]));
    register!(FRAMES_DROPPED, IntCounterVec::new(Opts::new("merehub_frames_dropped_total", "Frames dropped on full queues"), &["type"]));
    register!(FANOUT, Histogram::with_opts(
        HistogramOpts::new("merehub_fanout_recipients", "Recipients per broadcast")
            .buckets(vec![1.0, 2.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 1000.0])));
}

/// Gather all metrics and encode them in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = registry().gather();
    let mut buffer = vec![];
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode Prometheus metrics");
        return String::new();
    }
    match String::from_utf8(buffer) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "Prometheus metrics were not valid UTF-8");
            String::new()
        }
    }
}

// ============================================================================
// Helper functions for metric updates
// ============================================================================

fn inc_labeled(metric: &OnceLock<IntCounterVec>, labels: &[&str]) {
    if let Some(c) = metric.get() {
        c.with_label_values(labels).inc();
    }
}

#[inline]
pub fn session_opened() {
    if let Some(c) = SESSIONS_OPENED.get() {
        c.inc();
    }
    if let Some(g) = SESSIONS_ACTIVE.get() {
        g.inc();
    }
}

#[inline]
pub fn session_closed(reason: &str) {
    inc_labeled(&SESSIONS_CLOSED, &[reason]);
    if let Some(g) = SESSIONS_ACTIVE.get() {
        g.dec();
    }
}

#[inline]
pub fn upgrade_rejected(reason: &str) {
    inc_labeled(&UPGRADES_REJECTED, &[reason]);
}

#[inline]
pub fn auth_failure(code: &str) {
    inc_labeled(&AUTH_FAILURES, &[code]);
}

#[inline]
pub fn message_persisted() {
    if let Some(c) = MESSAGES_PERSISTED.get() {
        c.inc();
    }
}

/// Record an envelope dispatch with latency.
#[inline]
pub fn record_dispatch(kind: &str, duration_secs: f64) {
    inc_labeled(&ENVELOPES, &[kind]);
    if let Some(h) = DISPATCH_LATENCY.get() {
        h.with_label_values(&[kind]).observe(duration_secs);
    }
}

#[inline]
pub fn record_dispatch_error(kind: &str, error: &str) {
    inc_labeled(&DISPATCH_ERRORS, &[kind, error]);
}

#[inline]
pub fn frame_sent(kind: &str) {
    inc_labeled(&FRAMES_SENT, &[kind]);
}

#[inline]
pub fn frame_dropped(kind: &str) {
    inc_labeled(&FRAMES_DROPPED, &[kind]);
}

/// Record how many sessions a broadcast resolved to.
#[inline]
pub fn record_fanout(recipients: usize) {
    if let Some(h) = FANOUT.get() {
        h.observe(recipients as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_lifecycle() {
        init();

        record_dispatch("message", 0.001);
        record_dispatch_error("message", "not_member");
        frame_dropped("typing");
        record_fanout(3);

        let output = gather_metrics();
        assert!(output.contains("merehub_envelopes_total"));
        assert!(output.contains("merehub_dispatch_errors_total"));
        assert!(output.contains("merehub_frames_dropped_total"));
    }
}
