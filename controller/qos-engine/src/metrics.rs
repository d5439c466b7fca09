//! Outcome counters for the QoS engine
//!
//! Recorded through the `metrics` facade; whichever recorder the embedding
//! process installs receives them. Without a recorder the calls are no-ops.

use metrics::counter;
use tracing::debug;

/// Metrics collector shared by the checker, the enforcer and the listeners
#[derive(Debug, Clone, Copy, Default)]
pub struct Metrics;

impl Metrics {
    /// Record how one operation report was handled
    pub fn record_report(&self, stream: &str, outcome: &str) {
        counter!("qos_reports_total", 1,
            "stream" => stream.to_string(),
            "outcome" => outcome.to_string()
        );
        debug!(stream = %stream, outcome = %outcome, "Recorded report outcome");
    }

    /// Record a lifecycle manager call result
    pub fn record_actuation(&self, success: bool) {
        counter!("qos_actuations_total", 1,
            "result" => if success { "applied" } else { "rejected" }
        );
    }

    /// Record a QoS check result (`ok` or an error kind)
    pub fn record_check(&self, result: &str) {
        counter!("qos_checks_total", 1, "result" => result.to_string());
    }

    /// Record a listener entering reconnect-backoff
    pub fn record_reconnect(&self, stream: &str) {
        counter!("qos_stream_reconnects_total", 1, "stream" => stream.to_string());
    }

    /// Record an event that could not be decoded
    pub fn record_decode_error(&self, stream: &str) {
        counter!("qos_stream_decode_errors_total", 1, "stream" => stream.to_string());
    }
}
