//! Operation report subscriptions
//!
//! A [`ReportSource`] opens one event stream; a [`ReportListener`] keeps it
//! open for the life of the process, feeding every report to the enforcer
//! in delivery order and reconnecting with backoff when the stream drops.

mod jetstream;
mod sse;

pub use jetstream::{JetStreamReportSource, JetStreamSettings};
pub use sse::{SseDecoder, SseReportSource};

use crate::enforcement::QosEnforcer;
use crate::metrics::Metrics;
use crate::model::ServiceOperationReport;
use anyhow::Result;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::error::Elapsed;
use tracing::{debug, info, warn};

/// The two report streams the engine listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportStreamKind {
    Created,
    Updated,
}

impl ReportStreamKind {
    pub const ALL: [ReportStreamKind; 2] = [ReportStreamKind::Created, ReportStreamKind::Updated];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStreamKind::Created => "created",
            ReportStreamKind::Updated => "updated",
        }
    }

    /// Path appended to the event manager URL
    pub fn sse_path(&self) -> &'static str {
        match self {
            ReportStreamKind::Created => "/events/service-operation-report/created",
            ReportStreamKind::Updated => "/events/service-operation-report/updated",
        }
    }

    /// JetStream subject carrying this stream
    pub fn subject(&self) -> &'static str {
        match self {
            ReportStreamKind::Created => "service-operation-report.created",
            ReportStreamKind::Updated => "service-operation-report.updated",
        }
    }
}

impl fmt::Display for ReportStreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item delivered by a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Report(ServiceOperationReport),
    /// Payload that is not an operation report; skipped without reconnecting
    Undecodable(String),
}

/// `Err` items are transport failures and end the current subscription
pub type ReportStream = BoxStream<'static, Result<StreamEvent>>;

#[async_trait]
pub trait ReportSource: Send + Sync {
    fn kind(&self) -> ReportStreamKind;

    /// Open the subscription
    async fn subscribe(&self) -> Result<ReportStream>;
}

/// Decode an event payload: either a bare report or an event envelope
/// carrying the report under `content.resource`.
pub fn decode_event(payload: &[u8]) -> StreamEvent {
    let value: Value = match serde_json::from_slice(payload) {
        Ok(value) => value,
        Err(e) => return StreamEvent::Undecodable(format!("invalid JSON: {}", e)),
    };
    let resource = match value.pointer("/content/resource") {
        Some(resource) if resource.is_object() => resource.clone(),
        _ => value,
    };
    match serde_json::from_value(resource) {
        Ok(report) => StreamEvent::Report(report),
        Err(e) => StreamEvent::Undecodable(format!("not an operation report: {}", e)),
    }
}

/// Reconnect delays: start at `initial`, double per failed attempt, cap at `max`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn next(&self, current: Duration) -> Duration {
        current.saturating_mul(2).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(10),
            max: Duration::from_secs(60),
        }
    }
}

/// Listener states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    Connecting,
    Streaming,
    ReconnectBackoff,
}

/// Totals reported by a listener when it shuts down
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerSummary {
    pub processed: u64,
    pub ignored: u64,
    pub undecodable: u64,
    pub reconnects: u64,
}

/// Long-lived consumer of one report stream
pub struct ReportListener {
    source: Arc<dyn ReportSource>,
    enforcer: QosEnforcer,
    backoff: Backoff,
    idle_timeout: Option<Duration>,
    metrics: Metrics,
}

impl ReportListener {
    pub fn new(
        source: Arc<dyn ReportSource>,
        enforcer: QosEnforcer,
        backoff: Backoff,
        metrics: Metrics,
    ) -> Self {
        Self {
            source,
            enforcer,
            backoff,
            idle_timeout: None,
            metrics,
        }
    }

    /// Drop an open stream that delivers nothing for `idle` and reconnect.
    /// A half-open connection would otherwise keep the listener streaming forever.
    pub fn with_idle_timeout(mut self, idle: Option<Duration>) -> Self {
        self.idle_timeout = idle;
        self
    }

    /// Run until `shutdown` flips to `true` (or its sender is dropped).
    ///
    /// A report already being evaluated finishes before shutdown is observed;
    /// the subscription is dropped on the way out.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> ListenerSummary {
        let stream_name = self.source.kind();
        let mut summary = ListenerSummary::default();
        let mut delay = self.backoff.initial;

        loop {
            if *shutdown.borrow() {
                break;
            }

            debug!(stream = %stream_name, state = ?ListenerState::Connecting, "Opening report stream");
            let subscription = tokio::select! {
                result = self.source.subscribe() => result,
                _ = shutdown.changed() => break,
            };

            match subscription {
                Ok(mut stream) => {
                    info!(stream = %stream_name, state = ?ListenerState::Streaming, "Subscribed to report stream");
                    delay = self.backoff.initial;

                    loop {
                        tokio::select! {
                            item = next_event(&mut stream, self.idle_timeout) => match item {
                                Ok(Some(Ok(StreamEvent::Report(report)))) => {
                                    self.handle_report(&report, &mut summary).await;
                                }
                                Ok(Some(Ok(StreamEvent::Undecodable(reason)))) => {
                                    warn!(stream = %stream_name, reason = %reason, "Skipping undecodable event");
                                    summary.undecodable += 1;
                                    self.metrics.record_decode_error(stream_name.as_str());
                                }
                                Ok(Some(Err(e))) => {
                                    warn!(stream = %stream_name, error = %e, "Report stream failed");
                                    break;
                                }
                                Ok(None) => {
                                    warn!(stream = %stream_name, "Report stream ended");
                                    break;
                                }
                                Err(_) => {
                                    warn!(
                                        stream = %stream_name,
                                        idle_secs = self.idle_timeout.map(|d| d.as_secs()).unwrap_or_default(),
                                        "Report stream idle, dropping connection"
                                    );
                                    break;
                                }
                            },
                            _ = shutdown.changed() => {
                                info!(stream = %stream_name, "Releasing report stream");
                                return summary;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(stream = %stream_name, error = %e, "Failed to open report stream");
                }
            }

            summary.reconnects += 1;
            self.metrics.record_reconnect(stream_name.as_str());
            warn!(
                stream = %stream_name,
                state = ?ListenerState::ReconnectBackoff,
                backoff_ms = delay.as_millis() as u64,
                "Reconnecting after backoff"
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => break,
            }
            delay = self.backoff.next(delay);
        }

        info!(stream = %stream_name, ?summary, "Report listener stopped");
        summary
    }

    async fn handle_report(&self, report: &ServiceOperationReport, summary: &mut ListenerSummary) {
        let outcome = self.enforcer.evaluate_report(report).await;
        if outcome.is_processed() {
            summary.processed += 1;
        } else {
            summary.ignored += 1;
        }
        self.metrics
            .record_report(self.source.kind().as_str(), outcome.label());
        debug!(report = %report.id, outcome = ?outcome, "Report handled");
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<ListenerSummary> {
        tokio::spawn(self.run(shutdown))
    }
}

async fn next_event(
    stream: &mut ReportStream,
    idle: Option<Duration>,
) -> Result<Option<Result<StreamEvent>>, Elapsed> {
    match idle {
        Some(idle) => tokio::time::timeout(idle, stream.next()).await,
        None => Ok(stream.next().await),
    }
}
