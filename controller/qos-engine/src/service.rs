//! QoS engine service - wires the checker, the enforcer and the report listeners

use crate::actuator::{DryRunActuator, LifecycleManagerClient, ScalingActuator};
use crate::checker::QosChecker;
use crate::config::{Config, EventTransport};
use crate::enforcement::{QosEnforcer, ReportOutcome};
use crate::error::QosResult;
use crate::gateway::{CimiGateway, ResourceGateway};
use crate::metrics::Metrics;
use crate::model::{ServiceInstance, ServiceOperationReport};
use crate::prediction::build_strategy;
use crate::subscription::{
    Backoff, JetStreamReportSource, ListenerSummary, ReportListener, ReportSource,
    ReportStreamKind, SseReportSource,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

pub struct QosEngine {
    checker: QosChecker,
    enforcer: QosEnforcer,
    sources: Vec<Arc<dyn ReportSource>>,
    backoff: Backoff,
    idle_timeout: Option<Duration>,
    metrics: Metrics,
}

impl QosEngine {
    /// Assemble the engine from already-built collaborators
    pub fn new(
        gateway: Arc<dyn ResourceGateway>,
        actuator: Arc<dyn ScalingActuator>,
        sources: Vec<Arc<dyn ReportSource>>,
        config: &Config,
    ) -> Self {
        let metrics = Metrics;
        let checker = QosChecker::new(gateway.clone(), build_strategy(&config.prediction()), metrics);
        let enforcer = QosEnforcer::new(gateway, actuator, config.enforcement(), metrics);

        Self {
            checker,
            enforcer,
            sources,
            backoff: config.backoff(),
            idle_timeout: config.stream_idle_timeout(),
            metrics,
        }
    }

    /// Build the engine against the configured resource store, lifecycle
    /// manager and event transport
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let gateway: Arc<dyn ResourceGateway> = Arc::new(
            CimiGateway::new(config.cimi_url.clone(), config.request_timeout())
                .context("Failed to create resource store client")?,
        );

        let actuator: Arc<dyn ScalingActuator> = match &config.lifecycle_manager_url {
            Some(endpoint) if config.has_lifecycle_manager() => {
                info!(endpoint = %endpoint, "Using lifecycle manager actuator");
                Arc::new(LifecycleManagerClient::new(
                    endpoint.clone(),
                    config.request_timeout(),
                )?)
            }
            _ => {
                info!("Using dry-run actuator");
                Arc::new(DryRunActuator)
            }
        };

        let mut sources: Vec<Arc<dyn ReportSource>> = Vec::new();
        for kind in ReportStreamKind::ALL {
            let source: Arc<dyn ReportSource> = match config.event_transport {
                EventTransport::Sse => Arc::new(SseReportSource::new(
                    kind,
                    &config.event_manager_url,
                    config.request_timeout(),
                )?),
                EventTransport::Jetstream => {
                    Arc::new(JetStreamReportSource::new(kind, config.jetstream()))
                }
            };
            sources.push(source);
        }

        Ok(Self::new(gateway, actuator, sources, config))
    }

    /// On-demand QoS check for one service instance
    pub async fn check_qos(&self, service_instance_id: &str) -> QosResult<ServiceInstance> {
        self.checker.check_qos(service_instance_id).await
    }

    /// Evaluate a single report outside of any stream
    pub async fn evaluate_report(&self, report: &ServiceOperationReport) -> ReportOutcome {
        self.enforcer.evaluate_report(report).await
    }

    /// Start one listener task per report stream
    pub fn spawn_listeners(
        &self,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<ListenerSummary>> {
        self.sources
            .iter()
            .map(|source| {
                info!(stream = %source.kind(), "Starting report listener");
                ReportListener::new(
                    source.clone(),
                    self.enforcer.clone(),
                    self.backoff,
                    self.metrics,
                )
                .with_idle_timeout(self.idle_timeout)
                .spawn(shutdown.clone())
            })
            .collect()
    }
}
