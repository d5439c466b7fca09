//! QoS enforcement - decides the agent count for a service from one operation report
//!
//! Every missing or malformed dependency short-circuits into
//! [`ReportOutcome::Ignored`]; nothing here returns an error to the stream
//! listener, so a bad report never stops the stream.

use crate::actuator::ScalingActuator;
use crate::error::{QosError, QosResult};
use crate::gateway::ResourceGateway;
use crate::metrics::Metrics;
use crate::model::{Service, ServiceOperationReport};
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d.]").expect("valid regex"));

/// Scaling thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnforcementConfig {
    /// Services at or above this agent count are never scaled
    pub max_agents: u32,
    /// Scale-up multiplies and scale-down divides the agent count by this
    pub mul_factor: u32,
}

impl Default for EnforcementConfig {
    fn default() -> Self {
        Self {
            max_agents: 8,
            mul_factor: 2,
        }
    }
}

/// Why a report led to no decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    InstanceNotFound,
    ServiceNotFound,
    AgentCapReached,
    AgreementNotFound,
    MalformedTimestamp,
    GuaranteeNotFound,
    MalformedConstraint,
    ActuationFailed,
    /// The service disappeared between reading and writing its agent count
    ServiceRemoved,
    UpstreamUnavailable,
}

impl IgnoreReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IgnoreReason::InstanceNotFound => "instance_not_found",
            IgnoreReason::ServiceNotFound => "service_not_found",
            IgnoreReason::AgentCapReached => "agent_cap_reached",
            IgnoreReason::AgreementNotFound => "agreement_not_found",
            IgnoreReason::MalformedTimestamp => "malformed_timestamp",
            IgnoreReason::GuaranteeNotFound => "guarantee_not_found",
            IgnoreReason::MalformedConstraint => "malformed_constraint",
            IgnoreReason::ActuationFailed => "actuation_failed",
            IgnoreReason::ServiceRemoved => "service_removed",
            IgnoreReason::UpstreamUnavailable => "upstream_unavailable",
        }
    }
}

impl fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of evaluating one report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// The service's agent count was changed and persisted
    Scaled { from: u32, to: u32 },
    /// A decision was made but the recorded count already matched it
    Unchanged { agents: u32 },
    /// No decision could be made
    Ignored(IgnoreReason),
}

impl ReportOutcome {
    /// `true` when the report was evaluated, `false` when it was skipped
    pub fn is_processed(&self) -> bool {
        !matches!(self, ReportOutcome::Ignored(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReportOutcome::Scaled { .. } => "scaled",
            ReportOutcome::Unchanged { .. } => "unchanged",
            ReportOutcome::Ignored(reason) => reason.as_str(),
        }
    }
}

/// Seconds between the report's start and expected end
pub fn expected_duration_secs(report: &ServiceOperationReport) -> QosResult<i64> {
    let start = DateTime::parse_from_rfc3339(&report.start_time)
        .map_err(|e| QosError::malformed("startTime", format!("{}: {}", report.start_time, e)))?;
    let end = DateTime::parse_from_rfc3339(&report.expected_end_time).map_err(|e| {
        QosError::malformed(
            "expectedEndTime",
            format!("{}: {}", report.expected_end_time, e),
        )
    })?;
    Ok((end - start).num_seconds())
}

/// Numeric threshold of a guarantee constraint: every character that is not
/// a digit or a dot is dropped and the rest must parse as an integer.
pub fn constraint_value(constraint: &str) -> QosResult<i64> {
    let digits = NON_NUMERIC.replace_all(constraint, "");
    digits
        .parse::<i64>()
        .map_err(|e| QosError::malformed("constraint", format!("{:?}: {}", constraint, e)))
}

pub fn scale_up_target(current: u32, mul_factor: u32) -> u32 {
    current.saturating_mul(mul_factor).max(1)
}

pub fn scale_down_target(current: u32, mul_factor: u32) -> u32 {
    (current / mul_factor.max(1)).max(1)
}

#[derive(Clone)]
pub struct QosEnforcer {
    gateway: Arc<dyn ResourceGateway>,
    actuator: Arc<dyn ScalingActuator>,
    config: EnforcementConfig,
    metrics: Metrics,
}

impl QosEnforcer {
    pub fn new(
        gateway: Arc<dyn ResourceGateway>,
        actuator: Arc<dyn ScalingActuator>,
        config: EnforcementConfig,
        metrics: Metrics,
    ) -> Self {
        Self {
            gateway,
            actuator,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &EnforcementConfig {
        &self.config
    }

    /// Evaluate one operation report and apply the resulting agent count
    pub async fn evaluate_report(&self, report: &ServiceOperationReport) -> ReportOutcome {
        info!(report = %report.id, "Checking service operation report");
        match self.decide(report).await {
            Ok(outcome) => outcome,
            Err(reason) => ReportOutcome::Ignored(reason),
        }
    }

    async fn decide(&self, report: &ServiceOperationReport) -> Result<ReportOutcome, IgnoreReason> {
        let instance_ref = &report.requesting_application_id.href;
        let instance = self
            .gateway
            .get_service_instance(instance_ref)
            .await
            .map_err(|e| upstream(report, e))?
            .ok_or_else(|| {
                error!(report = %report.id, instance = %instance_ref, "No service-instance found, ignoring QoS enforcement");
                IgnoreReason::InstanceNotFound
            })?;

        let service = self
            .gateway
            .get_service(&instance.service)
            .await
            .map_err(|e| upstream(report, e))?
            .ok_or_else(|| {
                error!(report = %report.id, service = %instance.service, "No service found, ignoring QoS enforcement");
                IgnoreReason::ServiceNotFound
            })?;

        if service.num_agents >= self.config.max_agents {
            info!(
                service = %service.id,
                num_agents = service.num_agents,
                max_agents = self.config.max_agents,
                "Service already has the maximum number of agents"
            );
            return Err(IgnoreReason::AgentCapReached);
        }

        let agreement_id = instance.agreement.as_deref().ok_or_else(|| {
            error!(report = %report.id, instance = %instance.id, "Service-instance has no agreement, ignoring QoS enforcement");
            IgnoreReason::AgreementNotFound
        })?;
        let agreement = self
            .gateway
            .get_agreement(agreement_id)
            .await
            .map_err(|e| upstream(report, e))?
            .ok_or_else(|| {
                error!(report = %report.id, agreement = %agreement_id, "No agreement found, ignoring QoS enforcement");
                IgnoreReason::AgreementNotFound
            })?;

        let expected_duration = expected_duration_secs(report).map_err(|e| {
            error!(report = %report.id, error = %e, "Error with timestamps");
            IgnoreReason::MalformedTimestamp
        })?;

        let guarantee = agreement.guarantee(&report.operation_name).ok_or_else(|| {
            error!(
                agreement = %agreement.id,
                operation = %report.operation_name,
                "No guarantee found for operation"
            );
            IgnoreReason::GuaranteeNotFound
        })?;
        let agreement_value = constraint_value(&guarantee.constraint).map_err(|e| {
            error!(agreement = %agreement.id, error = %e, "Error with constraint value");
            IgnoreReason::MalformedConstraint
        })?;

        info!(
            report = %report.id,
            expected_duration_secs = expected_duration,
            agreement_value_secs = agreement_value,
            "Compared expected duration with agreement"
        );

        let current = instance.num_agents();
        let target = if expected_duration > agreement_value {
            let target = scale_up_target(current, self.config.mul_factor);
            let applied = self.actuator.request_more_agents(target, &instance.id).await;
            self.metrics.record_actuation(applied);
            if !applied {
                warn!(
                    service_instance = %instance.id,
                    num_agents = target,
                    "Scale-up not applied by lifecycle manager; keeping recorded agent count"
                );
                return Err(IgnoreReason::ActuationFailed);
            }
            target
        } else {
            scale_down_target(current, self.config.mul_factor)
        };

        self.record_agent_count(report, service, target).await
    }

    async fn record_agent_count(
        &self,
        report: &ServiceOperationReport,
        service: Service,
        target: u32,
    ) -> Result<ReportOutcome, IgnoreReason> {
        let from = service.num_agents;
        if from == target {
            return Ok(ReportOutcome::Unchanged { agents: target });
        }

        info!(service = %service.id, from, to = target, "Updating num_agents");
        let updated = Service {
            num_agents: target,
            ..service
        };
        match self.gateway.put_service(&updated).await {
            Ok(()) => Ok(ReportOutcome::Scaled { from, to: target }),
            Err(QosError::NotFound { .. }) => {
                warn!(
                    report = %report.id,
                    service = %updated.id,
                    "Service removed before num_agents could be written, ignoring QoS enforcement"
                );
                Err(IgnoreReason::ServiceRemoved)
            }
            Err(e) => Err(upstream(report, e)),
        }
    }
}

fn upstream(report: &ServiceOperationReport, e: QosError) -> IgnoreReason {
    error!(report = %report.id, error = %e, "Resource store call failed, ignoring QoS enforcement");
    match e {
        QosError::NotFound { .. } => IgnoreReason::ServiceNotFound,
        _ => IgnoreReason::UpstreamUnavailable,
    }
}
