//! QoS Engine - service QoS checks and agent-count enforcement
//!
//! Two independent paths share one resource store gateway:
//! - on-demand QoS checks predict, per agent, whether it should keep running
//!   a service instance, learning from SLA violations on the same agents;
//! - report listeners follow the created/updated operation report streams
//!   and scale a service's agent count up or down against its agreement.

pub mod actuator;
pub mod checker;
pub mod config;
pub mod enforcement;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod model;
pub mod prediction;
pub mod provider;
pub mod service;
pub mod subscription;
pub mod violations;

pub use actuator::{DryRunActuator, LifecycleManagerClient, ScalingActuator};
pub use checker::QosChecker;
pub use config::{Config, EventTransport};
pub use enforcement::{EnforcementConfig, IgnoreReason, QosEnforcer, ReportOutcome};
pub use error::{QosError, QosResult};
pub use gateway::{CimiGateway, ResourceGateway};
#[doc(hidden)]
pub use gateway::InMemoryGateway;
pub use metrics::Metrics;
pub use model::{
    Agent, Agreement, AlgorithmKind, QosModel, Service, ServiceInstance, ServiceOperationReport,
};
pub use prediction::{build_strategy, PredictionConfig, PredictionStrategy};
pub use provider::QosModelProvider;
pub use service::QosEngine;
pub use subscription::{
    Backoff, ListenerSummary, ReportListener, ReportSource, ReportStream, ReportStreamKind,
    StreamEvent,
};
pub use violations::collect_violations;
