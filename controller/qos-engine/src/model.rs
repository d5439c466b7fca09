//! Resource records consumed and produced by the QoS engine
//!
//! Field names follow the resource store's JSON (snake_case). Operation
//! reports additionally accept the camelCase keys emitted by the event
//! manager.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// Reference to another resource, e.g. `{"href": "service-instance/42"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub href: String,
}

impl ResourceRef {
    pub fn new(href: impl Into<String>) -> Self {
        Self { href: href.into() }
    }
}

/// A deployable application definition
///
/// Only the fields the engine reads are typed; everything else the store
/// returns is kept in `extra` so a PUT writes the record back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub num_agents: u32,
    #[serde(default)]
    pub sla_templates: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// An execution unit a service instance runs on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// QoS verdict: whether the agent is allowed to keep running the service
    #[serde(default = "default_allow")]
    pub allow: bool,
}

fn default_allow() -> bool {
    true
}

impl Agent {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: None,
            allow: true,
        }
    }

    /// An agent counts as healthy unless it reported a failure state.
    pub fn is_healthy(&self) -> bool {
        !matches!(
            self.status.as_deref().map(str::to_ascii_lowercase).as_deref(),
            Some("error") | Some("failed")
        )
    }
}

/// One running deployment of a service across a set of agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstance {
    pub id: String,
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agreement: Option<String>,
    #[serde(default)]
    pub agents: Vec<Agent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ServiceInstance {
    /// Agent urls as a set; two instances ran on the same agents iff their sets are equal.
    pub fn agent_set(&self) -> BTreeSet<String> {
        self.agents.iter().map(|a| a.url.clone()).collect()
    }

    pub fn num_agents(&self) -> u32 {
        u32::try_from(self.agents.len()).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guarantee {
    pub name: String,
    /// Free text with one embedded numeric threshold, e.g. `"execution_time < 60"`
    pub constraint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgreementDetails {
    #[serde(default)]
    pub guarantees: Vec<Guarantee>,
}

/// A contract of named guarantees bound to a service instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agreement {
    pub id: String,
    #[serde(default)]
    pub details: AgreementDetails,
}

impl Agreement {
    /// First guarantee whose name equals `name` exactly.
    pub fn guarantee(&self, name: &str) -> Option<&Guarantee> {
        self.details.guarantees.iter().find(|g| g.name == name)
    }
}

/// A recorded breach of an agreement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaViolation {
    pub id: String,
    pub agreement_id: ResourceRef,
}

/// One execution of a named operation, delivered by the event streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceOperationReport {
    pub id: String,
    #[serde(
        rename = "requestingApplicationId",
        alias = "requesting_application_id"
    )]
    pub requesting_application_id: ResourceRef,
    #[serde(rename = "operationName", alias = "operation_name")]
    pub operation_name: String,
    #[serde(rename = "startTime", alias = "start_time")]
    pub start_time: String,
    #[serde(rename = "expectedEndTime", alias = "expected_end_time")]
    pub expected_end_time: String,
}

/// Selects the prediction strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmKind {
    Heuristic,
    Learned,
}

impl AlgorithmKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmKind::Heuristic => "heuristic",
            AlgorithmKind::Learned => "learned",
        }
    }
}

impl fmt::Display for AlgorithmKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact-match identity of a QoS model
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QosModelKey {
    pub service_id: String,
    pub agents: BTreeSet<String>,
    pub algorithm: AlgorithmKind,
}

impl QosModelKey {
    pub fn new(service_id: impl Into<String>, agents: BTreeSet<String>, algorithm: AlgorithmKind) -> Self {
        Self {
            service_id: service_id.into(),
            agents,
            algorithm,
        }
    }
}

/// Per (service, agent set, algorithm) state used by a prediction strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QosModel {
    /// `None` until the record has been stored for the first time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub service: String,
    /// Sorted agent urls
    pub agents: Vec<String>,
    pub config: AlgorithmKind,
    #[serde(default)]
    pub num_service_instances: u32,
    #[serde(default)]
    pub num_service_failures: u32,
    /// One score per entry of `agents`
    #[serde(default)]
    pub state: Vec<f64>,
}

impl QosModel {
    /// Fresh model with empty state for `key`.
    pub fn seed(key: &QosModelKey) -> Self {
        Self {
            id: None,
            service: key.service_id.clone(),
            agents: key.agents.iter().cloned().collect(),
            config: key.algorithm,
            num_service_instances: 0,
            num_service_failures: 0,
            state: Vec::new(),
        }
    }

    pub fn key(&self) -> QosModelKey {
        QosModelKey::new(
            self.service.clone(),
            self.agents.iter().cloned().collect(),
            self.config,
        )
    }

    /// Score for the agent at `url`, if the model tracks it.
    pub fn score(&self, url: &str) -> Option<f64> {
        let idx = self.agents.iter().position(|a| a == url)?;
        self.state.get(idx).copied()
    }
}
