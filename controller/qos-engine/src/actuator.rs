//! Scaling actuator - asks the lifecycle manager for more agents
//!
//! Provides pluggable actuators. The HTTP implementation POSTs to the
//! lifecycle manager; the dry-run implementation only logs. Neither retries:
//! a failed attempt is reported as "not applied" and the caller moves on.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::{error, info};

/// Actuator trait - implement this to integrate with a lifecycle manager
#[async_trait]
pub trait ScalingActuator: Send + Sync {
    /// Request `num_agents` agents for the instance. `true` only when the
    /// lifecycle manager explicitly accepted the request.
    async fn request_more_agents(&self, num_agents: u32, service_instance_id: &str) -> bool;
}

/// Dry-run actuator: logs the request and reports it as not applied
pub struct DryRunActuator;

#[async_trait]
impl ScalingActuator for DryRunActuator {
    async fn request_more_agents(&self, num_agents: u32, service_instance_id: &str) -> bool {
        info!(
            service_instance = %service_instance_id,
            num_agents,
            "Scale-up request not sent (dry-run mode)"
        );
        false
    }
}

/// Payload sent to the lifecycle manager
#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    data: AgentRequestData<'a>,
}

#[derive(Debug, Serialize)]
struct AgentRequestData<'a> {
    #[serde(rename = "numAgents")]
    num_agents: u32,
    #[serde(rename = "serviceInstanceId")]
    service_instance_id: &'a str,
}

/// HTTP actuator - POSTs agent requests to the lifecycle manager
pub struct LifecycleManagerClient {
    endpoint: String,
    client: reqwest::Client,
}

impl LifecycleManagerClient {
    /// Create a new lifecycle manager client; every call is bounded by `timeout`
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build lifecycle manager HTTP client")?;

        Ok(Self { endpoint, client })
    }
}

#[async_trait]
impl ScalingActuator for LifecycleManagerClient {
    async fn request_more_agents(&self, num_agents: u32, service_instance_id: &str) -> bool {
        let request = AgentRequest {
            data: AgentRequestData {
                num_agents,
                service_instance_id,
            },
        };

        match self.client.post(&self.endpoint).json(&request).send().await {
            Ok(response) if response.status().is_success() => {
                info!(
                    service_instance = %service_instance_id,
                    num_agents,
                    status = %response.status(),
                    "Number of agents successfully updated in lifecycle manager"
                );
                true
            }
            Ok(response) => {
                let status = response.status();
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unable to read body>".to_string());
                error!(
                    service_instance = %service_instance_id,
                    num_agents,
                    status = %status,
                    body = %body,
                    "Lifecycle manager rejected agent request"
                );
                false
            }
            Err(e) => {
                error!(
                    service_instance = %service_instance_id,
                    num_agents,
                    error = %e,
                    timeout = e.is_timeout(),
                    "Error updating the number of agents in lifecycle manager"
                );
                false
            }
        }
    }
}
