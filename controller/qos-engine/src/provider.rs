//! QoS model provider - identity and storage layer in front of the prediction strategies

use crate::error::QosResult;
use crate::gateway::ResourceGateway;
use crate::model::{AlgorithmKind, QosModel, QosModelKey};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct QosModelProvider {
    gateway: Arc<dyn ResourceGateway>,
}

impl QosModelProvider {
    pub fn new(gateway: Arc<dyn ResourceGateway>) -> Self {
        Self { gateway }
    }

    /// Stored model for the exact (service, agents, algorithm) key, or a
    /// freshly seeded one that is not stored until [`persist`](Self::persist).
    pub async fn get_or_create(
        &self,
        service_id: &str,
        agents: BTreeSet<String>,
        algorithm: AlgorithmKind,
    ) -> QosResult<QosModel> {
        let key = QosModelKey::new(service_id, agents, algorithm);

        if let Some(model) = self.gateway.find_qos_model(&key).await? {
            debug!(model = ?model.id, service = %service_id, "found qos model");
            return Ok(model);
        }

        info!(
            service = %service_id,
            agents = key.agents.len(),
            algorithm = %algorithm,
            "no qos model for key; seeding a new one"
        );
        Ok(QosModel::seed(&key))
    }

    /// Store the model: created on first persist, updated in place afterwards
    pub async fn persist(&self, model: &QosModel) -> QosResult<QosModel> {
        let stored = self.gateway.save_qos_model(model).await?;
        debug!(model = ?stored.id, "persisted qos model");
        Ok(stored)
    }
}
