//! QoS checker - on-demand verdict for one service instance
//!
//! Linear pipeline: instance -> service -> violations of instances on the same
//! agents -> QoS model -> prediction -> persist model. Any failure aborts the
//! check before the model is written.

use crate::error::{QosError, QosResult};
use crate::gateway::{qualified_id, ResourceGateway, SERVICE, SERVICE_INSTANCE};
use crate::metrics::Metrics;
use crate::model::ServiceInstance;
use crate::prediction::PredictionStrategy;
use crate::provider::QosModelProvider;
use crate::violations::collect_violations;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct QosChecker {
    gateway: Arc<dyn ResourceGateway>,
    provider: QosModelProvider,
    strategy: Arc<dyn PredictionStrategy>,
    metrics: Metrics,
}

impl QosChecker {
    pub fn new(
        gateway: Arc<dyn ResourceGateway>,
        strategy: Arc<dyn PredictionStrategy>,
        metrics: Metrics,
    ) -> Self {
        let provider = QosModelProvider::new(gateway.clone());
        Self {
            gateway,
            provider,
            strategy,
            metrics,
        }
    }

    /// Check QoS for `service_instance_id` (bare or `service-instance/` prefixed)
    /// and return the instance with updated agent verdicts.
    pub async fn check_qos(&self, service_instance_id: &str) -> QosResult<ServiceInstance> {
        let result = self.run_check(service_instance_id).await;
        match &result {
            Ok(instance) => {
                self.metrics.record_check("ok");
                info!(service_instance = %instance.id, "QoS checked");
            }
            Err(e) => {
                self.metrics.record_check(e.kind());
                warn!(service_instance = %service_instance_id, error = %e, "QoS check failed");
            }
        }
        result
    }

    async fn run_check(&self, service_instance_id: &str) -> QosResult<ServiceInstance> {
        let instance_id = qualified_id(SERVICE_INSTANCE, service_instance_id);

        let instance = self
            .gateway
            .get_service_instance(&instance_id)
            .await?
            .ok_or_else(|| QosError::not_found(SERVICE_INSTANCE, instance_id.clone()))?;

        let service = self
            .gateway
            .get_service(&instance.service)
            .await?
            .ok_or_else(|| QosError::not_found(SERVICE, instance.service.clone()))?;

        let all_instances = self.gateway.list_service_instances().await?;
        let violations = collect_violations(self.gateway.as_ref(), &instance, &all_instances).await?;
        let is_failure = !violations.is_empty();
        if is_failure {
            info!(
                service = %service.id,
                violations = violations.len(),
                "SLA violations found on the same agents"
            );
        } else {
            info!(service = %service.id, "No SLA violations found");
        }

        let model = self
            .provider
            .get_or_create(&service.id, instance.agent_set(), self.strategy.kind())
            .await?;

        let (updated_instance, updated_model) =
            self.strategy.evaluate(&model, &instance, is_failure)?;

        self.provider.persist(&updated_model).await?;

        Ok(updated_instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::model::{Agent, AlgorithmKind, QosModel};
    use crate::prediction::{build_strategy, PredictionConfig};

    struct FailingStrategy;

    impl PredictionStrategy for FailingStrategy {
        fn kind(&self) -> AlgorithmKind {
            AlgorithmKind::Learned
        }

        fn evaluate(
            &self,
            _model: &QosModel,
            _instance: &ServiceInstance,
            _is_failure: bool,
        ) -> QosResult<(ServiceInstance, QosModel)> {
            Err(QosError::prediction("boom"))
        }
    }

    async fn seeded_gateway() -> InMemoryGateway {
        let gateway = InMemoryGateway::new();
        gateway
            .insert_service(crate::model::Service {
                id: "service/s".into(),
                name: None,
                num_agents: 1,
                sla_templates: Vec::new(),
                extra: Default::default(),
            })
            .await;
        gateway
            .insert_service_instance(ServiceInstance {
                id: "service-instance/1".into(),
                service: "service/s".into(),
                agreement: None,
                agents: vec![Agent::new("a")],
                status: None,
            })
            .await;
        gateway
    }

    #[tokio::test]
    async fn test_accepts_bare_instance_id() {
        let gateway = seeded_gateway().await;
        let checker = QosChecker::new(
            Arc::new(gateway.clone()),
            build_strategy(&PredictionConfig::default()),
            Metrics,
        );

        let instance = checker.check_qos("1").await.unwrap();
        assert_eq!(instance.id, "service-instance/1");
        assert_eq!(gateway.qos_models().await.len(), 1);
    }

    #[tokio::test]
    async fn test_prediction_failure_writes_nothing() {
        let gateway = seeded_gateway().await;
        let checker = QosChecker::new(Arc::new(gateway.clone()), Arc::new(FailingStrategy), Metrics);

        let err = checker.check_qos("service-instance/1").await.unwrap_err();
        assert_eq!(err.kind(), "prediction_failure");
        assert_eq!(gateway.write_count().await, 0);
    }
}
