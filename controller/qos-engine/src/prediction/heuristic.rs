use super::{aligned_state, apply_verdict, observed_healthy, PredictionStrategy};
use crate::error::{QosError, QosResult};
use crate::model::{AlgorithmKind, QosModel, ServiceInstance};

/// Keeps a running mean of healthy observations per agent and allows agents
/// whose mean reaches the acceptance ratio. SLA violations are not consulted.
#[derive(Debug, Clone)]
pub struct HeuristicStrategy {
    acceptance_ratio: f64,
}

impl HeuristicStrategy {
    pub fn new(acceptance_ratio: f64) -> Self {
        Self { acceptance_ratio }
    }
}

impl PredictionStrategy for HeuristicStrategy {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Heuristic
    }

    fn evaluate(
        &self,
        model: &QosModel,
        instance: &ServiceInstance,
        _is_failure: bool,
    ) -> QosResult<(ServiceInstance, QosModel)> {
        if !(0.0..=1.0).contains(&self.acceptance_ratio) {
            return Err(QosError::prediction(format!(
                "acceptance ratio {} outside [0, 1]",
                self.acceptance_ratio
            )));
        }

        let seen = f64::from(model.num_service_instances);
        let mut updated = model.clone();
        updated.state = aligned_state(model, 0.0)
            .into_iter()
            .zip(&model.agents)
            .map(|(mean, url)| {
                let observation = if observed_healthy(instance, url) { 1.0 } else { 0.0 };
                (mean * seen + observation) / (seen + 1.0)
            })
            .collect();
        updated.num_service_instances = model.num_service_instances.saturating_add(1);

        let ratio = self.acceptance_ratio;
        let instance = apply_verdict(instance, &updated, |score| score >= ratio);
        Ok((instance, updated))
    }
}
