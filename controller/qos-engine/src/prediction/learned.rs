use super::{aligned_state, apply_verdict, observed_healthy, PredictionStrategy};
use crate::error::{QosError, QosResult};
use crate::model::{AlgorithmKind, QosModel, ServiceInstance};

/// Per-agent value estimate trained on the violation signal.
///
/// Each check rewards every agent with `+1`, or `-1` when the instance group
/// recorded violations or the agent itself is unhealthy, and moves the value
/// towards `reward + discount * best_value`. Agents with a non-negative value
/// stay allowed.
#[derive(Debug, Clone)]
pub struct LearnedStrategy {
    learning_rate: f64,
    discount_factor: f64,
}

impl LearnedStrategy {
    pub fn new(learning_rate: f64, discount_factor: f64) -> Self {
        Self {
            learning_rate,
            discount_factor,
        }
    }
}

impl PredictionStrategy for LearnedStrategy {
    fn kind(&self) -> AlgorithmKind {
        AlgorithmKind::Learned
    }

    fn evaluate(
        &self,
        model: &QosModel,
        instance: &ServiceInstance,
        is_failure: bool,
    ) -> QosResult<(ServiceInstance, QosModel)> {
        let values = aligned_state(model, 0.0);
        let best = values.iter().copied().fold(0.0_f64, f64::max);

        let mut updated = model.clone();
        updated.state = values
            .into_iter()
            .zip(&model.agents)
            .map(|(value, url)| {
                let reward = if is_failure || !observed_healthy(instance, url) {
                    -1.0
                } else {
                    1.0
                };
                value + self.learning_rate * (reward + self.discount_factor * best - value)
            })
            .collect();

        if let Some(bad) = updated.state.iter().find(|v| !v.is_finite()) {
            return Err(QosError::prediction(format!(
                "value estimate diverged to {}",
                bad
            )));
        }

        updated.num_service_instances = model.num_service_instances.saturating_add(1);
        if is_failure {
            updated.num_service_failures = model.num_service_failures.saturating_add(1);
        }

        let instance = apply_verdict(instance, &updated, |value| value >= 0.0);
        Ok((instance, updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Agent, QosModelKey};

    fn instance() -> ServiceInstance {
        ServiceInstance {
            id: "service-instance/1".into(),
            service: "service/s".into(),
            agreement: None,
            agents: vec![Agent::new("a"), Agent::new("b")],
            status: None,
        }
    }

    fn seeded(instance: &ServiceInstance) -> QosModel {
        QosModel::seed(&QosModelKey::new(
            "service/s",
            instance.agent_set(),
            AlgorithmKind::Learned,
        ))
    }

    #[test]
    fn test_success_raises_values() {
        let instance = instance();
        let (updated, model) = LearnedStrategy::new(0.5, 0.0)
            .evaluate(&seeded(&instance), &instance, false)
            .unwrap();

        assert_eq!(model.state, vec![0.5, 0.5]);
        assert_eq!(model.num_service_instances, 1);
        assert_eq!(model.num_service_failures, 0);
        assert!(updated.agents.iter().all(|a| a.allow));
    }

    #[test]
    fn test_failure_lowers_values_and_disallows() {
        let instance = instance();
        let (updated, model) = LearnedStrategy::new(0.5, 0.0)
            .evaluate(&seeded(&instance), &instance, true)
            .unwrap();

        assert_eq!(model.state, vec![-0.5, -0.5]);
        assert_eq!(model.num_service_failures, 1);
        assert!(updated.agents.iter().all(|a| !a.allow));
    }

    #[test]
    fn test_non_finite_parameters_fail() {
        let instance = instance();
        let err = LearnedStrategy::new(f64::NAN, 0.9)
            .evaluate(&seeded(&instance), &instance, false)
            .unwrap_err();
        assert_eq!(err.kind(), "prediction_failure");
    }
}
