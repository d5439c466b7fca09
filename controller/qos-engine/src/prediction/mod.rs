//! Prediction strategies - turn a QoS model and a service instance into a per-agent verdict
//!
//! The checker holds one `Arc<dyn PredictionStrategy>` chosen at startup from
//! [`PredictionConfig::algorithm`]; there is no fallback between variants.

mod heuristic;
mod learned;

pub use heuristic::HeuristicStrategy;
pub use learned::LearnedStrategy;

use crate::error::QosResult;
use crate::model::{AlgorithmKind, QosModel, ServiceInstance};
use std::sync::Arc;

/// Strategy parameters, taken from [`Config`](crate::Config)
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionConfig {
    pub algorithm: AlgorithmKind,
    /// Heuristic: minimum healthy ratio for an agent to stay allowed
    pub acceptance_ratio: f64,
    /// Learned: step size of the value update
    pub learning_rate: f64,
    /// Learned: weight of the best current estimate in the update target
    pub discount_factor: f64,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            algorithm: AlgorithmKind::Heuristic,
            acceptance_ratio: 0.8,
            learning_rate: 0.1,
            discount_factor: 0.99,
        }
    }
}

pub trait PredictionStrategy: Send + Sync {
    fn kind(&self) -> AlgorithmKind;

    /// Produce the updated instance (agent `allow` flags) and the updated model.
    ///
    /// `is_failure` is true when instances on the same agents recorded SLA
    /// violations; strategies may ignore it.
    fn evaluate(
        &self,
        model: &QosModel,
        instance: &ServiceInstance,
        is_failure: bool,
    ) -> QosResult<(ServiceInstance, QosModel)>;
}

pub fn build_strategy(config: &PredictionConfig) -> Arc<dyn PredictionStrategy> {
    match config.algorithm {
        AlgorithmKind::Heuristic => Arc::new(HeuristicStrategy::new(config.acceptance_ratio)),
        AlgorithmKind::Learned => Arc::new(LearnedStrategy::new(
            config.learning_rate,
            config.discount_factor,
        )),
    }
}

/// Model state with exactly one entry per tracked agent; missing entries start at `initial`.
fn aligned_state(model: &QosModel, initial: f64) -> Vec<f64> {
    let mut state = model.state.clone();
    state.resize(model.agents.len(), initial);
    state
}

/// Health observation for the agent at `url` in `instance` (absent agents count as unhealthy)
fn observed_healthy(instance: &ServiceInstance, url: &str) -> bool {
    instance
        .agents
        .iter()
        .find(|a| a.url == url)
        .map(|a| a.is_healthy())
        .unwrap_or(false)
}

/// Copy of `instance` with every agent's `allow` set from its model score
fn apply_verdict(
    instance: &ServiceInstance,
    model: &QosModel,
    allowed: impl Fn(f64) -> bool,
) -> ServiceInstance {
    let mut updated = instance.clone();
    for agent in &mut updated.agents {
        if let Some(score) = model.score(&agent.url) {
            agent.allow = allowed(score);
        }
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QosModelKey;

    #[test]
    fn test_build_strategy_dispatches_on_kind() {
        let mut config = PredictionConfig::default();
        assert_eq!(build_strategy(&config).kind(), AlgorithmKind::Heuristic);

        config.algorithm = AlgorithmKind::Learned;
        assert_eq!(build_strategy(&config).kind(), AlgorithmKind::Learned);
    }

    #[test]
    fn test_aligned_state_pads_and_truncates() {
        let key = QosModelKey::new(
            "service/s",
            ["a".to_string(), "b".to_string()].into_iter().collect(),
            AlgorithmKind::Heuristic,
        );
        let mut model = QosModel::seed(&key);
        assert_eq!(aligned_state(&model, 0.5), vec![0.5, 0.5]);

        model.state = vec![1.0, 2.0, 3.0];
        assert_eq!(aligned_state(&model, 0.0), vec![1.0, 2.0]);
    }
}
