//! Violation aggregation across instances that ran on the same agents

use crate::error::{QosError, QosResult};
use crate::gateway::{ResourceGateway, AGREEMENT};
use crate::model::{ServiceInstance, SlaViolation};
use tracing::debug;

/// Collect every SLA violation recorded against the agreements of instances
/// whose agent set equals `target`'s (`target` itself included when present
/// in `all_instances`).
///
/// Instances without an agreement contribute nothing. An agreement reference
/// that does not resolve aborts the collection with `NotFound`, as does any
/// upstream failure; an agreement with no violation records contributes none.
pub async fn collect_violations(
    gateway: &dyn ResourceGateway,
    target: &ServiceInstance,
    all_instances: &[ServiceInstance],
) -> QosResult<Vec<SlaViolation>> {
    let agents = target.agent_set();
    let mut violations = Vec::new();

    for instance in all_instances.iter().filter(|i| i.agent_set() == agents) {
        let Some(agreement_id) = instance.agreement.as_deref() else {
            debug!(instance = %instance.id, "instance has no agreement; skipping");
            continue;
        };

        let agreement = gateway
            .get_agreement(agreement_id)
            .await?
            .ok_or_else(|| QosError::not_found(AGREEMENT, agreement_id))?;

        let found = gateway.list_sla_violations(&agreement.id).await?;
        debug!(
            instance = %instance.id,
            agreement = %agreement.id,
            violations = found.len(),
            "collected violations"
        );
        violations.extend(found);
    }

    Ok(violations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::model::{Agent, Agreement, AgreementDetails, ResourceRef};

    fn instance(id: &str, agreement: Option<&str>, agents: &[&str]) -> ServiceInstance {
        ServiceInstance {
            id: id.to_string(),
            service: "service/s".to_string(),
            agreement: agreement.map(str::to_string),
            agents: agents.iter().map(|a| Agent::new(*a)).collect(),
            status: None,
        }
    }

    async fn agreement_with_violations(gateway: &InMemoryGateway, id: &str, count: usize) {
        gateway
            .insert_agreement(Agreement {
                id: id.to_string(),
                details: AgreementDetails::default(),
            })
            .await;
        for n in 0..count {
            gateway
                .insert_violation(SlaViolation {
                    id: format!("sla-violation/{}-{}", id, n),
                    agreement_id: ResourceRef::new(format!("agreement/{}", id)),
                })
                .await;
        }
    }

    #[tokio::test]
    async fn test_only_instances_with_equal_agent_sets_contribute() {
        let gateway = InMemoryGateway::new();
        agreement_with_violations(&gateway, "a", 2).await;
        agreement_with_violations(&gateway, "b", 1).await;
        agreement_with_violations(&gateway, "c", 5).await;

        let target = instance("service-instance/1", Some("agreement/a"), &["x", "y"]);
        let all = vec![
            target.clone(),
            instance("service-instance/2", Some("agreement/b"), &["y", "x"]),
            instance("service-instance/3", Some("agreement/c"), &["x"]),
        ];

        let violations = collect_violations(&gateway, &target, &all).await.unwrap();
        assert_eq!(violations.len(), 3);
        assert!(violations
            .iter()
            .all(|v| v.agreement_id.href != "agreement/c"));
    }

    #[tokio::test]
    async fn test_instances_without_agreement_are_skipped() {
        let gateway = InMemoryGateway::new();
        let target = instance("service-instance/1", None, &["x"]);
        let violations = collect_violations(&gateway, &target, &[target.clone()])
            .await
            .unwrap();
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_agreement_without_violations_contributes_none() {
        let gateway = InMemoryGateway::new();
        agreement_with_violations(&gateway, "a", 0).await;
        let target = instance("service-instance/1", Some("agreement/a"), &["x"]);
        let violations = collect_violations(&gateway, &target, &[target.clone()])
            .await
            .unwrap();
        assert!(violations.is_empty());
    }

    #[tokio::test]
    async fn test_dangling_agreement_aborts() {
        let gateway = InMemoryGateway::new();
        let target = instance("service-instance/1", Some("agreement/missing"), &["x"]);
        let err = collect_violations(&gateway, &target, &[target.clone()])
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let gateway = InMemoryGateway::new();
        agreement_with_violations(&gateway, "a", 1).await;
        gateway.set_unavailable(crate::gateway::SLA_VIOLATION, true).await;

        let target = instance("service-instance/1", Some("agreement/a"), &["x"]);
        let err = collect_violations(&gateway, &target, &[target.clone()])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "upstream_unavailable");
    }
}
