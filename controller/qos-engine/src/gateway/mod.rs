//! Resource gateway - CRUD access to the resource store
//!
//! The engine never talks to the store directly; everything goes through
//! [`ResourceGateway`]. [`CimiGateway`] is the HTTP implementation;
//! `InMemoryGateway` is a test double kept public for the integration tests.

mod http;
mod memory;

pub use http::CimiGateway;
#[doc(hidden)]
pub use memory::InMemoryGateway;

use crate::error::QosResult;
use crate::model::{
    Agreement, QosModel, QosModelKey, Service, ServiceInstance, SlaViolation,
};
use async_trait::async_trait;

pub const SERVICE: &str = "service";
pub const SERVICE_INSTANCE: &str = "service-instance";
pub const AGREEMENT: &str = "agreement";
pub const SLA_VIOLATION: &str = "sla-violation";
pub const QOS_MODEL: &str = "qos-model";

/// Read/write access to services, instances, agreements, violations and QoS models.
///
/// Single-record reads return `Ok(None)` when the record does not exist.
/// Transport failures and unexpected statuses are `UpstreamUnavailable`.
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    async fn get_service(&self, id: &str) -> QosResult<Option<Service>>;

    /// Persist the service's agent count
    async fn put_service(&self, service: &Service) -> QosResult<()>;

    async fn get_service_instance(&self, id: &str) -> QosResult<Option<ServiceInstance>>;

    async fn list_service_instances(&self) -> QosResult<Vec<ServiceInstance>>;

    async fn get_agreement(&self, id: &str) -> QosResult<Option<Agreement>>;

    /// Violations recorded against `agreement_id`; an unknown agreement yields none.
    async fn list_sla_violations(&self, agreement_id: &str) -> QosResult<Vec<SlaViolation>>;

    /// Model whose (service, agent set, algorithm) equals `key`
    async fn find_qos_model(&self, key: &QosModelKey) -> QosResult<Option<QosModel>>;

    /// Create the model if it has no id yet, update it in place otherwise.
    /// Returns the stored record (with its id).
    async fn save_qos_model(&self, model: &QosModel) -> QosResult<QosModel>;
}

/// `collection/bare` form of an id that may or may not carry its collection prefix.
pub fn qualified_id(collection: &str, id: &str) -> String {
    let id = id.trim_start_matches('/');
    match id.strip_prefix(collection).and_then(|rest| rest.strip_prefix('/')) {
        Some(_) => id.to_string(),
        None => format!("{}/{}", collection, id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qualified_id_adds_missing_prefix() {
        assert_eq!(qualified_id(SERVICE, "abc"), "service/abc");
        assert_eq!(qualified_id(SERVICE, "service/abc"), "service/abc");
        assert_eq!(qualified_id(SERVICE, "/service/abc"), "service/abc");
    }

    #[test]
    fn test_qualified_id_does_not_confuse_collections() {
        // "service-instance/x" does not start with "service/"
        assert_eq!(
            qualified_id(SERVICE, "service-instance/x"),
            "service/service-instance/x"
        );
        assert_eq!(
            qualified_id(SERVICE_INSTANCE, "service-instance/x"),
            "service-instance/x"
        );
    }
}
