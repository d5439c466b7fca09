//! In-process resource store for tests
//!
//! Not wired into the service. Tracks how many writes it received so tests
//! can assert that a code path performed none.

use super::{
    qualified_id, ResourceGateway, AGREEMENT, QOS_MODEL, SERVICE, SERVICE_INSTANCE, SLA_VIOLATION,
};
use crate::error::{QosError, QosResult};
use crate::model::{
    Agreement, QosModel, QosModelKey, Service, ServiceInstance, SlaViolation,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryDb {
    services: HashMap<String, Service>,
    instances: BTreeMap<String, ServiceInstance>,
    agreements: HashMap<String, Agreement>,
    violations: Vec<SlaViolation>,
    qos_models: BTreeMap<String, QosModel>,
    service_writes: usize,
    qos_model_creates: usize,
    qos_model_updates: usize,
    /// Collections whose calls fail with `UpstreamUnavailable`
    unavailable: HashSet<&'static str>,
}

impl MemoryDb {
    fn check_available(&self, collection: &'static str) -> QosResult<()> {
        if self.unavailable.contains(collection) {
            Err(QosError::upstream("resource store", format!("{} unavailable", collection)))
        } else {
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryGateway {
    state: Arc<RwLock<MemoryDb>>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_service(&self, mut service: Service) {
        service.id = qualified_id(SERVICE, &service.id);
        let mut guard = self.state.write().await;
        guard.services.insert(service.id.clone(), service);
    }

    pub async fn insert_service_instance(&self, mut instance: ServiceInstance) {
        instance.id = qualified_id(SERVICE_INSTANCE, &instance.id);
        let mut guard = self.state.write().await;
        guard.instances.insert(instance.id.clone(), instance);
    }

    pub async fn insert_agreement(&self, mut agreement: Agreement) {
        agreement.id = qualified_id(AGREEMENT, &agreement.id);
        let mut guard = self.state.write().await;
        guard.agreements.insert(agreement.id.clone(), agreement);
    }

    pub async fn insert_violation(&self, violation: SlaViolation) {
        let mut guard = self.state.write().await;
        guard.violations.push(violation);
    }

    /// Make every call touching `collection` fail as if the store were unreachable
    pub async fn set_unavailable(&self, collection: &'static str, unavailable: bool) {
        let mut guard = self.state.write().await;
        if unavailable {
            guard.unavailable.insert(collection);
        } else {
            guard.unavailable.remove(collection);
        }
    }

    pub async fn service(&self, id: &str) -> Option<Service> {
        let guard = self.state.read().await;
        guard.services.get(&qualified_id(SERVICE, id)).cloned()
    }

    pub async fn qos_models(&self) -> Vec<QosModel> {
        let guard = self.state.read().await;
        guard.qos_models.values().cloned().collect()
    }

    pub async fn service_writes(&self) -> usize {
        self.state.read().await.service_writes
    }

    /// Total writes of any kind
    pub async fn write_count(&self) -> usize {
        let guard = self.state.read().await;
        guard.service_writes + guard.qos_model_creates + guard.qos_model_updates
    }

    pub async fn qos_model_creates(&self) -> usize {
        self.state.read().await.qos_model_creates
    }

    pub async fn qos_model_updates(&self) -> usize {
        self.state.read().await.qos_model_updates
    }
}

#[async_trait]
impl ResourceGateway for InMemoryGateway {
    async fn get_service(&self, id: &str) -> QosResult<Option<Service>> {
        let guard = self.state.read().await;
        guard.check_available(SERVICE)?;
        Ok(guard.services.get(&qualified_id(SERVICE, id)).cloned())
    }

    async fn put_service(&self, service: &Service) -> QosResult<()> {
        let mut guard = self.state.write().await;
        guard.check_available(SERVICE)?;
        let id = qualified_id(SERVICE, &service.id);
        match guard.services.get_mut(&id) {
            Some(stored) => {
                *stored = service.clone();
                stored.id = id;
            }
            None => return Err(QosError::not_found(SERVICE, id)),
        }
        guard.service_writes += 1;
        Ok(())
    }

    async fn get_service_instance(&self, id: &str) -> QosResult<Option<ServiceInstance>> {
        let guard = self.state.read().await;
        guard.check_available(SERVICE_INSTANCE)?;
        Ok(guard
            .instances
            .get(&qualified_id(SERVICE_INSTANCE, id))
            .cloned())
    }

    async fn list_service_instances(&self) -> QosResult<Vec<ServiceInstance>> {
        let guard = self.state.read().await;
        guard.check_available(SERVICE_INSTANCE)?;
        Ok(guard.instances.values().cloned().collect())
    }

    async fn get_agreement(&self, id: &str) -> QosResult<Option<Agreement>> {
        let guard = self.state.read().await;
        guard.check_available(AGREEMENT)?;
        Ok(guard.agreements.get(&qualified_id(AGREEMENT, id)).cloned())
    }

    async fn list_sla_violations(&self, agreement_id: &str) -> QosResult<Vec<SlaViolation>> {
        let guard = self.state.read().await;
        guard.check_available(SLA_VIOLATION)?;
        let agreement_id = qualified_id(AGREEMENT, agreement_id);
        Ok(guard
            .violations
            .iter()
            .filter(|v| qualified_id(AGREEMENT, &v.agreement_id.href) == agreement_id)
            .cloned()
            .collect())
    }

    async fn find_qos_model(&self, key: &QosModelKey) -> QosResult<Option<QosModel>> {
        let guard = self.state.read().await;
        guard.check_available(QOS_MODEL)?;
        Ok(guard
            .qos_models
            .values()
            .find(|m| m.key() == *key)
            .cloned())
    }

    async fn save_qos_model(&self, model: &QosModel) -> QosResult<QosModel> {
        let mut guard = self.state.write().await;
        guard.check_available(QOS_MODEL)?;
        let mut stored = model.clone();
        match &model.id {
            Some(id) => {
                let id = qualified_id(QOS_MODEL, id);
                if !guard.qos_models.contains_key(&id) {
                    return Err(QosError::not_found(QOS_MODEL, id));
                }
                stored.id = Some(id.clone());
                guard.qos_models.insert(id, stored.clone());
                guard.qos_model_updates += 1;
            }
            None => {
                let id = qualified_id(QOS_MODEL, &Uuid::new_v4().to_string());
                stored.id = Some(id.clone());
                guard.qos_models.insert(id, stored.clone());
                guard.qos_model_creates += 1;
            }
        }
        Ok(stored)
    }
}
