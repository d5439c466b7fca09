//! CIMI resource store over HTTP

use super::{
    qualified_id, ResourceGateway, AGREEMENT, QOS_MODEL, SERVICE, SERVICE_INSTANCE, SLA_VIOLATION,
};
use crate::error::{QosError, QosResult};
use crate::model::{
    Agreement, QosModel, QosModelKey, Service, ServiceInstance, SlaViolation,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

const TARGET: &str = "resource store";

/// Response body of a CIMI create call
#[derive(Debug, Deserialize)]
struct CreatedResponse {
    #[serde(rename = "resource-id")]
    resource_id: String,
}

/// HTTP client for the CIMI resource store
pub struct CimiGateway {
    base_url: String,
    client: reqwest::Client,
}

impl CimiGateway {
    /// Create a new gateway; every request is bounded by `timeout`
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build resource store HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn resource_url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}", self.base_url, qualified_id(collection, id))
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    async fn get_resource<T: DeserializeOwned>(
        &self,
        collection: &'static str,
        id: &str,
    ) -> QosResult<Option<T>> {
        let url = self.resource_url(collection, id);
        debug!(%url, "GET resource");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| QosError::upstream(TARGET, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| QosError::malformed(collection, e)),
            status => Err(unexpected_status(status, response).await),
        }
    }

    /// GET a collection, optionally filtered, and pull the records out of `key`.
    /// A 404 on the collection is an empty result.
    async fn query_collection<T: DeserializeOwned>(
        &self,
        collection: &'static str,
        key: &str,
        filter: Option<String>,
    ) -> QosResult<Vec<T>> {
        let mut request = self.client.get(self.collection_url(collection));
        if let Some(filter) = &filter {
            request = request.query(&[("$filter", filter.as_str())]);
        }
        debug!(collection, filter = ?filter, "GET collection");

        let response = request
            .send()
            .await
            .map_err(|e| QosError::upstream(TARGET, e))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            status if status.is_success() => {
                let body: Value = response
                    .json()
                    .await
                    .map_err(|e| QosError::malformed(collection, e))?;
                extract_collection(body, key).map_err(|e| QosError::malformed(collection, e))
            }
            status => Err(unexpected_status(status, response).await),
        }
    }
}

async fn unexpected_status(status: StatusCode, response: reqwest::Response) -> QosError {
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unable to read body>".to_string());
    QosError::upstream(TARGET, format!("unexpected status {}: {}", status, body))
}

/// Records of a CIMI collection response live under a camelCase key
/// (`serviceInstances`, `slaViolations`, ...). A missing key means no records.
fn extract_collection<T: DeserializeOwned>(body: Value, key: &str) -> serde_json::Result<Vec<T>> {
    match body {
        Value::Object(mut map) => match map.remove(key) {
            Some(records) => serde_json::from_value(records),
            None => Ok(Vec::new()),
        },
        other => serde_json::from_value(other),
    }
}

#[async_trait]
impl ResourceGateway for CimiGateway {
    async fn get_service(&self, id: &str) -> QosResult<Option<Service>> {
        self.get_resource(SERVICE, id).await
    }

    async fn put_service(&self, service: &Service) -> QosResult<()> {
        let url = self.resource_url(SERVICE, &service.id);
        let response = self
            .client
            .put(&url)
            .json(service)
            .send()
            .await
            .map_err(|e| QosError::upstream(TARGET, e))?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(QosError::not_found(SERVICE, service.id.clone())),
            status => Err(unexpected_status(status, response).await),
        }
    }

    async fn get_service_instance(&self, id: &str) -> QosResult<Option<ServiceInstance>> {
        self.get_resource(SERVICE_INSTANCE, id).await
    }

    async fn list_service_instances(&self) -> QosResult<Vec<ServiceInstance>> {
        self.query_collection(SERVICE_INSTANCE, "serviceInstances", None)
            .await
    }

    async fn get_agreement(&self, id: &str) -> QosResult<Option<Agreement>> {
        self.get_resource(AGREEMENT, id).await
    }

    async fn list_sla_violations(&self, agreement_id: &str) -> QosResult<Vec<SlaViolation>> {
        let filter = format!(
            "agreement_id/href=\"{}\"",
            qualified_id(AGREEMENT, agreement_id)
        );
        self.query_collection(SLA_VIOLATION, "slaViolations", Some(filter))
            .await
    }

    async fn find_qos_model(&self, key: &QosModelKey) -> QosResult<Option<QosModel>> {
        let filter = format!(
            "service=\"{}\" and config=\"{}\"",
            key.service_id, key.algorithm
        );
        let models: Vec<QosModel> = self
            .query_collection(QOS_MODEL, "qosModels", Some(filter))
            .await?;
        // The store cannot compare agent sets, so the exact match happens here.
        Ok(models.into_iter().find(|m| m.key() == *key))
    }

    async fn save_qos_model(&self, model: &QosModel) -> QosResult<QosModel> {
        match &model.id {
            Some(id) => {
                let url = self.resource_url(QOS_MODEL, id);
                let response = self
                    .client
                    .put(&url)
                    .json(model)
                    .send()
                    .await
                    .map_err(|e| QosError::upstream(TARGET, e))?;
                if !response.status().is_success() {
                    return Err(unexpected_status(response.status(), response).await);
                }
                Ok(model.clone())
            }
            None => {
                let response = self
                    .client
                    .post(self.collection_url(QOS_MODEL))
                    .json(model)
                    .send()
                    .await
                    .map_err(|e| QosError::upstream(TARGET, e))?;
                if !response.status().is_success() {
                    return Err(unexpected_status(response.status(), response).await);
                }
                let created: CreatedResponse = response
                    .json()
                    .await
                    .map_err(|e| QosError::malformed(QOS_MODEL, e))?;
                let mut stored = model.clone();
                stored.id = Some(created.resource_id);
                Ok(stored)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_collection_reads_named_key() {
        let body = json!({
            "count": 1,
            "slaViolations": [
                {"id": "sla-violation/1", "agreement_id": {"href": "agreement/a"}}
            ]
        });
        let violations: Vec<SlaViolation> = extract_collection(body, "slaViolations").unwrap();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].agreement_id.href, "agreement/a");
    }

    #[test]
    fn test_extract_collection_missing_key_is_empty() {
        let body = json!({"count": 0});
        let violations: Vec<SlaViolation> = extract_collection(body, "slaViolations").unwrap();
        assert!(violations.is_empty());
    }

    #[test]
    fn test_resource_url_strips_trailing_slash() {
        let gateway = CimiGateway::new("https://cimi/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            gateway.resource_url(SERVICE, "abc"),
            "https://cimi/api/service/abc"
        );
        assert_eq!(
            gateway.resource_url(SERVICE_INSTANCE, "service-instance/x"),
            "https://cimi/api/service-instance/x"
        );
    }
}
