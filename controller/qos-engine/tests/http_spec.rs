//! HTTP integration tests for the resource store gateway and the lifecycle manager client
//!
//! Tests cover:
//! - Resource reads, 404 handling and collection queries
//! - QoS model create vs update
//! - Lifecycle manager request body and success/failure mapping

use qos_engine::model::{AlgorithmKind, QosModel, QosModelKey};
use qos_engine::{CimiGateway, LifecycleManagerClient, ResourceGateway, ScalingActuator, Service};
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_json, body_partial_json, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn gateway(server: &MockServer) -> CimiGateway {
    CimiGateway::new(server.uri(), Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_get_instance_by_bare_or_prefixed_id() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/service-instance/i1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "service-instance/i1",
            "service": "service/compss",
            "agreement": "agreement/a1",
            "agents": [
                {"url": "10.0.0.1", "status": "running"},
                {"url": "10.0.0.2", "allow": false}
            ],
            "status": "started"
        })))
        .expect(2)
        .mount(&mock_server)
        .await;

    let gateway = gateway(&mock_server);
    let bare = gateway.get_service_instance("i1").await.unwrap().unwrap();
    let prefixed = gateway
        .get_service_instance("service-instance/i1")
        .await
        .unwrap()
        .unwrap();

    assert_eq!(bare, prefixed);
    assert_eq!(bare.num_agents(), 2);
    assert!(bare.agents[0].allow);
    assert!(!bare.agents[1].allow);
}

#[tokio::test]
async fn test_missing_resource_is_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/service/ghost"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let gateway = gateway(&mock_server);
    assert!(gateway.get_service("ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn test_server_error_is_upstream_unavailable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/agreement/a1"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&mock_server)
        .await;

    let err = gateway(&mock_server).get_agreement("a1").await.unwrap_err();
    assert_eq!(err.kind(), "upstream_unavailable");
}

#[tokio::test]
async fn test_malformed_body_is_malformed_data() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/service/compss"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "service/compss"})))
        .mount(&mock_server)
        .await;

    let err = gateway(&mock_server).get_service("compss").await.unwrap_err();
    assert_eq!(err.kind(), "malformed_data");
}

#[tokio::test]
async fn test_unreachable_store_is_upstream_unavailable() {
    let gateway = CimiGateway::new("http://127.0.0.1:9", Duration::from_millis(200)).unwrap();
    let err = gateway.list_service_instances().await.unwrap_err();
    assert_eq!(err.kind(), "upstream_unavailable");
}

#[tokio::test]
async fn test_violations_are_filtered_by_agreement() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/sla-violation"))
        .and(query_param("$filter", "agreement_id/href=\"agreement/a1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "count": 2,
            "slaViolations": [
                {"id": "sla-violation/1", "agreement_id": {"href": "agreement/a1"}},
                {"id": "sla-violation/2", "agreement_id": {"href": "agreement/a1"}}
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let violations = gateway(&mock_server).list_sla_violations("a1").await.unwrap();
    assert_eq!(violations.len(), 2);
}

#[tokio::test]
async fn test_put_service_sends_full_record() {
    let mock_server = MockServer::start().await;

    let stored = json!({
        "id": "service/compss",
        "name": "compss",
        "exec": "mf2c/compss-test:it2",
        "exec_type": "compss",
        "exec_ports": [8080, 8081],
        "category": {"cpu": "low", "memory": "low", "disk": "low"},
        "num_agents": 4,
        "sla_templates": ["sla-template/t1"]
    });
    let mut expected = stored.clone();
    expected["num_agents"] = json!(8);

    Mock::given(method("GET"))
        .and(path("/service/compss"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stored))
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/service/compss"))
        .and(body_json(expected))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = gateway(&mock_server);
    let mut service = gateway.get_service("compss").await.unwrap().unwrap();
    service.num_agents = 8;
    gateway.put_service(&service).await.unwrap();
}

#[tokio::test]
async fn test_put_missing_service_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/service/compss"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let service = Service {
        id: "service/compss".into(),
        name: None,
        num_agents: 8,
        sla_templates: Vec::new(),
        extra: Default::default(),
    };
    let err = gateway(&mock_server).put_service(&service).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_qos_model_lookup_matches_agent_set_exactly() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/qos-model"))
        .and(query_param("$filter", "service=\"service/compss\" and config=\"heuristic\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "qosModels": [
                {"id": "qos-model/1", "service": "service/compss", "agents": ["a"], "config": "heuristic"},
                {"id": "qos-model/2", "service": "service/compss", "agents": ["a", "b"], "config": "heuristic", "state": [0.5, 1.0]}
            ]
        })))
        .mount(&mock_server)
        .await;

    let key = QosModelKey::new(
        "service/compss",
        ["b".to_string(), "a".to_string()].into_iter().collect(),
        AlgorithmKind::Heuristic,
    );
    let model = gateway(&mock_server)
        .find_qos_model(&key)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(model.id.as_deref(), Some("qos-model/2"));
    assert_eq!(model.state, vec![0.5, 1.0]);
}

#[tokio::test]
async fn test_new_qos_model_is_created_then_updated() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/qos-model"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "status": 201,
            "resource-id": "qos-model/new"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("PUT"))
        .and(path("/qos-model/new"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let gateway = gateway(&mock_server);
    let key = QosModelKey::new(
        "service/compss",
        ["a".to_string()].into_iter().collect(),
        AlgorithmKind::Learned,
    );

    let created = gateway.save_qos_model(&QosModel::seed(&key)).await.unwrap();
    assert_eq!(created.id.as_deref(), Some("qos-model/new"));

    let updated = gateway.save_qos_model(&created).await.unwrap();
    assert_eq!(updated.id, created.id);
}

#[tokio::test]
async fn test_lifecycle_manager_accepts_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/lm/agent"))
        .and(body_partial_json(json!({
            "data": {"numAgents": 8, "serviceInstanceId": "service-instance/i1"}
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = LifecycleManagerClient::new(
        format!("{}/api/v2/lm/agent", mock_server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(client.request_more_agents(8, "service-instance/i1").await);
}

#[tokio::test]
async fn test_lifecycle_manager_rejection_is_not_applied() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/lm/agent"))
        .respond_with(ResponseTemplate::new(500).set_body_string("no capacity"))
        .expect(1) // no retries
        .mount(&mock_server)
        .await;

    let client = LifecycleManagerClient::new(
        format!("{}/api/v2/lm/agent", mock_server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();

    assert!(!client.request_more_agents(4, "service-instance/i1").await);
}

#[tokio::test]
async fn test_lifecycle_manager_timeout_is_not_applied() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/v2/lm/agent"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&mock_server)
        .await;

    let client = LifecycleManagerClient::new(
        format!("{}/api/v2/lm/agent", mock_server.uri()),
        Duration::from_millis(200),
    )
    .unwrap();

    assert!(!client.request_more_agents(4, "service-instance/i1").await);
}
