use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{json, Value};
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use emrys::config::{GatewayConfig, InferenceConfig};
use emrys::credential::{CredentialStore, MemoryCredentialStore, SessionContext};
use emrys::gateway::RestGateway;
use emrys::inference::HttpInferenceClient;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Gateway pointed at the mock server
#[allow(dead_code)]
pub fn rest_gateway(server: &MockServer) -> Arc<RestGateway> {
    Arc::new(
        RestGateway::new(&GatewayConfig {
            url: server.uri(),
            anon_key: "anon-key".to_string(),
            access_token: Some("user-jwt".to_string()),
        })
        .expect("failed to build gateway"),
    )
}

/// Inference client pointed at the mock server
#[allow(dead_code)]
pub fn inference_client(server: &MockServer) -> Arc<HttpInferenceClient> {
    Arc::new(
        HttpInferenceClient::new(&InferenceConfig {
            base_url: server.uri(),
            timeout_seconds: Some(5),
        })
        .expect("failed to build inference client"),
    )
}

/// Session context for `u1` with an optional stored key
#[allow(dead_code)]
pub fn session(key: Option<&str>) -> SessionContext {
    let store: Arc<dyn CredentialStore> = match key {
        Some(key) => Arc::new(MemoryCredentialStore::with_key(key)),
        None => Arc::new(MemoryCredentialStore::new()),
    };
    SessionContext::new("u1", store)
}

#[allow(dead_code)]
pub fn persona_row(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "user_id": "u1",
        "name": name,
        "occupation": "Engineer",
        "personality_traits": [],
        "values": [],
        "catchphrases": [],
        "interests": [],
        "is_public": false,
        "use_count": 0
    })
}

/// Mounts the rows a chat view reads while opening
#[allow(dead_code)]
pub async fn mount_conversation(server: &MockServer, conversation: Value, history: Value) {
    let id = conversation["id"].as_str().unwrap_or_default().to_string();
    Mock::given(method("GET"))
        .and(path("/rest/v1/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([conversation])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/messages"))
        .and(query_param("conversation_id", format!("eq.{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(history))
        .mount(server)
        .await;
}

/// Accepts the use-count RPC
#[allow(dead_code)]
pub async fn mount_use_count_rpc(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/increment_persona_use"))
        .respond_with(ResponseTemplate::new(204))
        .mount(server)
        .await;
}
