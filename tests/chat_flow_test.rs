mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{
    inference_client, mount_conversation, mount_use_count_rpc, persona_row, rest_gateway, session,
};
use emrys::chat::{DirectChat, HubChat, HubSendResult, SendResult, DIRECT_SEND_FAILED, HUB_SEND_FAILED};
use emrys::config::{ChatConfig, InferenceConfig};
use emrys::error::{classify, EmrysError};
use emrys::inference::HttpInferenceClient;
use emrys::models::{Mood, SenderKind};

async fn mount_persona(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/personas"))
        .and(query_param("id", "eq.p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([persona_row("p1", "Ada")])))
        .mount(server)
        .await;
    mount_use_count_rpc(server).await;
    mount_conversation(
        server,
        json!({"id": "c1", "user_id": "u1", "persona_id": "p1"}),
        json!([
            {"id": "m1", "conversation_id": "c1", "sender_type": "user", "content": "Hello"},
            {"id": "m2", "conversation_id": "c1", "sender_type": "persona", "content": "Hi there", "persona_id": "p1"}
        ]),
    )
    .await;
}

async fn mount_hub(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/groups"))
        .and(query_param("id", "eq.g1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "g1",
            "user_id": "u1",
            "name": "Salon",
            "group_members": [
                {"persona_id": "p1", "personas": persona_row("p1", "Ada Lovelace")},
                {"persona_id": "p2", "personas": persona_row("p2", "Grace Hopper")}
            ]
        }])))
        .mount(server)
        .await;
    mount_conversation(
        server,
        json!({"id": "c9", "user_id": "u1", "group_id": "g1"}),
        json!([]),
    )
    .await;
}

fn fast_chat() -> ChatConfig {
    ChatConfig {
        reveal_stagger_ms: 100,
        speaker_timeout_ms: 300,
        retrieving_delay_ms: 500,
    }
}

#[tokio::test]
async fn test_direct_chat_send_appends_user_and_reply() {
    let server = MockServer::start().await;
    mount_persona(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/send"))
        .and(body_json(json!({
            "user_id": "u1",
            "persona_id": "p1",
            "message": "What are you working on?",
            "api_key": "sk-live"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": "Notes on the Analytical Engine.",
            "mood": "curious"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut chat = DirectChat::open(
        session(Some("sk-live")),
        rest_gateway(&server),
        inference_client(&server),
        "p1",
        &ChatConfig::default(),
    )
    .await
    .unwrap();
    assert_eq!(chat.messages().len(), 2);

    let result = chat.send("  What are you working on?  ").await;
    let SendResult::Delivered(reply) = result else {
        panic!("expected a reply");
    };
    assert_eq!(reply.content, "Notes on the Analytical Engine.");
    assert_eq!(chat.mood(), &Mood::Curious);

    let log: Vec<(SenderKind, &str)> = chat
        .messages()
        .iter()
        .map(|m| (m.sender, m.content.as_str()))
        .collect();
    assert_eq!(
        log[2..],
        [
            (SenderKind::User, "What are you working on?"),
            (SenderKind::Persona, "Notes on the Analytical Engine."),
        ]
    );
}

#[tokio::test]
async fn test_direct_chat_without_key_never_calls_backend() {
    let server = MockServer::start().await;
    mount_persona(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "?"})))
        .expect(0)
        .mount(&server)
        .await;

    let mut chat = DirectChat::open(
        session(None),
        rest_gateway(&server),
        inference_client(&server),
        "p1",
        &ChatConfig::default(),
    )
    .await
    .unwrap();

    assert_eq!(chat.send("hello?").await, SendResult::CredentialRequired);
    assert_eq!(chat.messages().len(), 2);
}

#[tokio::test]
async fn test_direct_chat_backend_error_becomes_bubble() {
    let server = MockServer::start().await;
    mount_persona(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/send"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid API key"})),
        )
        .mount(&server)
        .await;

    let mut chat = DirectChat::open(
        session(Some("sk-stale")),
        rest_gateway(&server),
        inference_client(&server),
        "p1",
        &ChatConfig::default(),
    )
    .await
    .unwrap();

    let SendResult::Failed(bubble) = chat.send("hi").await else {
        panic!("expected a failure bubble");
    };
    assert!(bubble.is_error);
    assert_eq!(bubble.sender, SenderKind::Persona);
    assert_eq!(bubble.content, "Invalid API key");
    assert_eq!(chat.messages().len(), 4);
}

#[tokio::test]
async fn test_direct_chat_unreachable_backend_uses_fallback_text() {
    let server = MockServer::start().await;
    mount_persona(&server).await;
    let dead = MockServer::start().await;
    let dead_uri = dead.uri();
    drop(dead);

    let inference = Arc::new(
        HttpInferenceClient::new(&InferenceConfig {
            base_url: dead_uri,
            timeout_seconds: Some(2),
        })
        .unwrap(),
    );
    let mut chat = DirectChat::open(
        session(Some("sk-live")),
        rest_gateway(&server),
        inference,
        "p1",
        &ChatConfig::default(),
    )
    .await
    .unwrap();

    let SendResult::Failed(bubble) = chat.send("anyone there?").await else {
        panic!("expected a failure bubble");
    };
    assert_eq!(bubble.content, DIRECT_SEND_FAILED);
    assert!(!chat.is_retrieving());
}

#[tokio::test]
async fn test_direct_chat_load_failure_is_load_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/personas"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = DirectChat::open(
        session(Some("sk-live")),
        rest_gateway(&server),
        inference_client(&server),
        "p1",
        &ChatConfig::default(),
    )
    .await;
    let Err(err) = result else {
        panic!("expected a load error");
    };
    assert!(matches!(classify(&err), Some(EmrysError::Load(_))));
}

#[tokio::test]
async fn test_hub_chat_reveals_replies_in_order_with_stagger() {
    let server = MockServer::start().await;
    mount_hub(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/chat/group/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "responses": [
                {"persona_id": "p2", "persona_name": "Grace Hopper", "response": "Ship it.", "mood": "happy"},
                {"persona_id": "p1", "persona_name": "Ada Lovelace", "response": "Prove it first.", "mood": "curious"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let mut hub = HubChat::open(
        session(Some("sk-live")),
        rest_gateway(&server),
        inference_client(&server),
        "g1",
        &fast_chat(),
    )
    .await
    .unwrap();
    assert_eq!(hub.roster().len(), 2);

    let started = Instant::now();
    let result = hub.send("@AdaLovelace should we ship?").await;
    assert_eq!(
        result,
        HubSendResult::Dispatched {
            targets: vec!["p1".to_string()],
            replies: 2,
        }
    );

    let first = hub.next_reveal().await.unwrap();
    assert_eq!(first.persona_id.as_deref(), Some("p2"));
    let second = hub.next_reveal().await.unwrap();
    assert_eq!(second.persona_id.as_deref(), Some("p1"));
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(hub.next_reveal().await.is_none());

    assert_eq!(
        hub.active_speaker().map(|s| s.persona_id),
        Some("p1".to_string())
    );
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert!(hub.active_speaker().is_none());

    let senders: Vec<SenderKind> = hub.messages().iter().map(|m| m.sender).collect();
    assert_eq!(
        senders,
        vec![SenderKind::User, SenderKind::Persona, SenderKind::Persona]
    );
}

#[tokio::test]
async fn test_hub_chat_transport_failure_uses_system_bubble() {
    let server = MockServer::start().await;
    mount_hub(&server).await;
    let dead = MockServer::start().await;
    let dead_uri = dead.uri();
    drop(dead);

    let inference = Arc::new(
        HttpInferenceClient::new(&InferenceConfig {
            base_url: dead_uri,
            timeout_seconds: Some(2),
        })
        .unwrap(),
    );
    let mut hub = HubChat::open(
        session(Some("sk-live")),
        rest_gateway(&server),
        inference,
        "g1",
        &fast_chat(),
    )
    .await
    .unwrap();

    let HubSendResult::Failed(bubble) = hub.send("hello hub").await else {
        panic!("expected a failure bubble");
    };
    assert_eq!(bubble.content, HUB_SEND_FAILED);
    assert_eq!(bubble.sender, SenderKind::System);
    assert!(hub.next_reveal().await.is_none());
}
