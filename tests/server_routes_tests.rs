// ABOUTME: Control-plane route tests over a live ephemeral-port HTTP server
// ABOUTME: Exercises the assembled router: health, manual send, stubs, metrics

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use twitch_bridge::config::TwitchConfig;
use twitch_bridge::server::{router, ServerState};
use twitch_bridge::twitch::TwitchConnector;

/// Serve the full route table on an ephemeral port with a scratch metrics
/// handle, never touching the global recorder.
async fn start_control_server() -> SocketAddr {
    let twitch = TwitchConnector::new(TwitchConfig {
        channel: "somechannel".to_string(),
        bot_name: "SomeBot".to_string(),
        client_id: "client-id".to_string(),
        mention_aliases: vec!["somebot".to_string()],
        chat_url: "ws://127.0.0.1:1/".to_string(),
        device_endpoint: "http://127.0.0.1:1/device".to_string(),
        token_endpoint: "http://127.0.0.1:1/token".to_string(),
    });
    let recorder = PrometheusBuilder::new().build_recorder();
    let app = router(ServerState { twitch, port: 8004 }, recorder.handle());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_health_route_reports_service() {
    let addr = start_control_server().await;

    let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "twitch_service");
    assert_eq!(body["port"], 8004);
}

#[tokio::test]
async fn test_chat_send_route_prefixes_username() {
    let addr = start_control_server().await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{addr}/chat/send"))
        .json(&json!({"message": "welcome in!", "username": "viewer1"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["sent"], "@viewer1 welcome in!");
}

#[tokio::test]
async fn test_engagement_stub_routes_return_not_implemented() {
    let addr = start_control_server().await;

    let client = reqwest::Client::new();
    let cases = [
        (
            "poll/create",
            json!({"title": "Next game?", "choices": ["A", "B"]}),
            "Poll creation coming soon",
        ),
        (
            "prediction/create",
            json!({"title": "Will we win?", "outcomes": ["yes", "no"]}),
            "Prediction creation coming soon",
        ),
        (
            "redeem/create",
            json!({"title": "Hydrate", "cost": 100}),
            "Redeem creation coming soon",
        ),
    ];

    for (route, payload, detail) in cases {
        let response = client
            .post(format!("http://{addr}/{route}"))
            .json(&payload)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 501, "{route}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["detail"], detail, "{route}");
    }
}

#[tokio::test]
async fn test_metrics_route_serves_render() {
    let addr = start_control_server().await;

    let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();
    assert_eq!(response.status(), 200);
}
