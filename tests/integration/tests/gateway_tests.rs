//! Gateway Integration Tests
//!
//! Each test runs its own gateway on ephemeral ports against `MockBackend`;
//! no external services are needed.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use integration_tests::{sign, TestGateway, WsClient};
use serde_json::json;

// ============================================================================
// Handshake
// ============================================================================

#[tokio::test]
async fn test_connect_receives_challenge_and_authorizes() {
    let gate = TestGateway::start().await.expect("Failed to start gateway");
    let mut client = gate.connect().await.unwrap();

    let challenge = client.next_json().await.unwrap();
    assert_eq!(challenge["jsonrpc"], "2.0");
    assert_eq!(challenge["method"], "sign");
    assert!(challenge.get("id").is_none());
    let secret = challenge["params"]["secret"].as_str().unwrap().to_string();
    assert_eq!(secret, "secret-1");

    let reply = client
        .call(json!(1), "auth.authorize", json!({"user": "alice", "sign": sign(&secret)}))
        .await
        .unwrap();

    assert_eq!(reply["id"], 1);
    assert_eq!(reply["result"]["user"], "alice");
    assert_eq!(
        gate.backend.calls("auth.authorize"),
        vec![json!({"user": "alice", "sign": "signed:secret-1", "secret": "secret-1", "channelId": 1})]
    );
    assert_eq!(gate.gateway.broker().channels_of("alice").len(), 1);
}

#[tokio::test]
async fn test_authorize_validation() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.challenge().await.unwrap();

    for params in [json!({"user": "alice"}), json!({"user": "alice", "sign": 42}), json!({"sign": "x"})] {
        let reply = client.call(json!("v"), "auth.authorize", params).await.unwrap();
        assert_eq!(reply["id"], "v");
        assert_eq!(reply["error"]["code"], -32602);
    }

    assert!(gate.backend.calls("auth.authorize").is_empty());
}

#[tokio::test]
async fn test_bad_signature_is_denied() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.challenge().await.unwrap();

    let reply = client
        .call(json!(2), "auth.authorize", json!({"user": "alice", "sign": "forged"}))
        .await
        .unwrap();
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["error"]["code"], 1102);

    // Still anonymous
    let reply = client.call(json!(3), "facade.getFeed", json!({})).await.unwrap();
    assert_eq!(reply["error"]["code"], 1101);
}

#[tokio::test]
async fn test_new_secret_after_failed_authorize() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    let secret = client.challenge().await.unwrap();

    client
        .call(json!(1), "auth.authorize", json!({"user": "alice", "sign": "forged"}))
        .await
        .unwrap();

    let reply = client
        .call(json!(2), "auth.authorize", json!({"user": "alice", "sign": sign(&secret)}))
        .await
        .unwrap();
    assert_eq!(reply["error"]["code"], 1102);

    let reply = client.call(json!(3), "auth.generateSecret", json!({})).await.unwrap();
    let fresh = reply["result"]["secret"].as_str().unwrap().to_string();

    let reply = client
        .call(json!(4), "auth.authorize", json!({"user": "alice", "sign": sign(&fresh)}))
        .await
        .unwrap();
    assert_eq!(reply["result"]["user"], "alice");
}

#[tokio::test]
async fn test_retry_same_secret_when_configured() {
    let gate = TestGateway::start_with(&[("GATE_AUTH_RETRY_SAME_SECRET", "true")])
        .await
        .unwrap();
    let mut client = gate.connect().await.unwrap();
    let secret = client.challenge().await.unwrap();

    client
        .call(json!(1), "auth.authorize", json!({"user": "alice", "sign": "forged"}))
        .await
        .unwrap();

    let reply = client
        .call(json!(2), "auth.authorize", json!({"user": "alice", "sign": sign(&secret)}))
        .await
        .unwrap();
    assert_eq!(reply["result"]["user"], "alice");
}

#[tokio::test]
async fn test_local_secret_source() {
    let gate = TestGateway::start_with(&[("GATE_AUTH_SECRET_SOURCE", "local")])
        .await
        .unwrap();
    let mut client = gate.connect().await.unwrap();

    let secret = client.challenge().await.unwrap();
    assert_ne!(secret, "secret-1");
    assert!(gate.backend.calls("auth.generateSecret").is_empty());
}

// ============================================================================
// Routing
// ============================================================================

#[tokio::test]
async fn test_routed_request_round_trip() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.authorize("alice").await.unwrap();

    let reply = client
        .call(json!("feed-1"), "facade.getFeed", json!({"limit": 10}))
        .await
        .unwrap();

    assert_eq!(reply["id"], "feed-1");
    assert_eq!(gate.backend.service_of("facade.getFeed").as_deref(), Some("facade"));

    let payload = &reply["result"]["echo"];
    assert_eq!(payload["_frontendGate"], true);
    assert_eq!(payload["user"], "alice");
    assert_eq!(payload["auth"]["user"], "alice");
    assert_eq!(payload["auth"]["roles"], json!(["member"]));
    assert_eq!(payload["routing"], json!({"requestId": "feed-1", "channelId": 1}));
    assert_eq!(payload["params"], json!({"limit": 10}));
    assert_eq!(payload["meta"]["clientRequestIp"], "127.0.0.1");
}

#[tokio::test]
async fn test_forwarded_client_address() {
    let gate = TestGateway::start_with(&[("GATE_AUTH_ENABLED", "false")])
        .await
        .unwrap();
    let mut client = WsClient::connect(gate.ws_addr(), Some("203.0.113.9, 10.0.0.2"))
        .await
        .unwrap();

    let reply = client.call(json!(1), "facade.whoami", json!({})).await.unwrap();
    assert_eq!(
        reply["result"]["echo"]["meta"]["clientRequestIp"],
        "127.0.0.1<= 203.0.113.9"
    );
}

#[tokio::test]
async fn test_anonymous_allow_list() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.challenge().await.unwrap();

    let reply = client.call(json!(1), "facade.getFeed", json!({})).await.unwrap();
    assert_eq!(reply["id"], 1);
    assert_eq!(reply["error"]["code"], 1101);

    let reply = client.call(json!(2), "facade.public", json!({})).await.unwrap();
    assert_eq!(reply["id"], 2);
    assert_eq!(reply["result"]["echo"]["auth"], json!({}));
}

#[tokio::test]
async fn test_auth_disabled_routes_immediately() {
    let gate = TestGateway::start_with(&[("GATE_AUTH_ENABLED", "false")])
        .await
        .unwrap();
    let mut client = gate.connect().await.unwrap();

    // No challenge: the first message is the reply
    let reply = client.call(json!(1), "facade.getFeed", json!({})).await.unwrap();
    assert_eq!(reply["id"], 1);
    assert!(reply.get("result").is_some());
}

#[tokio::test]
async fn test_routing_errors() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.authorize("alice").await.unwrap();

    let reply = client.call(json!(1), "getFeed", json!({})).await.unwrap();
    assert_eq!(reply["error"]["code"], -32601);

    let reply = client.call(json!(2), "wallet.balance", json!({})).await.unwrap();
    assert_eq!(reply["error"]["code"], 1103);
}

#[tokio::test]
async fn test_relay_failure_keeps_request_id() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.authorize("alice").await.unwrap();

    let reply = client.call(json!(77), "facade.fail", json!({})).await.unwrap();
    assert_eq!(reply["id"], 77);
    assert_eq!(reply["error"]["code"], 1104);
    assert!(!reply["error"]["message"].as_str().unwrap().contains("refused"));
}

#[tokio::test]
async fn test_backend_error_envelope_is_relayed() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.authorize("alice").await.unwrap();

    let reply = client.call(json!(5), "facade.reject", json!({})).await.unwrap();
    assert_eq!(reply["id"], 5);
    assert_eq!(reply["error"], json!({"code": 404, "message": "post not found"}));
}

// ============================================================================
// Framing
// ============================================================================

#[tokio::test]
async fn test_malformed_frames() {
    let gate = TestGateway::start_with(&[("GATE_AUTH_ENABLED", "false")])
        .await
        .unwrap();
    let mut client = gate.connect().await.unwrap();

    // Neither answered
    client.send_raw("{not json").await.unwrap();
    client.send_raw(r#"{"method":"facade.getFeed","params":{}}"#).await.unwrap();

    // Answered with the recovered id
    let reply = client.call(json!(9), "", json!({})).await.unwrap();
    assert_eq!(reply["id"], 9);
    assert_eq!(reply["error"]["code"], -32600);

    // Connection still usable
    let reply = client.call(json!(10), "facade.getFeed", json!({})).await.unwrap();
    assert_eq!(reply["id"], 10);
    assert!(reply.get("result").is_some());
}

// ============================================================================
// Push
// ============================================================================

#[tokio::test]
async fn test_push_to_live_connection() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.authorize("alice").await.unwrap();

    let response = gate
        .push(json!({"channelId": 1, "method": "update", "result": {"unread": 3}}))
        .await
        .unwrap();
    assert_eq!(response["result"], "Ok");

    let push = client.next_json().await.unwrap();
    assert!(push.get("id").is_none());
    assert_eq!(push["method"], "update");
    assert_eq!(push["result"], json!({"unread": 3}));
}

#[tokio::test]
async fn test_push_error_by_identity() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.authorize("bob").await.unwrap();

    let response = gate
        .push(json!({"user": "bob", "method": "update", "error": {"code": 7, "message": "stale"}}))
        .await
        .unwrap();
    assert_eq!(response["result"], "Ok");

    let push = client.next_json().await.unwrap();
    assert!(push.get("id").is_none());
    assert_eq!(push["error"]["code"], 7);
    assert!(push.get("result").is_none());
}

#[tokio::test]
async fn test_push_to_missing_connection() {
    let gate = TestGateway::start().await.unwrap();

    let response = gate
        .push(json!({"channelId": 404, "method": "update", "result": {}}))
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], 1105);

    let response = gate
        .push(json!({"user": "nobody", "method": "update", "result": {}}))
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], 1105);
}

#[tokio::test]
async fn test_push_after_close() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.authorize("alice").await.unwrap();
    client.close().await.unwrap();

    assert!(
        gate.wait_until(Duration::from_secs(2), |g| g.broker().session_count() == 0)
            .await
    );

    let response = gate
        .push(json!({"channelId": 1, "method": "update", "result": {}}))
        .await
        .unwrap();
    assert_eq!(response["error"]["code"], 1105);
}

// ============================================================================
// Lifecycle
// ============================================================================

#[tokio::test]
async fn test_offline_notified_on_disconnect() {
    let gate = TestGateway::start().await.unwrap();
    let mut client = gate.connect().await.unwrap();
    client.authorize("alice").await.unwrap();
    client.close().await.unwrap();

    let backend = gate.backend.clone();
    assert!(
        gate.wait_until(Duration::from_secs(2), |_| !backend.calls("offline").is_empty())
            .await
    );
    assert_eq!(
        gate.backend.calls("offline"),
        vec![json!({"user": "alice", "channelId": 1})]
    );
    assert!(gate.gateway.broker().channels_of("alice").is_empty());
}

#[tokio::test]
async fn test_silent_connection_is_evicted() {
    let gate = TestGateway::start_with(&[("GATE_CLIENT_TIMEOUT_MS", "150")])
        .await
        .unwrap();

    // Never read: pings go unanswered
    let mut silent = gate.connect().await.unwrap();
    assert!(
        gate.wait_until(Duration::from_secs(2), |g| g.connections().connection_count() == 1)
            .await
    );

    assert!(
        gate.wait_until(Duration::from_secs(3), |g| {
            g.connections().connection_count() == 0 && g.broker().session_count() == 0
        })
        .await
    );
    assert!(silent.closed_within(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_chatty_connection_survives_sweeps() {
    let gate = TestGateway::start_with(&[
        ("GATE_CLIENT_TIMEOUT_MS", "150"),
        ("GATE_AUTH_ENABLED", "false"),
    ])
    .await
    .unwrap();
    let mut client = gate.connect().await.unwrap();

    for _ in 0..12 {
        // Frames without an id are dropped but still count as traffic
        client.send_raw(r#"{"method":"facade.noop"}"#).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    assert_eq!(gate.gateway.connections().connection_count(), 1);
    let reply = client.call(json!(1), "facade.getFeed", json!({})).await.unwrap();
    assert_eq!(reply["id"], 1);
}

#[tokio::test]
async fn test_health_endpoints() {
    let gate = TestGateway::start().await.unwrap();

    for url in [
        format!("http://{}/health", gate.ws_addr()),
        format!("{}/health", gate.inner_url()),
    ] {
        let response = gate.http.get(&url).send().await.unwrap();
        assert!(response.status().is_success());
        assert_eq!(response.text().await.unwrap(), "OK");
    }
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let gate = TestGateway::start().await.unwrap();
    let addr = gate.ws_addr();
    let mut client = gate.connect().await.unwrap();
    client.challenge().await.unwrap();

    gate.shutdown().await.unwrap();

    assert!(client.closed_within(Duration::from_secs(2)).await);
    assert!(WsClient::connect(addr, None).await.is_err());
}
