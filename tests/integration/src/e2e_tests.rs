//! End-to-end integration tests
//!
//! Sessions run against real HTTP upstreams (wiremock) through the full
//! stack: config file, snapshot, key manager, rotation, executor.

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use gateway_agents::{FailureKind, SessionEvent};
use gateway_core::FailureClass;
use gateway_telemetry::AuditEventType;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_e2e_plain_answer_uses_pooled_key() {
    let pa = MockUpstream::start().await;
    pa.once_text("Paris is the capital of France.").await;

    let gateway = TestGateway::start(
        &ConfigFixture::new(vec![ProviderFixture::new("pa", &pa.base_url(), 1)]).main(&["PA"]),
    )
    .await;

    let (events, outcome) = gateway.run("What is the capital of France?").await;
    assert_eq!(outcome, Ok("Paris is the capital of France.".to_string()));
    assert_eq!(events.len(), 1);

    let requests = pa.requests().await;
    assert_eq!(requests.len(), 1);
    let auth = requests[0]
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .expect("authorization header");
    assert_eq!(auth, "Bearer sk-pa-0000-abcdefghijkl");

    let body = &pa.bodies().await[0];
    assert_eq!(body["model"], "pa-model");
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["tools"][0]["function"]["name"], "search");

    assert_eq!(gateway.pool("pa").available, 1);
    assert_eq!(gateway.metrics.upstream_count("pa", "success"), 1);
}

#[tokio::test]
async fn test_e2e_native_tool_loop() {
    let pa = MockUpstream::start().await;
    pa.once_tool_call("search", json!({"q": "rust 1.75 release"})).await;
    pa.once_text("Rust 1.75 stabilized async fn in traits.").await;

    let gateway = TestGateway::start(
        &ConfigFixture::new(vec![ProviderFixture::new("pa", &pa.base_url(), 1)]).main(&["PA"]),
    )
    .await;

    let (events, outcome) = gateway.run("What changed in Rust 1.75?").await;
    assert_eq!(outcome, Ok("Rust 1.75 stabilized async fn in traits.".to_string()));
    assert!(matches!(
        &events[0],
        SessionEvent::Observation { step: 1, tool, .. } if tool == "search"
    ));
    assert_eq!(
        gateway.tools.calls.lock()[0],
        ("search".to_string(), json!({"q": "rust 1.75 release"}))
    );

    let bodies = pa.bodies().await;
    assert_eq!(bodies.len(), 2);
    let messages = bodies[1]["messages"].as_array().expect("messages");
    let scratchpad = messages[messages.len() - 2]["content"].as_str().expect("scratchpad");
    assert!(scratchpad.contains("top result for"));
    assert_eq!(messages[messages.len() - 1]["content"], "Proceed with the next step.");
}

#[tokio::test]
async fn test_e2e_tool_failure_is_an_observation() {
    let pa = MockUpstream::start().await;
    pa.once_text(r#"{"tool": "search", "args": {"q": "x"}}"#).await;
    pa.once_text("The search failed, so here is what I know.").await;

    let tools = RecordingTools {
        fail_with: Some("timeout".to_string()),
        ..RecordingTools::default()
    };
    let gateway = TestGateway::start_with_tools(
        &ConfigFixture::new(vec![ProviderFixture::new("pa", &pa.base_url(), 1)]).main(&["PA"]),
        tools,
    )
    .await;

    let (events, outcome) = gateway.run("look it up").await;
    assert!(outcome.is_ok());
    assert!(matches!(
        &events[0],
        SessionEvent::Observation { content, .. } if content == "Error: timeout"
    ));

    let bodies = pa.bodies().await;
    let messages = bodies[1]["messages"].as_array().expect("messages");
    let scratchpad = messages[messages.len() - 2]["content"].as_str().expect("scratchpad");
    assert!(scratchpad.contains("Error: timeout"));
}

#[tokio::test]
async fn test_e2e_rotation_spreads_sessions_over_main() {
    let pa = MockUpstream::start().await;
    let pb = MockUpstream::start().await;
    pa.always_text("from a").await;
    pb.always_text("from b").await;

    let gateway = TestGateway::start(
        &ConfigFixture::new(vec![
            ProviderFixture::new("pa", &pa.base_url(), 1),
            ProviderFixture::new("pb", &pb.base_url(), 1),
        ])
        .main(&["PA", "PB"]),
    )
    .await;

    let (_, first) = gateway.run("one").await;
    let (_, second) = gateway.run("two").await;

    assert_ne!(first, second);
    assert_eq!(pa.calls().await, 1);
    assert_eq!(pb.calls().await, 1);
}

#[tokio::test]
async fn test_e2e_all_rate_limited_exhausts_chain() {
    let pa = MockUpstream::start().await;
    let pb = MockUpstream::start().await;
    let pc = MockUpstream::start().await;
    for upstream in [&pa, &pb, &pc] {
        upstream.always_rate_limited().await;
    }

    let gateway = TestGateway::start(
        &ConfigFixture::new(vec![
            ProviderFixture::new("pa", &pa.base_url(), 1),
            ProviderFixture::new("pb", &pb.base_url(), 1),
            ProviderFixture::new("pc", &pc.base_url(), 1),
        ])
        .main(&["PA"])
        .fallbacks(&["PB", "PC"]),
    )
    .await;

    let (_, outcome) = gateway.run("hello").await;
    let failure = outcome.expect_err("chain exhausted");
    assert_eq!(failure.kind, FailureKind::ChainExhausted);
    assert_eq!(failure.attempts.len(), 3);
    assert!(failure
        .attempts
        .iter()
        .all(|a| a.class == FailureClass::RateLimited));

    assert_eq!(pa.calls().await + pb.calls().await + pc.calls().await, 3);
    for provider in ["pa", "pb", "pc"] {
        let status = gateway.pool(provider);
        assert_eq!(status.quarantined, 1);
        assert_eq!(status.available, 0);
        assert_eq!(gateway.metrics.upstream_count(provider, "rate_limited"), 1);
    }
    assert_eq!(gateway.audit.of_type(AuditEventType::SessionFailed).len(), 1);
}

#[tokio::test]
async fn test_e2e_upstream_timeout_fails_over() {
    let pa = MockUpstream::start().await;
    let pb = MockUpstream::start().await;
    pa.always_delayed("too late", Duration::from_secs(10)).await;
    pb.always_text("from b").await;

    let gateway = TestGateway::start(
        &ConfigFixture::new(vec![
            ProviderFixture::new("pa", &pa.base_url(), 1),
            ProviderFixture::new("pb", &pb.base_url(), 1),
        ])
        .main(&["PA"])
        .fallbacks(&["PB"])
        .engine("upstream_timeout: 1s"),
    )
    .await;

    let (_, outcome) = gateway.run("hello").await;
    assert_eq!(outcome, Ok("from b".to_string()));
    assert_eq!(gateway.pool("pa").available, 1);
    assert_eq!(gateway.metrics.upstream_count("pa", "timeout"), 1);
}

#[tokio::test]
async fn test_e2e_revoked_key_is_retired() {
    let pa = MockUpstream::start().await;
    let pb = MockUpstream::start().await;
    pa.always_unauthorized().await;
    pb.always_text("from b").await;

    let gateway = TestGateway::start(
        &ConfigFixture::new(vec![
            ProviderFixture::new("pa", &pa.base_url(), 2),
            ProviderFixture::new("pb", &pb.base_url(), 1),
        ])
        .main(&["PA"])
        .fallbacks(&["PB"]),
    )
    .await;

    let (_, outcome) = gateway.run("hello").await;
    assert_eq!(outcome, Ok("from b".to_string()));

    let status = gateway.pool("pa");
    assert_eq!(status.retired, 1);
    assert_eq!(status.available, 1);
}

#[tokio::test]
async fn test_e2e_keyless_local_provider() {
    let local = MockUpstream::start().await;
    local.once_text("local answer").await;

    let gateway = TestGateway::start(
        &ConfigFixture::new(vec![ProviderFixture::new("local-llama", &local.base_url(), 0)])
            .main(&["LOCAL-LLAMA"]),
    )
    .await;

    let (_, outcome) = gateway.run("hello").await;
    assert_eq!(outcome, Ok("local answer".to_string()));
    assert!(local.requests().await[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn test_e2e_cancel_mid_call_returns_key() {
    let pa = MockUpstream::start().await;
    let pb = MockUpstream::start().await;
    pa.always_delayed("never seen", Duration::from_secs(30)).await;
    pb.always_text("from b").await;

    let gateway = TestGateway::start(
        &ConfigFixture::new(vec![
            ProviderFixture::new("pa", &pa.base_url(), 1),
            ProviderFixture::new("pb", &pb.base_url(), 1),
        ])
        .main(&["PA"])
        .fallbacks(&["PB"])
        .engine("upstream_timeout: 60s"),
    )
    .await;

    let handle = gateway.ask("hello");
    for _ in 0..200 {
        if gateway.pool("pa").leased == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(gateway.pool("pa").leased, 1);

    handle.cancel();
    let failure = handle.outcome().await.expect_err("cancelled");
    assert_eq!(failure.kind, FailureKind::Cancelled);

    let status = gateway.pool("pa");
    assert_eq!(status.available, 1);
    assert_eq!(status.leased, 0);
    assert_eq!(pb.calls().await, 0);
}

#[tokio::test]
async fn test_e2e_session_deadline() {
    let pa = MockUpstream::start().await;
    pa.always_delayed("never seen", Duration::from_secs(30)).await;

    let gateway = TestGateway::start(
        &ConfigFixture::new(vec![ProviderFixture::new("pa", &pa.base_url(), 1)])
            .main(&["PA"])
            .engine("upstream_timeout: 60s")
            .engine("session_timeout: 1s"),
    )
    .await;

    let (_, outcome) = gateway.run("hello").await;
    assert_eq!(outcome.expect_err("deadline").kind, FailureKind::Timeout);
    assert_eq!(gateway.pool("pa").available, 1);
}
