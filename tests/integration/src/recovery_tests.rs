//! Recovery of upstream rejections over HTTP

use crate::fixtures::*;
use crate::helpers::*;
use crate::mock_providers::*;
use gateway_agents::SessionEvent;
use gateway_telemetry::AuditEventType;
use serde_json::json;

fn single_provider(pa: &MockUpstream, pb: &MockUpstream) -> ConfigFixture {
    ConfigFixture::new(vec![
        ProviderFixture::new("pa", &pa.base_url(), 1),
        ProviderFixture::new("pb", &pb.base_url(), 1),
    ])
    .main(&["PA"])
    .fallbacks(&["PB"])
}

#[tokio::test]
async fn test_failed_generation_executes_tool_without_failover() {
    let pa = MockUpstream::start().await;
    let pb = MockUpstream::start().await;
    pa.once_failed_generation(r#"{"tool":"search","args":{"q":"x"}}"#).await;
    pa.once_text("Found it.").await;
    pb.always_text("fallback").await;

    let gateway = TestGateway::start(&single_provider(&pa, &pb)).await;
    let (events, outcome) = gateway.run("find x").await;

    assert_eq!(outcome, Ok("Found it.".to_string()));
    assert_eq!(
        gateway.tools.calls.lock()[0],
        ("search".to_string(), json!({"q": "x"}))
    );
    assert!(matches!(&events[0], SessionEvent::Observation { tool, .. } if tool == "search"));
    assert_eq!(pb.calls().await, 0);
    assert_eq!(gateway.pool("pa").available, 1);
    assert_eq!(gateway.audit.of_type(AuditEventType::RecoveryApplied).len(), 1);

    let bodies = pa.bodies().await;
    let messages = bodies[1]["messages"].as_array().expect("messages");
    let scratchpad = messages[messages.len() - 2]["content"].as_str().expect("scratchpad");
    assert!(scratchpad.contains(r#"{"tool":"search","args":{"q":"x"}}"#));
}

#[tokio::test]
async fn test_failed_generation_prose_is_final_answer() {
    let pa = MockUpstream::start().await;
    let pb = MockUpstream::start().await;
    pa.once_failed_generation("The answer is 42.").await;

    let gateway = TestGateway::start(&single_provider(&pa, &pb)).await;
    let (_, outcome) = gateway.run("what is the answer").await;

    assert_eq!(outcome, Ok("The answer is 42.".to_string()));
    assert_eq!(pb.calls().await, 0);
}

#[tokio::test]
async fn test_unoffered_tool_in_failed_generation_fails_over() {
    let pa = MockUpstream::start().await;
    let pb = MockUpstream::start().await;
    pa.once_failed_generation(r#"{"tool":"drop_tables","args":{}}"#).await;
    pb.always_text("from b").await;

    let gateway = TestGateway::start(&single_provider(&pa, &pb)).await;
    let (_, outcome) = gateway.run("hello").await;

    assert_eq!(outcome, Ok("from b".to_string()));
    assert!(gateway.tools.calls.lock().is_empty());
    assert_eq!(gateway.audit.of_type(AuditEventType::ChainAdvanced).len(), 1);
}

#[tokio::test]
async fn test_quoted_list_becomes_search_call() {
    let pa = MockUpstream::start().await;
    let pb = MockUpstream::start().await;
    pa.once_text("```json\n[\"rust tokio select\", \"cancellation token\"]\n```").await;
    pa.once_text("Done.").await;

    let gateway = TestGateway::start(&single_provider(&pa, &pb)).await;
    let (_, outcome) = gateway.run("research cancellation").await;

    assert_eq!(outcome, Ok("Done.".to_string()));
    assert_eq!(
        gateway.tools.calls.lock()[0].1,
        json!({"queries": ["rust tokio select", "cancellation token"]})
    );
}
