//! Test helper utilities for integration tests

use crate::fixtures::ConfigFixture;
use async_trait::async_trait;
use gateway_agents::{Executor, SessionEvent, SessionFailure, SessionHandle, ToolError, ToolExecutor};
use gateway_config::{load_config, ConfigSnapshot};
use gateway_core::{ChatMessage, RequestOptions, ToolDefinition};
use gateway_resilience::{KeyManager, KeyManagerConfig, PoolStatus};
use gateway_telemetry::{GatewayMetrics, MemoryAuditSink};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Initialize tracing for tests (only once, and only with `TEST_LOG` set)
pub fn init_tracing() {
    TRACING.call_once(|| {
        if std::env::var("TEST_LOG").is_ok() {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .with_test_writer()
                .try_init();
        }
    });
}

/// A `search` tool that records its calls
#[derive(Default)]
pub struct RecordingTools {
    pub calls: Mutex<Vec<(String, Value)>>,
    pub fail_with: Option<String>,
}

#[async_trait]
impl ToolExecutor for RecordingTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        vec![ToolDefinition::function(
            "search",
            "Search the web",
            json!({"type": "object", "properties": {"q": {"type": "string"}}}),
        )]
    }

    async fn execute_tool(&self, name: &str, arguments: Value) -> Result<String, ToolError> {
        self.calls.lock().push((name.to_string(), arguments.clone()));
        match &self.fail_with {
            Some(message) => Err(ToolError::Failed(message.clone())),
            None => Ok(format!("top result for {arguments}")),
        }
    }
}

/// Engine wired from a configuration file, the way the binary does it
pub struct TestGateway {
    pub executor: Executor,
    pub keys: Arc<KeyManager>,
    pub audit: Arc<MemoryAuditSink>,
    pub metrics: GatewayMetrics,
    pub tools: Arc<RecordingTools>,
    _config_file: tempfile::NamedTempFile,
}

impl TestGateway {
    /// Write the fixture to a temporary YAML file and build the engine from it
    pub async fn start(fixture: &ConfigFixture) -> Self {
        Self::start_with_tools(fixture, RecordingTools::default()).await
    }

    /// Same as [`TestGateway::start`] with a custom tool executor
    pub async fn start_with_tools(fixture: &ConfigFixture, tools: RecordingTools) -> Self {
        init_tracing();

        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .expect("temp config");
        file.write_all(fixture.to_yaml().as_bytes()).expect("write config");

        let config = load_config(file.path()).await.expect("config loads");
        let snapshot = Arc::new(ConfigSnapshot::load(config).await.expect("snapshot"));

        let keys = Arc::new(KeyManager::new(
            KeyManagerConfig::default(),
            snapshot.credentials().clone(),
        ));
        let audit = Arc::new(MemoryAuditSink::new());
        let metrics = GatewayMetrics::new().expect("metrics");
        let tools = Arc::new(tools);

        let executor = Executor::builder(snapshot)
            .credential_broker(keys.clone())
            .tools(tools.clone())
            .audit_sink(audit.clone())
            .metrics(metrics.clone())
            .build()
            .expect("executor");

        Self {
            executor,
            keys,
            audit,
            metrics,
            tools,
            _config_file: file,
        }
    }

    /// Start a session with one user message
    pub fn ask(&self, prompt: &str) -> SessionHandle {
        self.executor
            .start_session("standard", vec![ChatMessage::user(prompt)], RequestOptions::new())
            .expect("session starts")
    }

    /// Run a session to completion and collect every event
    pub async fn run(&self, prompt: &str) -> (Vec<SessionEvent>, Result<String, SessionFailure>) {
        let mut handle = self.ask(prompt);
        let mut events = Vec::new();
        while let Some(event) = handle.recv().await {
            let terminal = event.is_terminal();
            events.push(event);
            if terminal {
                break;
            }
        }
        let outcome = match events.last() {
            Some(SessionEvent::Final { text }) => Ok(text.clone()),
            Some(SessionEvent::Failed(failure)) => Err(failure.clone()),
            other => panic!("session ended without a terminal event: {other:?}"),
        };
        (events, outcome)
    }

    /// Pool status of one provider
    pub fn pool(&self, provider: &str) -> PoolStatus {
        self.keys.status().get(provider).cloned().expect("known provider")
    }
}
