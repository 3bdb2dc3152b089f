//! Prometheus metrics for the gateway engine.

use prometheus::{Encoder, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder};

/// Metrics registration or encoding error
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    /// Prometheus rejected a metric
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    /// Exposition was not valid UTF-8
    #[error("Metrics encoding error: {0}")]
    Encoding(String),
}

/// Engine metrics on a private registry
#[derive(Debug, Clone)]
pub struct GatewayMetrics {
    registry: Registry,
    upstream_attempts: IntCounterVec,
    chain_advances: IntCounterVec,
    recoveries: IntCounterVec,
    sessions: IntCounterVec,
    tool_calls: IntCounterVec,
    key_pool: IntGaugeVec,
}

impl GatewayMetrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let upstream_attempts = IntCounterVec::new(
            Opts::new("gateway_upstream_attempts_total", "Upstream model calls"),
            &["provider", "outcome"],
        )?;
        let chain_advances = IntCounterVec::new(
            Opts::new("gateway_chain_advances_total", "Priority chain fail-overs"),
            &["agent", "reason"],
        )?;
        let recoveries = IntCounterVec::new(
            Opts::new("gateway_recoveries_total", "Malformed-response recoveries"),
            &["provider", "result"],
        )?;
        let sessions = IntCounterVec::new(
            Opts::new("gateway_sessions_total", "Finished sessions"),
            &["agent", "status"],
        )?;
        let tool_calls = IntCounterVec::new(
            Opts::new("gateway_tool_calls_total", "Tool executions"),
            &["tool", "outcome"],
        )?;
        let key_pool = IntGaugeVec::new(
            Opts::new("gateway_key_pool_keys", "Credentials per pool partition"),
            &["provider", "state"],
        )?;

        registry.register(Box::new(upstream_attempts.clone()))?;
        registry.register(Box::new(chain_advances.clone()))?;
        registry.register(Box::new(recoveries.clone()))?;
        registry.register(Box::new(sessions.clone()))?;
        registry.register(Box::new(tool_calls.clone()))?;
        registry.register(Box::new(key_pool.clone()))?;

        Ok(Self {
            registry,
            upstream_attempts,
            chain_advances,
            recoveries,
            sessions,
            tool_calls,
            key_pool,
        })
    }

    /// Count an upstream call
    pub fn record_upstream(&self, provider: &str, outcome: &str) {
        self.upstream_attempts
            .with_label_values(&[provider, outcome])
            .inc();
    }

    /// Count a chain advance
    pub fn record_chain_advance(&self, agent: &str, reason: &str) {
        self.chain_advances.with_label_values(&[agent, reason]).inc();
    }

    /// Count a recovery attempt
    pub fn record_recovery(&self, provider: &str, result: &str) {
        self.recoveries.with_label_values(&[provider, result]).inc();
    }

    /// Count a finished session
    pub fn record_session(&self, agent: &str, status: &str) {
        self.sessions.with_label_values(&[agent, status]).inc();
    }

    /// Count a tool execution
    pub fn record_tool(&self, tool: &str, outcome: &str) {
        self.tool_calls.with_label_values(&[tool, outcome]).inc();
    }

    /// Set a key pool gauge
    pub fn set_key_pool(&self, provider: &str, state: &str, value: usize) {
        self.key_pool
            .with_label_values(&[provider, state])
            .set(i64::try_from(value).unwrap_or(i64::MAX));
    }

    /// Current value of an upstream attempt counter
    #[must_use]
    pub fn upstream_count(&self, provider: &str, outcome: &str) -> u64 {
        self.upstream_attempts
            .with_label_values(&[provider, outcome])
            .get()
    }

    /// Underlying registry
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(e.to_string()))
    }
}
