//! Audit events for session execution.
//!
//! The executor emits one event per notable step (session start, upstream
//! attempt, chain advance, recovery, tool execution, completion). Emission is
//! synchronous and never blocks the session: sinks either log, drop, or hand
//! the event to a bounded channel drained by a background forwarder.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Default bound on a single transport send
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Minimum spacing between repeated delivery-failure warnings
pub const FAILURE_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Audit event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Session accepted and chain built
    SessionStarted,
    /// A reasoning step began
    StepStarted,
    /// One upstream call finished (either way)
    UpstreamAttempt,
    /// The chain moved to its next entry
    ChainAdvanced,
    /// A malformed upstream response was salvaged
    RecoveryApplied,
    /// A tool call finished
    ToolExecuted,
    /// Session produced a final answer
    SessionCompleted,
    /// Session ended in failure
    SessionFailed,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SessionStarted => write!(f, "session_started"),
            Self::StepStarted => write!(f, "step_started"),
            Self::UpstreamAttempt => write!(f, "upstream_attempt"),
            Self::ChainAdvanced => write!(f, "chain_advanced"),
            Self::RecoveryApplied => write!(f, "recovery_applied"),
            Self::ToolExecuted => write!(f, "tool_executed"),
            Self::SessionCompleted => write!(f, "session_completed"),
            Self::SessionFailed => write!(f, "session_failed"),
        }
    }
}

/// Audit event outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutcome {
    /// Action succeeded
    Success,
    /// Action failed
    Failure,
    /// Not applicable
    Unknown,
}

/// Complete audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event identifier
    pub id: String,
    /// Event timestamp
    pub timestamp: DateTime<Utc>,
    /// Event type
    pub event_type: AuditEventType,
    /// Session the event belongs to
    pub session_id: String,
    /// Agent serving the session
    pub agent: String,
    /// Step number, when the event is tied to a step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    /// Outcome
    pub outcome: AuditOutcome,
    /// Additional metadata
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl AuditEvent {
    /// Start building an event
    #[must_use]
    pub fn builder(
        event_type: AuditEventType,
        session_id: impl Into<String>,
        agent: impl Into<String>,
    ) -> AuditEventBuilder {
        AuditEventBuilder {
            event_type,
            session_id: session_id.into(),
            agent: agent.into(),
            step: None,
            outcome: AuditOutcome::Unknown,
            metadata: HashMap::new(),
        }
    }

    /// Metadata value as a string, if present and a string
    #[must_use]
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(serde_json::Value::as_str)
    }
}

/// Builder for audit events
#[derive(Debug)]
pub struct AuditEventBuilder {
    event_type: AuditEventType,
    session_id: String,
    agent: String,
    step: Option<u32>,
    outcome: AuditOutcome,
    metadata: HashMap<String, serde_json::Value>,
}

impl AuditEventBuilder {
    /// Set step number
    #[must_use]
    pub fn step(mut self, step: u32) -> Self {
        self.step = Some(step);
        self
    }

    /// Set outcome
    #[must_use]
    pub fn outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Add metadata
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json_value) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), json_value);
        }
        self
    }

    /// Build the audit event
    #[must_use]
    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: self.event_type,
            session_id: self.session_id,
            agent: self.agent,
            step: self.step,
            outcome: self.outcome,
            metadata: self.metadata,
        }
    }
}

/// Fire-and-forget audit sink.
///
/// `emit` must return promptly; a slow or failing backend never delays or
/// fails the session.
pub trait AuditSink: Send + Sync + std::fmt::Debug {
    /// Record an event
    fn emit(&self, event: AuditEvent);
}

/// Sink that writes events as structured log lines
#[derive(Debug, Clone, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let metadata = serde_json::to_string(&event.metadata).unwrap_or_default();
        match event.outcome {
            AuditOutcome::Failure => warn!(
                target: "audit",
                event_id = %event.id,
                event_type = %event.event_type,
                session_id = %event.session_id,
                agent = %event.agent,
                step = ?event.step,
                metadata = %metadata,
                "Audit event"
            ),
            _ => info!(
                target: "audit",
                event_id = %event.id,
                event_type = %event.event_type,
                session_id = %event.session_id,
                agent = %event.agent,
                step = ?event.step,
                metadata = %metadata,
                "Audit event"
            ),
        }
    }
}

/// Sink that discards everything
#[derive(Debug, Clone, Default)]
pub struct NoOpAuditSink;

impl AuditSink for NoOpAuditSink {
    fn emit(&self, _event: AuditEvent) {}
}

/// Sink that keeps events in memory, newest last
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    /// Create an empty sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Recorded events of one type
    #[must_use]
    pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}

/// Audit delivery error
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Backend rejected or failed the send
    #[error("Audit transport failed: {0}")]
    Transport(String),
    /// Send exceeded the per-send bound
    #[error("Audit send timed out after {0:?}")]
    Timeout(Duration),
}

/// Asynchronous backend that receives audit events (message bus, store, ...)
#[async_trait]
pub trait AuditTransport: Send + Sync + std::fmt::Debug {
    /// Deliver one event
    async fn send(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Logs a warning at most once per interval
#[derive(Debug)]
struct FailureLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl FailureLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    fn should_log(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match *last {
            Some(at) if now.duration_since(at) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Sink that queues events for a background forwarder.
///
/// When the queue is full the event is dropped; drops and transport failures
/// are logged at most once per [`FAILURE_LOG_INTERVAL`].
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::Sender<AuditEvent>,
    limiter: Arc<FailureLimiter>,
}

impl ChannelAuditSink {
    /// Create the sink and spawn its forwarder onto the current runtime
    #[must_use]
    pub fn spawn(
        transport: Arc<dyn AuditTransport>,
        capacity: usize,
        send_timeout: Duration,
    ) -> (Self, AuditForwarder) {
        let (sender, mut receiver) = mpsc::channel::<AuditEvent>(capacity.max(1));
        let limiter = Arc::new(FailureLimiter::new(FAILURE_LOG_INTERVAL));
        let task_limiter = Arc::clone(&limiter);

        let handle = tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let result = match tokio::time::timeout(send_timeout, transport.send(&event)).await {
                    Ok(result) => result,
                    Err(_) => Err(AuditError::Timeout(send_timeout)),
                };
                match result {
                    Ok(()) => debug!(event_id = %event.id, "Audit event delivered"),
                    Err(e) => {
                        if task_limiter.should_log() {
                            warn!(error = %e, event_type = %event.event_type, "Audit delivery failed");
                        }
                    }
                }
            }
        });

        (
            Self { sender, limiter },
            AuditForwarder {
                handle: Some(handle),
            },
        )
    }
}

impl AuditSink for ChannelAuditSink {
    fn emit(&self, event: AuditEvent) {
        if let Err(e) = self.sender.try_send(event) {
            if self.limiter.should_log() {
                warn!(error = %e, "Audit queue rejected event");
            }
        }
    }
}

/// Handle to the background audit forwarder
#[derive(Debug)]
pub struct AuditForwarder {
    handle: Option<JoinHandle<()>>,
}

impl AuditForwarder {
    /// Wait until every queued event has been handed to the transport.
    ///
    /// The forwarder exits once all senders are dropped.
    pub async fn drain(mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for AuditForwarder {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct CountingTransport {
        delivered: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl AuditTransport for CountingTransport {
        async fn send(&self, _event: &AuditEvent) -> Result<(), AuditError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.delivered.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn event(event_type: AuditEventType) -> AuditEvent {
        AuditEvent::builder(event_type, "sess-1", "standard")
            .step(2)
            .outcome(AuditOutcome::Success)
            .metadata("provider", "groq")
            .build()
    }

    #[test]
    fn test_builder_fields() {
        let e = event(AuditEventType::UpstreamAttempt);
        assert_eq!(e.session_id, "sess-1");
        assert_eq!(e.step, Some(2));
        assert_eq!(e.meta_str("provider"), Some("groq"));
        assert_eq!(e.event_type.to_string(), "upstream_attempt");
    }

    #[test]
    fn test_memory_sink_filters_by_type() {
        let sink = MemoryAuditSink::new();
        sink.emit(event(AuditEventType::SessionStarted));
        sink.emit(event(AuditEventType::ChainAdvanced));
        sink.emit(event(AuditEventType::ChainAdvanced));
        assert_eq!(sink.events().len(), 3);
        assert_eq!(sink.of_type(AuditEventType::ChainAdvanced).len(), 2);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_events() {
        let transport = Arc::new(CountingTransport::default());
        let (sink, forwarder) = ChannelAuditSink::spawn(transport.clone(), 16, DEFAULT_SEND_TIMEOUT);

        for _ in 0..5 {
            sink.emit(event(AuditEventType::StepStarted));
        }
        drop(sink);
        forwarder.drain().await;
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_transport_is_bounded() {
        let transport = Arc::new(CountingTransport {
            delivered: AtomicUsize::new(0),
            delay: Some(Duration::from_secs(30)),
        });
        let (sink, forwarder) = ChannelAuditSink::spawn(transport.clone(), 4, Duration::from_secs(1));

        sink.emit(event(AuditEventType::SessionCompleted));
        sink.emit(event(AuditEventType::SessionCompleted));
        drop(sink);
        forwarder.drain().await;
        assert_eq!(transport.delivered.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failure_limiter() {
        let limiter = FailureLimiter::new(Duration::from_secs(60));
        assert!(limiter.should_log());
        assert!(!limiter.should_log());
    }
}
