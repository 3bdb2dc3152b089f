//! # Gateway Telemetry
//!
//! Observability for the agent gateway engine.
//!
//! This crate provides:
//! - Structured logging setup
//! - Audit events and fire-and-forget sinks
//! - Prometheus metrics

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod logging;
pub mod metrics;

// Re-export main types
pub use audit::{
    AuditError, AuditEvent, AuditEventBuilder, AuditEventType, AuditForwarder, AuditOutcome,
    AuditSink, AuditTransport, ChannelAuditSink, MemoryAuditSink, NoOpAuditSink, TracingAuditSink,
    DEFAULT_SEND_TIMEOUT,
};
pub use logging::{init_logging, LogFormat, LoggingConfig, LoggingError};
pub use metrics::{GatewayMetrics, MetricsError};
