//! Events a session emits to its client.

use gateway_core::{AttemptFailure, GatewayError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ordered session output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Model text accompanying a tool call
    Thought {
        /// Step number, starting at 1
        step: u32,
        /// Reasoning text
        text: String,
    },
    /// Result of a tool call
    Observation {
        /// Step number
        step: u32,
        /// Tool that ran
        tool: String,
        /// Arguments it ran with
        arguments: Value,
        /// Tool output, or `Error: ...`
        content: String,
    },
    /// Final answer; terminal
    Final {
        /// Answer text
        text: String,
    },
    /// Terminal failure
    Failed(SessionFailure),
}

impl SessionEvent {
    /// Whether this event ends the stream
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Final { .. } | Self::Failed(_))
    }
}

/// Kind of terminal failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Every chain entry (or the per-step attempt bound) was used up
    ChainExhausted,
    /// Session deadline passed
    Timeout,
    /// Client cancelled
    Cancelled,
    /// Bad agent or configuration
    Configuration,
    /// Anything else
    Internal,
}

impl FailureKind {
    /// Label used in metrics and audit metadata
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ChainExhausted => "chain_exhausted",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured terminal failure; never carries a raw provider payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFailure {
    /// Failure kind
    pub kind: FailureKind,
    /// Human readable description
    pub message: String,
    /// Upstream attempts of the failing step
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attempts: Vec<AttemptFailure>,
}

impl From<&GatewayError> for SessionFailure {
    fn from(error: &GatewayError) -> Self {
        let kind = match error {
            GatewayError::ChainExhausted { .. } => FailureKind::ChainExhausted,
            GatewayError::SessionTimeout { .. } => FailureKind::Timeout,
            GatewayError::SessionCancelled => FailureKind::Cancelled,
            GatewayError::Configuration { .. } | GatewayError::Validation { .. } => {
                FailureKind::Configuration
            }
            _ => FailureKind::Internal,
        };
        let attempts = match error {
            GatewayError::ChainExhausted { attempts } => attempts.clone(),
            _ => Vec::new(),
        };
        Self {
            kind,
            message: error.public_message(),
            attempts,
        }
    }
}

impl fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        for attempt in &self.attempts {
            write!(f, "\n  - {attempt}")?;
        }
        Ok(())
    }
}
