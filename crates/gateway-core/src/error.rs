//! Error types for the gateway engine.
//!
//! The taxonomy mirrors how failures are handled by the reasoning loop:
//! provider-scoped failures are recovered by failing over along the priority
//! chain, tool failures become observations, and only chain exhaustion,
//! timeouts and cancellation terminate a session.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result alias used across the gateway crates
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Summary of one failed upstream attempt, kept for `ChainExhausted` reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// Provider that was attempted
    pub provider: String,
    /// Catalog name of the model that was attempted
    pub model: String,
    /// Failure class of the last error seen for this entry
    pub class: FailureClass,
    /// Human readable description (never a raw provider payload)
    pub message: String,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {} ({})", self.provider, self.model, self.message, self.class)
    }
}

/// Coarse classification of a failure, used for chain-advancement decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// No credential could be acquired for the provider
    NoKeyAvailable,
    /// Upstream signaled a rate limit
    RateLimited,
    /// Upstream call exceeded its bounded wait
    Timeout,
    /// Upstream rejected the request as malformed
    Malformed,
    /// Credential was rejected by the upstream
    Authentication,
    /// Any other provider failure
    Provider,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NoKeyAvailable => "no_key_available",
            Self::RateLimited => "rate_limited",
            Self::Timeout => "timeout",
            Self::Malformed => "malformed",
            Self::Authentication => "authentication",
            Self::Provider => "provider",
        };
        f.write_str(name)
    }
}

/// Main error type for the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No credential available for the provider (pool empty and nothing to sweep)
    #[error("No key available for provider {provider}")]
    NoKeyAvailable {
        /// Provider identifier
        provider: String,
    },

    /// Upstream rate limit
    #[error("Rate limited by provider {provider}")]
    RateLimited {
        /// Provider identifier
        provider: String,
        /// Retry-after hint from the upstream, if any
        retry_after: Option<Duration>,
    },

    /// Upstream rejected the request or the model's own output (client error class)
    #[error("Malformed upstream response from {provider} (status {status_code})")]
    MalformedUpstreamResponse {
        /// Provider identifier
        provider: String,
        /// HTTP status code
        status_code: u16,
        /// Raw error body, kept for recovery only
        body: String,
    },

    /// Tool execution failed
    #[error("Tool {tool} failed: {message}")]
    ToolExecution {
        /// Tool name
        tool: String,
        /// Error description
        message: String,
    },

    /// Every entry of the priority chain failed
    #[error("All providers failed after {} attempts", attempts.len())]
    ChainExhausted {
        /// Last failure per attempted chain entry
        attempts: Vec<AttemptFailure>,
    },

    /// Session exceeded its deadline
    #[error("Session timed out after {elapsed:?}")]
    SessionTimeout {
        /// Configured deadline
        elapsed: Duration,
    },

    /// Session was cancelled by the client
    #[error("Session cancelled")]
    SessionCancelled,

    /// Upstream call exceeded its bounded wait
    #[error("Upstream call to {provider} timed out after {timeout:?}")]
    Timeout {
        /// Provider identifier
        provider: String,
        /// Configured timeout
        timeout: Duration,
    },

    /// Credential rejected by the upstream
    #[error("Authentication failed for provider {provider}: {message}")]
    Authentication {
        /// Provider identifier
        provider: String,
        /// Error description
        message: String,
    },

    /// Any other provider error
    #[error("Provider {provider} error: {message}")]
    Provider {
        /// Provider identifier
        provider: String,
        /// Error description
        message: String,
        /// HTTP status code, if the failure came from a response
        status_code: Option<u16>,
        /// Whether retrying the same call could succeed
        retryable: bool,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration {
        /// Error description
        message: String,
    },

    /// Invalid input
    #[error("Validation error: {message}")]
    Validation {
        /// Error description
        message: String,
        /// Offending field
        field: Option<String>,
        /// Machine readable code
        code: String,
    },

    /// Internal error
    #[error("Internal error: {message}")]
    Internal {
        /// Error description
        message: String,
    },
}

impl GatewayError {
    /// Create a no-key-available error
    pub fn no_key(provider: impl Into<String>) -> Self {
        Self::NoKeyAvailable {
            provider: provider.into(),
        }
    }

    /// Create a rate limit error
    pub fn rate_limited(provider: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            provider: provider.into(),
            retry_after,
        }
    }

    /// Create a malformed upstream response error
    pub fn malformed(provider: impl Into<String>, status_code: u16, body: impl Into<String>) -> Self {
        Self::MalformedUpstreamResponse {
            provider: provider.into(),
            status_code,
            body: body.into(),
        }
    }

    /// Create a provider error
    pub fn provider(
        provider: impl Into<String>,
        message: impl Into<String>,
        status_code: Option<u16>,
        retryable: bool,
    ) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            status_code,
            retryable,
        }
    }

    /// Create an authentication error
    pub fn authentication(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create an upstream timeout error
    pub fn timeout(provider: impl Into<String>, timeout: Duration) -> Self {
        Self::Timeout {
            provider: provider.into(),
            timeout,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a validation error
    pub fn validation(
        message: impl Into<String>,
        field: Option<String>,
        code: impl Into<String>,
    ) -> Self {
        Self::Validation {
            message: message.into(),
            field,
            code: code.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Failure class of an upstream-side error, `None` for session-level errors
    #[must_use]
    pub fn failure_class(&self) -> Option<FailureClass> {
        match self {
            Self::NoKeyAvailable { .. } => Some(FailureClass::NoKeyAvailable),
            Self::RateLimited { .. } => Some(FailureClass::RateLimited),
            Self::Timeout { .. } => Some(FailureClass::Timeout),
            Self::MalformedUpstreamResponse { .. } => Some(FailureClass::Malformed),
            Self::Authentication { .. } => Some(FailureClass::Authentication),
            Self::Provider { .. } => Some(FailureClass::Provider),
            _ => None,
        }
    }

    /// Check if this error terminates a session
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ChainExhausted { .. }
                | Self::SessionTimeout { .. }
                | Self::SessionCancelled
                | Self::Configuration { .. }
                | Self::Validation { .. }
                | Self::Internal { .. }
        )
    }

    /// Check if the error is retryable on the same target
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Timeout { .. } | Self::NoKeyAvailable { .. } => true,
            Self::Provider { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Description safe to show to a client: no bodies, no secrets
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::MalformedUpstreamResponse {
                provider,
                status_code,
                ..
            } => format!("provider {provider} rejected the request (status {status_code})"),
            other => other.to_string(),
        }
    }
}
