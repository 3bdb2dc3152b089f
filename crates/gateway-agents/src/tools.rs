//! Tool execution contract.

use async_trait::async_trait;
use gateway_core::ToolDefinition;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Tool execution failure, surfaced to the model as an observation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ToolError {
    /// Tool did not finish in time
    #[error("tool timed out after {0:?}")]
    Timeout(Duration),
    /// Tool ran and failed
    #[error("{0}")]
    Failed(String),
    /// No such tool
    #[error("unknown tool: {0}")]
    NotFound(String),
}

impl ToolError {
    /// Label used in metrics and audit metadata
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Failed(_) => "failed",
            Self::NotFound(_) => "not_found",
        }
    }
}

/// Something that can run tools on behalf of a session.
///
/// Implementations must be safe to call from many sessions at once.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools this executor offers
    fn definitions(&self) -> Vec<ToolDefinition>;

    /// Run one tool call and return its textual result
    async fn execute_tool(&self, name: &str, arguments: Value) -> Result<String, ToolError>;
}

/// Executor that offers nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTools;

#[async_trait]
impl ToolExecutor for NoTools {
    fn definitions(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn execute_tool(&self, name: &str, _arguments: Value) -> Result<String, ToolError> {
        Err(ToolError::NotFound(name.to_string()))
    }
}
