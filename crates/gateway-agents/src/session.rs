//! Per-session state owned by the executor task.

use gateway_core::{ChatMessage, MessageRole, SessionId};
use serde_json::{json, Value};
use std::fmt;
use std::time::Instant;

/// Executor state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Chain and prompt not built yet
    Init,
    /// Ready for the next step
    StepPending,
    /// Waiting on an upstream model
    AwaitingModel,
    /// Waiting on a tool
    ToolExecuting,
    /// Final answer delivered
    Succeeded,
    /// Terminal failure delivered
    Failed,
}

impl SessionState {
    /// Whether the session is over
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::StepPending => "step_pending",
            Self::AwaitingModel => "awaiting_model",
            Self::ToolExecuting => "tool_executing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// One scratchpad line
#[derive(Debug, Clone, PartialEq)]
pub enum ScratchpadEntry {
    /// Model reasoning text
    Thought(String),
    /// Tool call the model made
    Action {
        /// Tool name
        tool: String,
        /// Arguments
        arguments: Value,
    },
    /// Raw model output that was salvaged from an upstream rejection
    Generation(String),
    /// Tool result
    Observation {
        /// Tool name
        tool: String,
        /// Result text
        content: String,
    },
}

/// Append-only record of the session's reasoning so far
#[derive(Debug, Clone, Default)]
pub struct Scratchpad {
    entries: Vec<ScratchpadEntry>,
}

impl Scratchpad {
    /// Append an entry
    pub fn push(&mut self, entry: ScratchpadEntry) {
        self.entries.push(entry);
    }

    /// Entries in insertion order
    #[must_use]
    pub fn entries(&self) -> &[ScratchpadEntry] {
        &self.entries
    }

    /// Whether nothing was recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Text form sent back to the model
    #[must_use]
    pub fn render(&self) -> String {
        let mut lines = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            match entry {
                ScratchpadEntry::Thought(text) => lines.push(format!("Thought: {}", text.trim())),
                ScratchpadEntry::Action { tool, arguments } => {
                    lines.push(format!("Action: {}", json!({"tool": tool, "args": arguments})));
                }
                ScratchpadEntry::Generation(text) => lines.push(text.trim().to_string()),
                ScratchpadEntry::Observation { tool, content } => {
                    lines.push(format!("Observation ({tool}): {content}"));
                }
            }
        }
        lines.join("\n")
    }
}

/// A reasoning session
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    agent: String,
    state: SessionState,
    step: u32,
    started_at: Instant,
    client_instruction: Option<String>,
    history: Vec<ChatMessage>,
    scratchpad: Scratchpad,
}

impl Session {
    /// Create a session from client history.
    ///
    /// Client system messages are pulled out of the history and combined into
    /// one client instruction.
    #[must_use]
    pub fn new(id: SessionId, agent: impl Into<String>, history: Vec<ChatMessage>) -> Self {
        let (system, history): (Vec<ChatMessage>, Vec<ChatMessage>) = history
            .into_iter()
            .partition(|m| m.role == MessageRole::System);

        let client_instruction = system
            .iter()
            .map(|m| m.content.trim())
            .filter(|c| !c.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");

        Self {
            id,
            agent: agent.into(),
            state: SessionState::Init,
            step: 0,
            started_at: Instant::now(),
            client_instruction: (!client_instruction.is_empty()).then_some(client_instruction),
            history,
            scratchpad: Scratchpad::default(),
        }
    }

    /// Session id
    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    /// Agent name
    #[must_use]
    pub fn agent(&self) -> &str {
        &self.agent
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Move to another state
    pub fn transition(&mut self, state: SessionState) {
        tracing::trace!(session_id = %self.id, from = %self.state, to = %state, "Session state");
        self.state = state;
    }

    /// Current step, 0 before the first one
    #[must_use]
    pub fn step(&self) -> u32 {
        self.step
    }

    /// Start the next step and return its number
    pub fn begin_step(&mut self) -> u32 {
        self.step += 1;
        self.state = SessionState::StepPending;
        self.step
    }

    /// Time since creation
    #[must_use]
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    /// System text supplied by the client
    #[must_use]
    pub fn client_instruction(&self) -> Option<&str> {
        self.client_instruction.as_deref()
    }

    /// Non-system client history
    #[must_use]
    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// The scratchpad
    #[must_use]
    pub fn scratchpad(&self) -> &Scratchpad {
        &self.scratchpad
    }

    /// Append to the scratchpad
    pub fn record(&mut self, entry: ScratchpadEntry) {
        self.scratchpad.push(entry);
    }

    /// Messages for the next model call
    #[must_use]
    pub fn messages(&self, system_prompt: &str, continue_prompt: &str) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 3);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(self.history.iter().cloned());
        if !self.scratchpad.is_empty() {
            messages.push(ChatMessage::assistant(self.scratchpad.render()));
            messages.push(ChatMessage::user(continue_prompt));
        }
        messages
    }
}
