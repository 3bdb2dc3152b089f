//! Reasoning patterns and system prompt assembly.

use gateway_config::{ConfigSnapshot, PatternTemplate};
use gateway_core::ToolDefinition;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Name of the built-in pattern
pub const DEFAULT_PATTERN: &str = "simple";

/// Continuation prompt used when a pattern does not define one
pub const DEFAULT_CONTINUE_PROMPT: &str = "Proceed with the next step.";

const SIMPLE_STATIC_SYSTEM: &str = "You are a helpful, direct assistant.

Answer simple questions immediately. For anything that needs outside
information, call one of the available tools and wait for its observation
before answering. Never invent observations.

When you are done, reply with the final answer as plain text, in the language
of the user's question.

{system_instruction}";

const SIMPLE_DYNAMIC_CONTEXT: &str = "CURRENT CONTEXT:
Date: {current_date}

{tool_instructions}
{tools_list_text}";

const TOOL_INSTRUCTIONS: &str = "TOOL USAGE:
To call a tool, reply with a single JSON object and nothing else:
{\"tool\": \"<tool name>\", \"args\": {\"<argument>\": \"<value>\"}}";

/// Values substituted into a pattern
#[derive(Debug, Clone, Default)]
pub struct PromptContext {
    /// Rendered tool definitions, empty when no tools are offered
    pub tools_list_text: String,
    /// Agent-level instruction
    pub system_instruction: String,
    /// How to call tools, empty when no tools are offered
    pub tool_instructions: String,
    /// Human readable current date
    pub current_date: String,
}

impl PromptContext {
    /// Context for a set of offered tools
    #[must_use]
    pub fn for_tools(tools: &[ToolDefinition], system_instruction: Option<&str>) -> Self {
        let (tools_list_text, tool_instructions) = if tools.is_empty() {
            (String::new(), String::new())
        } else {
            (render_tools(tools), TOOL_INSTRUCTIONS.to_string())
        };

        Self {
            tools_list_text,
            system_instruction: system_instruction.unwrap_or_default().to_string(),
            tool_instructions,
            current_date: chrono::Utc::now().format("%A, %Y-%m-%d %H:%M UTC").to_string(),
        }
    }
}

/// A named reasoning pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasoningPattern {
    name: String,
    static_system: String,
    dynamic_context: String,
    continue_prompt: Option<String>,
}

impl ReasoningPattern {
    /// The built-in pattern
    #[must_use]
    pub fn simple() -> Self {
        Self {
            name: DEFAULT_PATTERN.to_string(),
            static_system: SIMPLE_STATIC_SYSTEM.to_string(),
            dynamic_context: SIMPLE_DYNAMIC_CONTEXT.to_string(),
            continue_prompt: None,
        }
    }

    /// Pattern from a configured template
    #[must_use]
    pub fn from_template(name: impl Into<String>, template: &PatternTemplate) -> Self {
        Self {
            name: name.into(),
            static_system: template.static_system.clone(),
            dynamic_context: template.dynamic_context.clone(),
            continue_prompt: template.continue_prompt.clone(),
        }
    }

    /// Pattern name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render the system part of the prompt
    #[must_use]
    pub fn render(&self, context: &PromptContext) -> String {
        let static_part = substitute(&self.static_system, context);
        let dynamic_part = substitute(&self.dynamic_context, context);
        let mut prompt = static_part.trim_end().to_string();
        if !dynamic_part.trim().is_empty() {
            prompt.push_str("\n\n");
            prompt.push_str(dynamic_part.trim());
        }
        prompt
    }

    /// User turn sent after the scratchpad
    #[must_use]
    pub fn continue_prompt(&self) -> &str {
        self.continue_prompt
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(DEFAULT_CONTINUE_PROMPT)
    }
}

fn substitute(template: &str, context: &PromptContext) -> String {
    template
        .replace("{tools_list_text}", &context.tools_list_text)
        .replace("{system_instruction}", &context.system_instruction)
        .replace("{tool_instructions}", &context.tool_instructions)
        .replace("{current_date}", &context.current_date)
}

fn render_tools(tools: &[ToolDefinition]) -> String {
    let mut text = String::from("AVAILABLE TOOLS:");
    for tool in tools {
        text.push_str("\n- ");
        text.push_str(tool.name());
        if let Some(description) = tool.function.description.as_deref() {
            text.push_str(": ");
            text.push_str(description);
        }
        if let Some(parameters) = &tool.function.parameters {
            text.push_str("\n  parameters: ");
            text.push_str(&parameters.to_string());
        }
    }
    text
}

/// Patterns by name, with the built-in one always present
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: BTreeMap<String, Arc<ReasoningPattern>>,
}

impl Default for PatternRegistry {
    fn default() -> Self {
        let mut patterns = BTreeMap::new();
        patterns.insert(DEFAULT_PATTERN.to_string(), Arc::new(ReasoningPattern::simple()));
        Self { patterns }
    }
}

impl PatternRegistry {
    /// Built-in patterns plus the configured ones
    #[must_use]
    pub fn from_snapshot(snapshot: &ConfigSnapshot) -> Self {
        let mut registry = Self::default();
        for (name, template) in snapshot.patterns() {
            registry.patterns.insert(
                name.clone(),
                Arc::new(ReasoningPattern::from_template(name.clone(), template)),
            );
        }
        registry
    }

    /// Pattern by name, falling back to the built-in one
    #[must_use]
    pub fn resolve(&self, name: &str) -> Arc<ReasoningPattern> {
        if let Some(pattern) = self.patterns.get(name) {
            return Arc::clone(pattern);
        }
        warn!(pattern = %name, fallback = DEFAULT_PATTERN, "Unknown reasoning pattern");
        self.patterns
            .get(DEFAULT_PATTERN)
            .map_or_else(|| Arc::new(ReasoningPattern::simple()), Arc::clone)
    }

    /// Known pattern names
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }
}

/// Combine the client's system text, the pattern prompt and the server
/// instruction into one system prompt. Client instructions take precedence,
/// server instructions are lowest priority. Empty sections are omitted.
#[must_use]
pub fn build_final_prompt(
    pattern_prompt: &str,
    client_instruction: Option<&str>,
    server_instruction: Option<&str>,
) -> String {
    let client = client_instruction.map(str::trim).filter(|s| !s.is_empty());
    let server = server_instruction.map(str::trim).filter(|s| !s.is_empty());

    if client.is_none() && server.is_none() {
        return pattern_prompt.to_string();
    }

    let mut sections = vec![
        "The instructions below come from several sources. When they conflict, \
         follow the section with the higher priority."
            .to_string(),
    ];
    if let Some(client) = client {
        sections.push(format!("### CLIENT INSTRUCTIONS (HIGHEST PRIORITY) ###\n{client}"));
    }
    sections.push(format!("### CORE REASONING FRAMEWORK ###\n{}", pattern_prompt.trim()));
    if let Some(server) = server {
        sections.push(format!(
            "### GLOBAL SERVER INSTRUCTIONS (LOWEST PRIORITY) ###\n{server}"
        ));
    }
    sections.join("\n\n")
}
