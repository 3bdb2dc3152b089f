//! Response normalization.
//!
//! Turns whatever an upstream produced into either one tool call or plain
//! text. Resolution order:
//! 1. native tool calls on the reply (the first one wins)
//! 2. the first balanced `{...}` in the text that has a tool shape
//! 3. a quoted list inside `[...]` when the text looks like a failed
//!    structured attempt, routed to the query tool
//! 4. plain text
//!
//! Normalization never fails.

use gateway_core::ModelReply;
use serde_json::{json, Map, Value};
use tracing::{debug, trace};

const NAME_KEYS: [&str; 4] = ["tool", "tool_name", "name", "action"];
const ARG_KEYS: [&str; 6] = [
    "args",
    "arguments",
    "parameters",
    "tool_input",
    "action_input",
    "input",
];

/// A tool call recovered from a reply
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedToolCall {
    /// Tool name
    pub name: String,
    /// Arguments, always a JSON object
    pub arguments: Value,
    /// Upstream call id, when the call was native
    pub id: Option<String>,
    /// The object the call was read from
    pub raw: Value,
}

/// Normalized reply
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    /// The model asked for a tool
    ToolCall(ExtractedToolCall),
    /// Anything else, verbatim
    PlainText(String),
}

impl Extracted {
    /// Tool call, if this is one
    #[must_use]
    pub fn as_tool_call(&self) -> Option<&ExtractedToolCall> {
        match self {
            Self::ToolCall(call) => Some(call),
            Self::PlainText(_) => None,
        }
    }
}

/// Reply normalizer
#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    query_tool: String,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::new("search")
    }
}

impl ResponseNormalizer {
    /// Create a normalizer that routes bare query lists to `query_tool`
    #[must_use]
    pub fn new(query_tool: impl Into<String>) -> Self {
        Self {
            query_tool: query_tool.into(),
        }
    }

    /// Tool that receives heuristic query lists
    #[must_use]
    pub fn query_tool(&self) -> &str {
        &self.query_tool
    }

    /// Normalize a full upstream reply
    #[must_use]
    pub fn extract_structured(&self, reply: &ModelReply) -> Extracted {
        if let Some(call) = reply.tool_calls.first() {
            let arguments = parse_arguments(&call.function.arguments);
            debug!(tool = %call.function.name, "Native tool call");
            return Extracted::ToolCall(ExtractedToolCall {
                name: call.function.name.clone(),
                raw: json!({"name": call.function.name, "arguments": arguments}),
                arguments,
                id: Some(call.id.clone()),
            });
        }

        self.extract_from_text(reply.text_or_empty())
    }

    /// Normalize free text
    #[must_use]
    pub fn extract_from_text(&self, text: &str) -> Extracted {
        let mut unbalanced = false;
        let mut search_from = 0;

        while let Some(offset) = text[search_from..].find('{') {
            let start = search_from + offset;
            match find_balanced_object(text, start) {
                Some(end) => {
                    if let Some(call) = tool_call_in(&text[start..=end]) {
                        return Extracted::ToolCall(call);
                    }
                    search_from = start + 1;
                }
                None => {
                    // every later opener lies inside this one: one pass finds them all
                    unbalanced = true;
                    if let Some(call) = nested_objects(text, start)
                        .into_iter()
                        .find_map(|(from, to)| tool_call_in(&text[from..=to]))
                    {
                        return Extracted::ToolCall(call);
                    }
                    break;
                }
            }
        }

        if unbalanced || strip_fences(text).starts_with('[') {
            let queries = quoted_list(text);
            if !queries.is_empty() {
                debug!(count = queries.len(), tool = %self.query_tool, "Query list recovered from text");
                let arguments = json!({ "queries": queries });
                return Extracted::ToolCall(ExtractedToolCall {
                    raw: json!({"tool": self.query_tool, "args": arguments}),
                    name: self.query_tool.clone(),
                    arguments,
                    id: None,
                });
            }
        }

        Extracted::PlainText(text.to_string())
    }
}

/// Byte index of the `}` closing the object that opens at `start`.
///
/// Aware of `"`/`'` quoting and `\` escapes; returns `None` when the object
/// never closes or `start` is not a `{`.
#[must_use]
pub fn find_balanced_object(text: &str, start: usize) -> Option<usize> {
    if text.as_bytes().get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Balanced objects nested after an unclosed `{` at `start`, ordered by opener
fn nested_objects(text: &str, start: usize) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (i, c) in text[start..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => quote = Some(c),
            '{' => open.push(start + i),
            '}' => {
                if let Some(from) = open.pop() {
                    spans.push((from, start + i));
                }
            }
            _ => {}
        }
    }

    spans.sort_unstable_by_key(|&(from, _)| from);
    spans
}

/// Tool call in one candidate object, if it parses and has a tool shape
fn tool_call_in(candidate: &str) -> Option<ExtractedToolCall> {
    let value = parse_lenient(candidate)?;
    let (name, arguments) = tool_shape(&value)?;
    trace!(tool = %name, "Tool call found in text");
    Some(ExtractedToolCall {
        name,
        arguments,
        id: None,
        raw: value,
    })
}

/// Parse JSON, retrying once with raw control characters escaped
fn parse_lenient(text: &str) -> Option<Value> {
    serde_json::from_str(text)
        .ok()
        .or_else(|| serde_json::from_str(&sanitize_control_chars(text)).ok())
}

/// Escape raw control characters inside string literals and drop them elsewhere
fn sanitize_control_chars(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escaped = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if c.is_control() => {}
                c => out.push(c),
            }
        } else {
            if c == '"' {
                in_string = true;
            }
            if !c.is_control() || c.is_whitespace() {
                out.push(c);
            }
        }
    }

    out
}

/// Arguments of a native call: an object, or `{"input": text}` when not JSON
fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match parse_lenient(arguments) {
        Some(Value::Object(map)) => Value::Object(map),
        Some(other) => json!({ "input": other }),
        None => json!({ "input": arguments }),
    }
}

/// Argument value as an object
fn coerce_arguments(value: &Value) -> Value {
    match value {
        Value::Object(_) => value.clone(),
        Value::String(s) => match parse_lenient(s) {
            Some(Value::Object(map)) => Value::Object(map),
            _ => json!({ "input": s }),
        },
        Value::Null => Value::Object(Map::new()),
        other => json!({ "input": other }),
    }
}

/// Recognise the supported tool-call shapes
fn tool_shape(value: &Value) -> Option<(String, Value)> {
    let object = value.as_object()?;

    if let Some(function) = object.get("function").and_then(Value::as_object) {
        if let Some(name) = function.get("name").and_then(Value::as_str) {
            if !name.trim().is_empty() {
                let arguments = function
                    .get("arguments")
                    .map_or_else(|| Value::Object(Map::new()), coerce_arguments);
                return Some((name.to_string(), arguments));
            }
        }
    }

    let (key, name) = NAME_KEYS.iter().find_map(|key| {
        object
            .get(*key)
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .map(|name| (*key, name))
    })?;

    match ARG_KEYS.iter().find_map(|k| object.get(*k)) {
        Some(arguments) => Some((name.to_string(), coerce_arguments(arguments))),
        // `name`/`action` alone are too common in ordinary JSON answers
        None if key == "tool" || key == "tool_name" => {
            Some((name.to_string(), Value::Object(Map::new())))
        }
        None => None,
    }
}

/// Trim surrounding whitespace and a Markdown code fence
fn strip_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = rest.split_once('\n').map_or("", |(_, after)| after);
    }
    body.trim_end().trim_end_matches("```").trim()
}

/// Double-quoted strings inside the first `[...]` (or to the end of text)
fn quoted_list(text: &str) -> Vec<String> {
    let Some(open) = text.find('[') else {
        return Vec::new();
    };

    let mut items = Vec::new();
    let mut current: Option<String> = None;
    let mut escaped = false;

    for c in text[open + 1..].chars() {
        match current.as_mut() {
            Some(buffer) => {
                if escaped {
                    buffer.push(c);
                    escaped = false;
                } else if c == '\\' {
                    escaped = true;
                } else if c == '"' {
                    let item = buffer.trim().to_string();
                    if !item.is_empty() {
                        items.push(item);
                    }
                    current = None;
                } else {
                    buffer.push(c);
                }
            }
            None => match c {
                '"' => current = Some(String::new()),
                ']' => break,
                _ => {}
            },
        }
    }

    items
}
