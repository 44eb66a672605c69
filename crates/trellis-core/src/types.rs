use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique conversation identifier. Checkpoints are keyed by it.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_str(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Author of a transcript entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    Human,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::Human => write!(f, "human"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the reasoning backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            id: format!("call_{}", Uuid::new_v4().simple()),
            name: name.into(),
            args,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A single transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: String,
    /// Tool calls requested by an assistant message. Always present, possibly empty.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    /// For tool results: the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For tool results: the tool name. For assistant messages: the step that wrote it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text)
    }

    pub fn human(text: impl Into<String>) -> Self {
        Self::plain(Role::Human, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, text)
    }

    pub fn assistant_with_calls(text: impl Into<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(Role::Assistant, text)
        }
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(tool_name.into()),
            ..Self::plain(Role::Tool, content)
        }
    }

    /// Tag the message with the step that produced it.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// How the backend may pick tools.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "tool", rename_all = "snake_case")]
pub enum ToolChoice {
    #[default]
    Auto,
    /// The backend must call exactly this tool.
    Required(String),
    None,
}

/// One call to the reasoning backend.
#[derive(Debug, Clone, Default)]
pub struct BackendRequest {
    pub instruction: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    /// Per-step model override; the client's configured model otherwise.
    pub model: Option<String>,
    /// Per-step reasoning override; the client's configured flag otherwise.
    pub reasoning: Option<bool>,
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// What the backend returned for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    /// Ephemeral reasoning trace. Never part of conversation history.
    pub reasoning: Option<String>,
    pub usage: Usage,
}

impl BackendResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// Convert into a transcript entry, discarding the reasoning trace.
    pub fn into_message(self) -> ChatMessage {
        ChatMessage::assistant_with_calls(self.content, self.tool_calls)
    }
}

/// Result of a tool execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
    /// Structured output a tool step may lift into a state field.
    pub payload: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            payload: None,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
            payload: None,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Tool definition for sending to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Context passed to tools during execution.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub conversation_id: ConversationId,
    pub step: String,
}

/// Engine event broadcast to all subscribers.
#[derive(Debug, Clone)]
pub enum GraphEvent {
    /// A step is about to run.
    StepStarted { graph: String, step: String },
    /// A step finished and its update was merged.
    StepFinished {
        graph: String,
        step: String,
        elapsed_ms: u64,
    },
    /// Reasoning trace from a backend call (not persisted).
    Reasoning { step: String, text: String },
    /// Assistant text produced by a reasoning step.
    Message { step: String, text: String },
    /// Tool execution started.
    ToolStart {
        step: String,
        name: String,
        args: serde_json::Value,
    },
    /// Tool execution completed.
    ToolEnd {
        step: String,
        name: String,
        result: ToolResult,
    },
    /// A step asked for approval of pending calls.
    ApprovalRequested { step: String, calls: Vec<ToolCall> },
    /// Run finished at the terminal.
    RunComplete {
        conversation_id: ConversationId,
        steps: usize,
    },
    /// Run suspended waiting for approval.
    RunSuspended {
        conversation_id: ConversationId,
        step: String,
    },
    /// Run aborted with a fatal error.
    RunFailed { error: String },
}
