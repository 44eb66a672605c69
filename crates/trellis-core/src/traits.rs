use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::*;

/// Reasoning backend: turns an instruction plus a transcript view into a
/// response that may request tool calls.
pub trait ReasoningBackend: Send + Sync + 'static {
    /// Backend name, for logging.
    fn name(&self) -> &str;

    /// Send one request and wait for the complete response.
    fn complete(&self, request: BackendRequest) -> BoxFuture<'_, Result<BackendResponse>>;
}

/// Tool: a named external capability the backend may invoke.
pub trait Tool: Send + Sync + 'static {
    /// Tool name (used in backend tool calls).
    fn name(&self) -> &str;

    /// Human-readable description.
    fn description(&self) -> &str;

    /// JSON Schema for tool input.
    fn input_schema(&self) -> serde_json::Value;

    /// Execute the tool with given input and context.
    fn execute(
        &self,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> BoxFuture<'_, Result<ToolResult>>;

    /// Timeout in seconds for this tool.
    fn timeout_secs(&self) -> u64 {
        30
    }

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}
