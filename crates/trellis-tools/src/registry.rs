use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use trellis_core::config::ServicesConfig;
use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::Tool;
use trellis_core::types::{ToolContext, ToolDefinition, ToolResult};

use crate::rag::RagClient;
use crate::warehouse::WarehouseClient;

/// Registry of available tools.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool.
    pub fn register(&mut self, tool: impl Tool) {
        self.register_arc(Arc::new(tool));
    }

    /// Register an already shared tool.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// List all registered tool names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Definitions of every registered tool, sorted by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.list()
            .into_iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.definition())
            .collect()
    }

    /// Definitions for the named tools, in the given order.
    pub fn definitions_for(&self, names: &[&str]) -> Result<Vec<ToolDefinition>> {
        names
            .iter()
            .map(|name| {
                self.get(name)
                    .map(|t| t.definition())
                    .ok_or_else(|| TrellisError::ToolNotFound(name.to_string()))
            })
            .collect()
    }

    /// Execute a tool by name, bounded by the tool's timeout.
    pub async fn execute(
        &self,
        name: &str,
        input: serde_json::Value,
        ctx: ToolContext,
    ) -> Result<ToolResult> {
        let tool = self
            .get(name)
            .ok_or_else(|| TrellisError::ToolNotFound(name.to_string()))?;

        debug!(tool = %name, step = %ctx.step, "Dispatching tool");
        let timeout = std::time::Duration::from_secs(tool.timeout_secs());

        match tokio::time::timeout(timeout, tool.execute(input, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(TrellisError::ToolTimeout {
                tool: name.to_string(),
                timeout_secs: tool.timeout_secs(),
            }),
        }
    }

    /// Create a registry with every domain tool, wired to the configured services.
    pub fn with_domain_tools(services: &ServicesConfig) -> Result<Self> {
        let rag = Arc::new(RagClient::new(&services.rag_url, services.timeout_secs)?);
        let warehouse = Arc::new(WarehouseClient::new(
            &services.warehouse_url,
            services.timeout_secs,
        )?);

        let mut registry = Self::new();

        registry.register(crate::builtin::clock::CurrentTimeTool);
        registry.register(crate::builtin::clock::WeatherTool);

        registry.register(crate::builtin::documents::InternalDocumentsTool::new(
            rag.clone(),
            &services.documents_collection,
        ));
        registry.register(crate::builtin::documents::TableSchemasTool::new(
            rag,
            &services.schemas_collection,
        ));

        registry.register(crate::builtin::warehouse::ExecuteQueryTool::new(warehouse));

        Ok(registry)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_core::types::ConversationId;
    use trellis_test_utils::{CountingTool, FailingTool, SlowTool};

    fn ctx() -> ToolContext {
        ToolContext {
            conversation_id: ConversationId::from_str("conv-1"),
            step: "tools".into(),
        }
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let mut registry = ToolRegistry::new();
        let tool = CountingTool::new("echo", "pong");
        let calls = tool.counter();
        registry.register(tool);

        let result = registry
            .execute("echo", serde_json::json!({}), ctx())
            .await
            .unwrap();
        assert_eq!(result.content, "pong");
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let registry = ToolRegistry::new();
        let err = registry
            .execute("missing", serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, TrellisError::ToolNotFound(name) if name == "missing"));
    }

    #[tokio::test]
    async fn tool_errors_propagate() {
        let mut registry = ToolRegistry::new();
        registry.register(FailingTool::new("broken"));
        let err = registry
            .execute("broken", serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, TrellisError::ToolExecution { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_tool_times_out() {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool::new("sleepy", 1, std::time::Duration::from_secs(5)));
        let err = registry
            .execute("sleepy", serde_json::json!({}), ctx())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TrellisError::ToolTimeout { timeout_secs: 1, .. }
        ));
    }

    #[test]
    fn definitions_for_preserves_order_and_rejects_unknown() {
        let mut registry = ToolRegistry::new();
        registry.register(CountingTool::new("b_tool", ""));
        registry.register(CountingTool::new("a_tool", ""));

        let defs = registry.definitions_for(&["b_tool", "a_tool"]).unwrap();
        assert_eq!(defs[0].name, "b_tool");
        assert_eq!(registry.definitions()[0].name, "a_tool");
        assert!(registry.definitions_for(&["nope"]).is_err());
    }

    #[test]
    fn domain_registry_has_all_tools() {
        let registry = ToolRegistry::with_domain_tools(&ServicesConfig::default()).unwrap();
        assert_eq!(
            registry.list(),
            vec![
                "execute_query",
                "get_current_time",
                "get_internal_documents",
                "get_table_schemas",
                "get_weather"
            ]
        );
    }
}
