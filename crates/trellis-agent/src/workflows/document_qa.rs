use trellis_core::error::Result;

use crate::graph::{tool_loop, Graph, GraphBuilder, Next};
use crate::steps::{ReasoningStep, ToolStep};

use super::{prompts, WorkflowDeps};

pub const NAME: &str = "document_qa";
const TOOLS_STEP: &str = "document_qa.tools";
const TOOLS: &[&str] = &["get_internal_documents"];

/// Answers questions about internal documents, citing what the search
/// returned.
pub fn build(deps: &WorkflowDeps) -> Result<Graph> {
    let qa = ReasoningStep::new(deps.backend.clone(), prompts::DOCUMENT_QA)
        .with_tools(deps.tools.definitions_for(TOOLS)?)
        .with_reasoning(true);

    GraphBuilder::new(NAME)
        .step(NAME, qa)
        .step(TOOLS_STEP, ToolStep::new(deps.tools.clone()).only(TOOLS))
        .route(NAME, tool_loop(TOOLS_STEP, Next::End))
        .edge(TOOLS_STEP, Next::step(NAME))
        .entry(NAME)
        .max_steps(deps.max_steps)
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;

    use serde_json::json;
    use trellis_core::types::ConversationId;
    use trellis_test_utils::{CountingTool, ScriptedBackend};
    use trellis_tools::ToolRegistry;

    use crate::graph::RunContext;
    use crate::state::State;

    #[tokio::test]
    async fn searches_then_answers() {
        let backend = ScriptedBackend::new();
        backend
            .call("d1", "get_internal_documents", json!({"query": "연차 규정"}))
            .text("연차는 15일입니다. (출처: 인사규정.pdf)");

        let search = CountingTool::new("get_internal_documents", "[인사규정.pdf] 연차 15일");
        let searches = search.counter();
        let mut tools = ToolRegistry::new();
        tools.register(search);

        let deps = WorkflowDeps::new(Arc::new(backend.clone()), Arc::new(tools));
        let graph = build(&deps).unwrap();
        let result = graph
            .run(
                State::from_human("연차 며칠이야?"),
                &RunContext::new(ConversationId::new()),
            )
            .await
            .unwrap();

        assert_eq!(searches.load(Ordering::SeqCst), 1);
        assert!(result
            .state
            .last_assistant()
            .unwrap()
            .content
            .contains("출처"));
        assert_eq!(backend.requests()[0].instruction, prompts::DOCUMENT_QA);
    }
}
