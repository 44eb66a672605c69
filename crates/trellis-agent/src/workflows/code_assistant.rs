use trellis_core::error::Result;

use crate::graph::{Graph, GraphBuilder, Next};
use crate::steps::ReasoningStep;

use super::{prompts, WorkflowDeps};

pub const NAME: &str = "code_assistant";

/// Single call to the coder backend over the full transcript.
pub fn build(deps: &WorkflowDeps) -> Result<Graph> {
    let coder = ReasoningStep::new(deps.coder_backend.clone(), prompts::CODE_ASSISTANT);

    GraphBuilder::new(NAME)
        .step(NAME, coder)
        .edge(NAME, Next::End)
        .entry(NAME)
        .max_steps(deps.max_steps)
        .compile()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use trellis_core::types::ConversationId;
    use trellis_test_utils::ScriptedBackend;
    use trellis_tools::ToolRegistry;

    use crate::graph::RunContext;
    use crate::state::State;

    #[tokio::test]
    async fn uses_coder_backend() {
        let general = ScriptedBackend::new();
        let coder = ScriptedBackend::new();
        coder.text("```python\nprint('hi')\n```");

        let deps = WorkflowDeps::new(Arc::new(general.clone()), Arc::new(ToolRegistry::new()))
            .with_coder(Arc::new(coder.clone()));
        let graph = build(&deps).unwrap();
        let result = graph
            .run(
                State::from_human("파이썬으로 hi 출력해줘"),
                &RunContext::new(ConversationId::new()),
            )
            .await
            .unwrap();

        assert!(result.is_complete());
        assert_eq!(general.call_count(), 0);
        assert_eq!(coder.call_count(), 1);
        assert!(coder.requests()[0].tools.is_empty());
    }
}
