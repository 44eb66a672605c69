use trellis_core::error::Result;

use crate::graph::{tool_loop, Graph, GraphBuilder, Next};
use crate::steps::{ReasoningStep, ToolStep};

use super::{prompts, WorkflowDeps};

pub const NAME: &str = "casual_chat";
const TOOLS_STEP: &str = "casual_chat.tools";
const TOOLS: &[&str] = &["get_current_time", "get_weather"];

/// Small talk with access to the clock and the weather lookup.
pub fn build(deps: &WorkflowDeps) -> Result<Graph> {
    let chat = ReasoningStep::new(deps.backend.clone(), prompts::CASUAL_CHAT)
        .with_tools(deps.tools.definitions_for(TOOLS)?)
        .with_reasoning(true);

    GraphBuilder::new(NAME)
        .step(NAME, chat)
        .step(TOOLS_STEP, ToolStep::new(deps.tools.clone()).only(TOOLS))
        .route(NAME, tool_loop(TOOLS_STEP, Next::End))
        .edge(TOOLS_STEP, Next::step(NAME))
        .entry(NAME)
        .max_steps(deps.max_steps)
        .compile()
}
