use std::sync::Arc;

use trellis_core::error::Result;

use crate::graph::{Graph, GraphBuilder, Next, SubgraphInput, SubgraphOutput, SubgraphStep};

use super::{supervisor, WorkflowDeps};

pub const NAME: &str = "chatbot";

/// Top-level graph. The supervisor sees only the transcript, and only its
/// final answer is kept, so tool traffic never reaches the checkpoint.
pub fn build(deps: &WorkflowDeps) -> Result<Graph> {
    let inner = SubgraphStep::new(Arc::new(supervisor::build(deps)?))
        .with_input(SubgraphInput::TranscriptOnly)
        .with_output(SubgraphOutput::LastAssistant);

    GraphBuilder::new(NAME)
        .step(supervisor::NAME, inner)
        .edge(supervisor::NAME, Next::End)
        .entry(supervisor::NAME)
        .max_steps(deps.max_steps)
        .compile()
}
