use std::sync::Arc;

use trellis_core::error::Result;

use crate::graph::{Graph, GraphBuilder, Next, SubgraphInput, SubgraphOutput, SubgraphStep};
use crate::steps::{Expert, SupervisorStep};

use super::{casual_chat, code_assistant, data_explorer, document_qa, prompts, WorkflowDeps};

pub const NAME: &str = "supervisor";

/// Routes each question to one expert graph, which runs as a sub-graph
/// over the full state.
pub fn build(deps: &WorkflowDeps) -> Result<Graph> {
    let experts = [
        ("Document_QA", document_qa::NAME, document_qa::build(deps)?),
        ("Code_Assistant", code_assistant::NAME, code_assistant::build(deps)?),
        ("Data_Explorer", data_explorer::NAME, data_explorer::build(deps)?),
        ("Casual_Chat", casual_chat::NAME, casual_chat::build(deps)?),
    ];

    let supervisor = SupervisorStep::new(
        deps.backend.clone(),
        prompts::SUPERVISOR,
        experts
            .iter()
            .map(|(label, step, _)| Expert::new(*label, *step))
            .collect(),
    )
    .with_reasoning(true);
    let router = supervisor.router();

    let mut builder = GraphBuilder::new(NAME)
        .step(NAME, supervisor)
        .route(NAME, router)
        .entry(NAME)
        .max_steps(deps.max_steps);

    for (_, step, graph) in experts {
        let expert = SubgraphStep::new(Arc::new(graph))
            .with_input(SubgraphInput::Full)
            .with_output(SubgraphOutput::AllNew);
        builder = builder.step(step, expert).edge(step, Next::End);
    }

    builder.compile()
}
