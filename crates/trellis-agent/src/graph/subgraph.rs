use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::debug;

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::Role;

use super::executor::{ExecutionResult, Graph, RunContext, RunStatus};
use super::step::{Step, StepContext, StepOutcome, StepResult, Suspension};
use crate::interrupt::NestedResume;
use crate::state::{State, StateUpdate};

/// What the child graph starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgraphInput {
    /// The parent's transcript and fields.
    Full,
    /// Only the parent's transcript.
    TranscriptOnly,
}

/// What flows back into the parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubgraphOutput {
    /// Every message the child appended, plus every field it changed.
    AllNew,
    /// Only the last assistant message the child appended.
    LastAssistant,
}

/// Runs a compiled graph as a single step of its parent.
///
/// A suspension inside the child suspends the parent too. The child's state
/// and resume point travel inside the parent's resume point.
pub struct SubgraphStep {
    graph: Arc<Graph>,
    input: SubgraphInput,
    output: SubgraphOutput,
}

impl SubgraphStep {
    pub fn new(graph: Arc<Graph>) -> Self {
        Self {
            graph,
            input: SubgraphInput::Full,
            output: SubgraphOutput::AllNew,
        }
    }

    pub fn with_input(mut self, input: SubgraphInput) -> Self {
        self.input = input;
        self
    }

    pub fn with_output(mut self, output: SubgraphOutput) -> Self {
        self.output = output;
        self
    }

    fn project(&self, parent: &State) -> State {
        match self.input {
            SubgraphInput::Full => parent.clone(),
            SubgraphInput::TranscriptOnly => State {
                transcript: parent.transcript.clone(),
                fields: Default::default(),
            },
        }
    }

    fn collect(&self, parent: &State, child: State) -> StateUpdate {
        let base_len = parent.transcript.len().min(child.transcript.len());
        let added = child.transcript.into_iter().skip(base_len);

        match self.output {
            SubgraphOutput::AllNew => {
                let mut update = StateUpdate::new();
                update.messages = added.collect();
                update.fields = child
                    .fields
                    .into_iter()
                    .filter(|(k, v)| parent.fields.get(k) != Some(v))
                    .collect();
                update
            }
            SubgraphOutput::LastAssistant => {
                let last = added.filter(|m| m.role == Role::Assistant).last();
                match last {
                    Some(message) => StateUpdate::message(message),
                    None => StateUpdate::new(),
                }
            }
        }
    }

    fn finish(&self, parent: &State, result: ExecutionResult) -> StepResult {
        match result.status {
            RunStatus::Complete => {
                let update = self.collect(parent, result.state);
                let outcome = if update.messages.is_empty() && update.fields.is_empty() {
                    StepOutcome::NoOutput
                } else {
                    StepOutcome::StageComplete
                };
                StepResult::completed(update, outcome)
            }
            RunStatus::Suspended(point) => {
                debug!(
                    graph = %self.graph.name(),
                    step = %point.step,
                    "Child graph suspended"
                );
                StepResult::Suspended(Suspension {
                    request: point.request.clone(),
                    stash: None,
                    child: Some(Box::new(NestedResume {
                        state: result.state,
                        point,
                    })),
                })
            }
        }
    }
}

impl Step for SubgraphStep {
    fn run<'a>(&'a self, state: &'a State, ctx: StepContext) -> BoxFuture<'a, Result<StepResult>> {
        Box::pin(async move {
            let run = RunContext {
                conversation_id: ctx.conversation_id.clone(),
                cancel: ctx.cancel.clone(),
                events: ctx.events.clone(),
            };

            let result = match ctx.resume {
                Some(resume) => match resume.child {
                    Some(nested) => {
                        self.graph
                            .resume(nested.state, nested.point, resume.responses, &run)
                            .await?
                    }
                    None => {
                        return Err(TrellisError::GraphDefinition(format!(
                            "resume of sub-graph step '{}' carries no child resume point",
                            ctx.step
                        )))
                    }
                },
                None => self.graph.run(self.project(state), &run).await?,
            };

            Ok(self.finish(state, result))
        })
    }
}
