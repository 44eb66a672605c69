use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use trellis_core::error::{Result, TrellisError};
use trellis_core::event::EventBus;
use trellis_core::types::{ChatMessage, ConversationId, GraphEvent, Role};

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::graph::{ExecutionResult, Graph, RunContext, RunStatus};
use crate::interrupt::{InterruptRequest, InterruptResponse};
use crate::state::{State, StateUpdate};
use crate::steps::FALLBACK_MESSAGE;

/// What the caller gets back from one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnReply {
    Final {
        conversation_id: ConversationId,
        text: String,
    },
    ApprovalRequired {
        conversation_id: ConversationId,
        request: InterruptRequest,
    },
}

impl TurnReply {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            Self::Final { conversation_id, .. } => conversation_id,
            Self::ApprovalRequired {
                conversation_id, ..
            } => conversation_id,
        }
    }
}

/// Turn-level entry point: loads the checkpoint, runs or resumes the graph,
/// and commits the result.
///
/// Nothing is written when a run fails, so the stored checkpoint always
/// reflects the last successful turn or suspension.
pub struct Conversations {
    graph: Arc<Graph>,
    store: Arc<dyn CheckpointStore>,
    events: Option<Arc<EventBus>>,
}

impl Conversations {
    pub fn new(graph: Arc<Graph>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph,
            store,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Add a human message to a conversation (a new one when `target` is
    /// `None`) and run the graph.
    pub async fn submit(
        &self,
        target: Option<ConversationId>,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<TurnReply> {
        let id = target.unwrap_or_default();
        let existing = self.store.load(&id).await?;

        if existing.as_ref().is_some_and(Checkpoint::is_suspended) {
            return Err(TrellisError::AwaitingApproval(id.to_string()));
        }

        let (mut state, turn) = existing
            .map(|cp| (cp.state, cp.turn))
            .unwrap_or_else(|| (State::new(), 0));
        state.apply(StateUpdate::message(ChatMessage::human(text)));

        info!(conversation_id = %id, turn, graph = %self.graph.name(), "Submitting turn");

        let run = self.run_context(&id, cancel);
        let result = self.graph.run(state, &run).await;
        self.commit(id, turn, result).await
    }

    /// Answer a pending approval and continue the suspended run.
    ///
    /// A rejected resume (wrong count, disallowed kind) leaves the
    /// conversation suspended so the caller can try again.
    pub async fn resume(
        &self,
        id: &ConversationId,
        responses: Vec<InterruptResponse>,
        cancel: CancellationToken,
    ) -> Result<TurnReply> {
        let checkpoint = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| TrellisError::NotSuspended(id.to_string()))?;
        let point = checkpoint
            .resume
            .clone()
            .ok_or_else(|| TrellisError::NotSuspended(id.to_string()))?;

        info!(conversation_id = %id, step = %point.step, "Resuming turn");

        let run = self.run_context(id, cancel);
        let result = self
            .graph
            .resume(checkpoint.state, point, responses, &run)
            .await;
        self.commit(id.clone(), checkpoint.turn, result).await
    }

    /// The approval a conversation is waiting on, if any.
    pub async fn pending(&self, id: &ConversationId) -> Result<Option<InterruptRequest>> {
        Ok(self
            .store
            .load(id)
            .await?
            .and_then(|cp| cp.resume)
            .map(|point| point.request))
    }

    /// Committed state of a conversation.
    pub async fn state(&self, id: &ConversationId) -> Result<Option<State>> {
        Ok(self.store.load(id).await?.map(|cp| cp.state))
    }

    /// Mint a fresh conversation id with no history.
    pub async fn new_conversation(&self) -> Result<ConversationId> {
        let id = ConversationId::new();
        self.store.delete(&id).await?;
        Ok(id)
    }

    /// Discard a conversation's checkpoint.
    pub async fn forget(&self, id: &ConversationId) -> Result<bool> {
        self.store.delete(id).await
    }

    fn run_context(&self, id: &ConversationId, cancel: CancellationToken) -> RunContext {
        RunContext {
            conversation_id: id.clone(),
            cancel,
            events: self.events.clone(),
        }
    }

    fn publish(&self, event: GraphEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    async fn commit(
        &self,
        id: ConversationId,
        turn: usize,
        result: Result<ExecutionResult>,
    ) -> Result<TurnReply> {
        let result = match result {
            Ok(result) => result,
            Err(e) => {
                error!(conversation_id = %id, error = %e, "Run failed; checkpoint left unchanged");
                self.publish(GraphEvent::RunFailed {
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let steps = result.steps.len();
        match result.status {
            RunStatus::Complete => {
                let text = final_text(&result.state);
                let checkpoint = Checkpoint {
                    conversation_id: id.clone(),
                    state: result.state,
                    resume: None,
                    turn: turn + 1,
                    updated_at: Utc::now(),
                };
                self.store.save(&checkpoint).await?;
                self.publish(GraphEvent::RunComplete {
                    conversation_id: id.clone(),
                    steps,
                });
                Ok(TurnReply::Final {
                    conversation_id: id,
                    text,
                })
            }
            RunStatus::Suspended(point) => {
                let innermost = point
                    .path()
                    .last()
                    .map(|(_, step)| step.clone())
                    .unwrap_or_else(|| point.step.clone());
                let request = point.request.clone();
                let checkpoint = Checkpoint {
                    conversation_id: id.clone(),
                    state: result.state,
                    resume: Some(point),
                    turn,
                    updated_at: Utc::now(),
                };
                self.store.save(&checkpoint).await?;
                info!(conversation_id = %id, step = %innermost, "Turn suspended for approval");
                self.publish(GraphEvent::RunSuspended {
                    conversation_id: id.clone(),
                    step: innermost,
                });
                Ok(TurnReply::ApprovalRequired {
                    conversation_id: id,
                    request,
                })
            }
        }
    }
}

/// The last assistant message written since the latest human message.
fn final_text(state: &State) -> String {
    state
        .transcript
        .iter()
        .rev()
        .take_while(|m| m.role != Role::Human)
        .find(|m| m.role == Role::Assistant && !m.content.trim().is_empty())
        .map(|m| m.content.clone())
        .unwrap_or_else(|| FALLBACK_MESSAGE.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn final_text_ignores_earlier_turns() {
        let mut state = State::from_human("first");
        state.apply(StateUpdate::message(ChatMessage::assistant("old answer")));
        state.apply(StateUpdate::message(ChatMessage::human("second")));
        assert_eq!(final_text(&state), FALLBACK_MESSAGE);

        state.apply(StateUpdate::message(ChatMessage::assistant("new answer")));
        state.apply(StateUpdate::message(ChatMessage::tool_result("c1", "t", "x")));
        assert_eq!(final_text(&state), "new answer");
    }
}
