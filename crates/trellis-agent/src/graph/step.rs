use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use trellis_core::error::Result;
use trellis_core::event::EventBus;
use trellis_core::types::{ConversationId, GraphEvent, ToolCall, ToolContext};

use crate::interrupt::{ApprovalPolicy, InterruptRequest, InterruptResponse, NestedResume};
use crate::state::{State, StateUpdate};

/// One named unit of work in a graph.
///
/// A step reads a snapshot of the state and returns a partial update. It
/// keeps nothing between invocations; continuity flows through the update.
pub trait Step: Send + Sync + 'static {
    fn run<'a>(&'a self, state: &'a State, ctx: StepContext) -> BoxFuture<'a, Result<StepResult>>;
}

/// What a step produced, in the shape routers match on.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The step appended an assistant message with pending tool calls.
    ToolRequested { calls: Vec<ToolCall> },
    /// The step finished its stage.
    StageComplete,
    /// Nothing usable came back; a fallback message was appended.
    NoOutput,
}

impl StepOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ToolRequested { .. } => "tool_requested",
            Self::StageComplete => "stage_complete",
            Self::NoOutput => "no_output",
        }
    }
}

#[derive(Debug, Clone)]
pub enum StepResult {
    Completed {
        update: StateUpdate,
        outcome: StepOutcome,
    },
    Suspended(Suspension),
}

impl StepResult {
    pub fn completed(update: StateUpdate, outcome: StepOutcome) -> Self {
        Self::Completed { update, outcome }
    }
}

/// A step's request to halt the run until approval arrives.
#[derive(Debug, Clone)]
pub struct Suspension {
    pub request: InterruptRequest,
    /// Step-private data handed back on resume.
    pub stash: Option<serde_json::Value>,
    pub child: Option<Box<NestedResume>>,
}

impl Suspension {
    pub fn new(request: InterruptRequest) -> Self {
        Self {
            request,
            stash: None,
            child: None,
        }
    }

    pub fn with_stash(mut self, stash: serde_json::Value) -> Self {
        self.stash = Some(stash);
        self
    }
}

/// Outcome of [`StepContext::request_approval`].
#[derive(Debug, Clone)]
pub enum Approval {
    /// First entry: suspend with this request.
    Pending(InterruptRequest),
    /// Resumed: the calls that survived the approver's responses.
    Decided(Vec<ToolCall>),
}

/// Approver input for a step being re-entered.
#[derive(Debug, Clone)]
pub struct ResumeInput {
    pub request: InterruptRequest,
    pub responses: Vec<InterruptResponse>,
    pub stash: Option<serde_json::Value>,
    pub child: Option<NestedResume>,
}

/// Per-invocation context handed to a step by the executor.
#[derive(Clone)]
pub struct StepContext {
    pub conversation_id: ConversationId,
    pub graph: String,
    pub step: String,
    pub cancel: CancellationToken,
    pub events: Option<Arc<EventBus>>,
    pub resume: Option<ResumeInput>,
}

impl StepContext {
    pub fn new(conversation_id: ConversationId, graph: &str, step: &str) -> Self {
        Self {
            conversation_id,
            graph: graph.to_string(),
            step: step.to_string(),
            cancel: CancellationToken::new(),
            events: None,
            resume: None,
        }
    }

    pub fn publish(&self, event: GraphEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }

    pub fn is_resuming(&self) -> bool {
        self.resume.is_some()
    }

    pub fn stash(&self) -> Option<&serde_json::Value> {
        self.resume.as_ref().and_then(|r| r.stash.as_ref())
    }

    pub fn child(&self) -> Option<&NestedResume> {
        self.resume.as_ref().and_then(|r| r.child.as_ref())
    }

    pub fn tool_context(&self) -> ToolContext {
        ToolContext {
            conversation_id: self.conversation_id.clone(),
            step: self.step.clone(),
        }
    }

    /// Ask the approver about `calls`.
    ///
    /// On first entry this returns [`Approval::Pending`] and the step should
    /// suspend with the request. When the step is re-entered the saved request
    /// is matched against the responses and the surviving calls come back.
    pub fn request_approval(&self, calls: &[ToolCall], policy: ApprovalPolicy) -> Result<Approval> {
        match &self.resume {
            Some(resume) => Ok(Approval::Decided(
                resume.request.apply(&resume.responses)?,
            )),
            None => {
                self.publish(GraphEvent::ApprovalRequested {
                    step: self.step.clone(),
                    calls: calls.to_vec(),
                });
                Ok(Approval::Pending(InterruptRequest::new(calls, policy)))
            }
        }
    }
}

/// Step backed by an async closure over an owned state snapshot.
pub struct FnStep<F> {
    func: F,
}

pub fn from_fn<F, Fut>(func: F) -> FnStep<F>
where
    F: Fn(State, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepResult>> + Send + 'static,
{
    FnStep { func }
}

impl<F, Fut> Step for FnStep<F>
where
    F: Fn(State, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StepResult>> + Send + 'static,
{
    fn run<'a>(&'a self, state: &'a State, ctx: StepContext) -> BoxFuture<'a, Result<StepResult>> {
        Box::pin((self.func)(state.clone(), ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptResponse;
    use serde_json::json;
    use trellis_core::error::TrellisError;

    fn calls() -> Vec<ToolCall> {
        vec![ToolCall::new("execute_query", json!({"sql": "SELECT 1"})).with_id("c1")]
    }

    #[tokio::test]
    async fn approval_pending_publishes_event() {
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let mut ctx = StepContext::new(ConversationId::new(), "data_explorer", "sql_executor");
        ctx.events = Some(bus);

        match ctx.request_approval(&calls(), ApprovalPolicy::full()).unwrap() {
            Approval::Pending(request) => assert_eq!(request.items.len(), 1),
            Approval::Decided(_) => panic!("expected pending"),
        }
        assert!(matches!(
            rx.recv().await.unwrap(),
            GraphEvent::ApprovalRequested { .. }
        ));
    }

    #[test]
    fn approval_decided_on_resume() {
        let mut ctx = StepContext::new(ConversationId::new(), "g", "s");
        ctx.resume = Some(ResumeInput {
            request: InterruptRequest::new(&calls(), ApprovalPolicy::full()),
            responses: vec![InterruptResponse::Edit {
                args: json!({"sql": "SELECT 2"}),
            }],
            stash: None,
            child: None,
        });
        match ctx.request_approval(&calls(), ApprovalPolicy::full()).unwrap() {
            Approval::Decided(calls) => assert_eq!(calls[0].args["sql"], "SELECT 2"),
            Approval::Pending(_) => panic!("expected decided"),
        }
    }

    #[test]
    fn approval_rejects_bad_resume() {
        let mut ctx = StepContext::new(ConversationId::new(), "g", "s");
        ctx.resume = Some(ResumeInput {
            request: InterruptRequest::new(&calls(), ApprovalPolicy::accept_reject()),
            responses: vec![],
            stash: None,
            child: None,
        });
        let err = ctx
            .request_approval(&calls(), ApprovalPolicy::accept_reject())
            .unwrap_err();
        assert!(matches!(err, TrellisError::InterruptMismatch { .. }));
    }

    #[tokio::test]
    async fn fn_step_sees_snapshot() {
        let step = from_fn(|state: State, _ctx| async move {
            Ok(StepResult::completed(
                StateUpdate::new().with_field("turns", state.transcript.len()),
                StepOutcome::StageComplete,
            ))
        });
        let state = State::from_human("hello");
        let result = step
            .run(&state, StepContext::new(ConversationId::new(), "g", "count"))
            .await
            .unwrap();
        match result {
            StepResult::Completed { update, outcome } => {
                assert_eq!(outcome, StepOutcome::StageComplete);
                assert_eq!(update.fields["turns"], json!(1));
            }
            StepResult::Suspended(_) => panic!("unexpected suspension"),
        }
    }
}
