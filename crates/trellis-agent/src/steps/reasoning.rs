use std::sync::Arc;

use futures::future::BoxFuture;
use regex::Regex;
use tracing::{debug, info};

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::ReasoningBackend;
use trellis_core::types::{
    BackendRequest, ChatMessage, GraphEvent, Role, ToolChoice, ToolDefinition,
};

use crate::context::trim_from;
use crate::graph::{Approval, Step, StepContext, StepOutcome, StepResult, Suspension};
use crate::interrupt::{ApprovalPolicy, CANCELLED_MESSAGE};
use crate::state::{State, StateUpdate};

/// Appended when the backend returns neither text nor tool calls.
pub const FALLBACK_MESSAGE: &str = "응답에 실패했습니다.";

/// Which part of the transcript the backend sees.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextView {
    Full,
    /// Suffix starting at the `n`-th `marker` message from the end.
    Trimmed { marker: Role, n: usize },
    /// Nothing; only the trailer, if any.
    Empty,
}

/// Sends an instruction plus a transcript view to the backend and appends
/// the response.
pub struct ReasoningStep {
    backend: Arc<dyn ReasoningBackend>,
    instruction: String,
    view: ContextView,
    trailer: Option<String>,
    tools: Vec<ToolDefinition>,
    tool_choice: ToolChoice,
    model: Option<String>,
    reasoning: Option<bool>,
    stage_field: Option<String>,
    extract_code_block: bool,
    question_field: Option<String>,
    approval: Option<ApprovalPolicy>,
}

impl ReasoningStep {
    pub fn new(backend: Arc<dyn ReasoningBackend>, instruction: impl Into<String>) -> Self {
        Self {
            backend,
            instruction: instruction.into(),
            view: ContextView::Full,
            trailer: None,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
            model: None,
            reasoning: None,
            stage_field: None,
            extract_code_block: false,
            question_field: None,
            approval: None,
        }
    }

    pub fn with_view(mut self, view: ContextView) -> Self {
        self.view = view;
        self
    }

    /// Human prompt appended after the view. `{field}` placeholders are
    /// filled from state fields.
    pub fn with_trailer(mut self, template: impl Into<String>) -> Self {
        self.trailer = Some(template.into());
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_reasoning(mut self, enabled: bool) -> Self {
        self.reasoning = Some(enabled);
        self
    }

    /// Field set to the response text when the stage completes.
    pub fn with_stage_field(mut self, field: impl Into<String>) -> Self {
        self.stage_field = Some(field.into());
        self
    }

    /// Store only the body of the first fenced code block in the stage field.
    pub fn extract_code_block(mut self) -> Self {
        self.extract_code_block = true;
        self
    }

    /// Field set to the latest human message when the stage completes.
    pub fn with_question_field(mut self, field: impl Into<String>) -> Self {
        self.question_field = Some(field.into());
        self
    }

    /// Route requested tool calls through the approver first.
    pub fn with_approval(mut self, policy: ApprovalPolicy) -> Self {
        self.approval = Some(policy);
        self
    }

    fn build_request(&self, state: &State) -> Result<BackendRequest> {
        let mut messages = match &self.view {
            ContextView::Full => state.transcript.clone(),
            ContextView::Trimmed { marker, n } => {
                trim_from(&state.transcript, *marker, *n, true)?.to_vec()
            }
            ContextView::Empty => Vec::new(),
        };
        if let Some(template) = &self.trailer {
            messages.push(ChatMessage::human(render_template(template, state)?));
        }

        Ok(BackendRequest {
            instruction: self.instruction.clone(),
            messages,
            tools: self.tools.clone(),
            tool_choice: self.tool_choice.clone(),
            model: self.model.clone(),
            reasoning: self.reasoning,
        })
    }

    fn stage_value(&self, content: &str) -> String {
        if self.extract_code_block {
            if let Some(body) = first_code_block(content) {
                return body;
            }
        }
        content.trim().to_string()
    }

    fn complete_stage(&self, state: &State, message: ChatMessage) -> StateUpdate {
        let mut update = StateUpdate::new();
        if let Some(field) = &self.stage_field {
            update = update.with_field(field.clone(), self.stage_value(&message.content));
        }
        if let Some(field) = &self.question_field {
            if let Some(human) = state.last_human() {
                update = update.with_field(field.clone(), human.content.clone());
            }
        }
        update.messages.push(message);
        update
    }
}

impl Step for ReasoningStep {
    fn run<'a>(&'a self, state: &'a State, ctx: StepContext) -> BoxFuture<'a, Result<StepResult>> {
        Box::pin(async move {
            // A resumed step continues from the message it stashed before
            // suspending; the backend is not asked twice.
            let message = match ctx.stash() {
                Some(stash) => serde_json::from_value::<ChatMessage>(stash.clone())?,
                None => {
                    let request = self.build_request(state)?;
                    debug!(
                        step = %ctx.step,
                        backend = self.backend.name(),
                        messages = request.messages.len(),
                        tools = request.tools.len(),
                        "Calling reasoning backend"
                    );
                    let response = self.backend.complete(request).await?;
                    if let Some(trace) = response.reasoning.as_ref().filter(|t| !t.is_empty()) {
                        ctx.publish(GraphEvent::Reasoning {
                            step: ctx.step.clone(),
                            text: trace.clone(),
                        });
                    }
                    response.into_message().with_name(ctx.step.clone())
                }
            };

            if message.has_tool_calls() {
                let calls = match self.approval {
                    Some(policy) => match ctx.request_approval(&message.tool_calls, policy)? {
                        Approval::Pending(request) => {
                            let stash = serde_json::to_value(&message)?;
                            return Ok(StepResult::Suspended(
                                Suspension::new(request).with_stash(stash),
                            ));
                        }
                        Approval::Decided(calls) => calls,
                    },
                    None => message.tool_calls.clone(),
                };

                if calls.is_empty() {
                    info!(step = %ctx.step, "All pending tool calls rejected");
                    let mut update = StateUpdate::new();
                    if !message.content.trim().is_empty() {
                        update = update.with_message(ChatMessage {
                            tool_calls: Vec::new(),
                            ..message
                        });
                    }
                    ctx.publish(GraphEvent::Message {
                        step: ctx.step.clone(),
                        text: CANCELLED_MESSAGE.to_string(),
                    });
                    let update = update.with_message(
                        ChatMessage::assistant(CANCELLED_MESSAGE).with_name(ctx.step.clone()),
                    );
                    return Ok(StepResult::completed(update, StepOutcome::NoOutput));
                }

                let message = ChatMessage {
                    tool_calls: calls.clone(),
                    ..message
                };
                return Ok(StepResult::completed(
                    StateUpdate::message(message),
                    StepOutcome::ToolRequested { calls },
                ));
            }

            if !message.content.trim().is_empty() {
                ctx.publish(GraphEvent::Message {
                    step: ctx.step.clone(),
                    text: message.content.clone(),
                });
                return Ok(StepResult::completed(
                    self.complete_stage(state, message),
                    StepOutcome::StageComplete,
                ));
            }

            info!(step = %ctx.step, "Backend returned no usable output");
            Ok(StepResult::completed(
                StateUpdate::message(
                    ChatMessage::assistant(FALLBACK_MESSAGE).with_name(ctx.step.clone()),
                ),
                StepOutcome::NoOutput,
            ))
        })
    }
}

/// Fill `{field}` placeholders from state. A missing field is a definition
/// error: the graph routed here before the field was produced.
pub fn render_template(template: &str, state: &State) -> Result<String> {
    let placeholder = Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| TrellisError::GraphDefinition(e.to_string()))?;

    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in placeholder.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = state.field_str(name.as_str()).ok_or_else(|| {
            TrellisError::GraphDefinition(format!(
                "prompt placeholder '{{{}}}' has no value in state",
                name.as_str()
            ))
        })?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Ok(out)
}

/// Body of the first fenced code block, without the language tag.
pub fn first_code_block(text: &str) -> Option<String> {
    let fence = Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```").ok()?;
    fence
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|body| body.as_str().trim().to_string())
        .filter(|body| !body.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interrupt::InterruptResponse;
    use crate::graph::ResumeInput;
    use serde_json::json;
    use trellis_core::types::{BackendResponse, ConversationId, ToolCall};
    use trellis_test_utils::ScriptedBackend;

    fn ctx() -> StepContext {
        StepContext::new(ConversationId::new(), "data_explorer", "text_to_sql")
    }

    #[test]
    fn template_fills_fields() {
        let mut state = State::new();
        state.apply(StateUpdate::new().with_field("generated_sql", "SELECT 1"));
        assert_eq!(
            render_template("초기 쿼리: {generated_sql}", &state).unwrap(),
            "초기 쿼리: SELECT 1"
        );
        assert!(matches!(
            render_template("{corrected_sql}", &state),
            Err(TrellisError::GraphDefinition(_))
        ));
    }

    #[test]
    fn code_block_extraction() {
        let text = "수정된 쿼리입니다.\n```sql\nSELECT * FROM orders WHERE status = 'done'\n```";
        assert_eq!(
            first_code_block(text).unwrap(),
            "SELECT * FROM orders WHERE status = 'done'"
        );
        assert!(first_code_block("SELECT 1").is_none());
    }

    #[tokio::test]
    async fn stage_sets_fields() {
        let backend = ScriptedBackend::new();
        backend.respond(BackendResponse::text("```sql\nSELECT 1\n```").with_reasoning("hmm"));
        let step = ReasoningStep::new(Arc::new(backend.clone()), "write sql")
            .with_stage_field("generated_sql")
            .extract_code_block()
            .with_question_field("user_question");

        let state = State::from_human("how many orders?");
        match step.run(&state, ctx()).await.unwrap() {
            StepResult::Completed { update, outcome } => {
                assert_eq!(outcome, StepOutcome::StageComplete);
                assert_eq!(update.fields["generated_sql"], "SELECT 1");
                assert_eq!(update.fields["user_question"], "how many orders?");
                assert_eq!(update.messages[0].name.as_deref(), Some("text_to_sql"));
            }
            StepResult::Suspended(_) => panic!("unexpected suspension"),
        }
        assert_eq!(backend.requests()[0].instruction, "write sql");
    }

    #[tokio::test]
    async fn empty_response_falls_back() {
        let backend = ScriptedBackend::new();
        backend.text("   ");
        let step = ReasoningStep::new(Arc::new(backend), "x").with_stage_field("generated_sql");
        match step.run(&State::from_human("q"), ctx()).await.unwrap() {
            StepResult::Completed { update, outcome } => {
                assert_eq!(outcome, StepOutcome::NoOutput);
                assert_eq!(update.messages[0].content, FALLBACK_MESSAGE);
                assert!(update.fields.is_empty());
            }
            StepResult::Suspended(_) => panic!("unexpected suspension"),
        }
    }

    #[tokio::test]
    async fn view_and_trailer_shape_request() {
        let backend = ScriptedBackend::new();
        backend.text("ok");
        let step = ReasoningStep::new(Arc::new(backend.clone()), "x")
            .with_view(ContextView::Empty)
            .with_trailer("**입력 쿼리**:\n{corrected_sql}");
        let mut state = State::from_human("q");
        state.apply(StateUpdate::new().with_field("corrected_sql", "SELECT 2"));
        step.run(&state, ctx()).await.unwrap();

        let request = &backend.requests()[0];
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].content, "**입력 쿼리**:\nSELECT 2");
    }

    #[tokio::test]
    async fn approval_suspends_then_uses_stash() {
        let backend = ScriptedBackend::new();
        backend.call("c1", "execute_query", json!({"sql": "SELECT 1"}));
        let step = ReasoningStep::new(Arc::new(backend.clone()), "x")
            .with_approval(ApprovalPolicy::full());
        let state = State::from_human("q");

        let suspension = match step.run(&state, ctx()).await.unwrap() {
            StepResult::Suspended(s) => s,
            StepResult::Completed { .. } => panic!("expected suspension"),
        };

        let mut resumed = ctx();
        resumed.resume = Some(ResumeInput {
            request: suspension.request,
            responses: vec![InterruptResponse::Accept],
            stash: suspension.stash,
            child: None,
        });
        match step.run(&state, resumed).await.unwrap() {
            StepResult::Completed { outcome, update } => {
                assert!(matches!(outcome, StepOutcome::ToolRequested { .. }));
                assert_eq!(update.messages[0].tool_calls[0].id, "c1");
            }
            StepResult::Suspended(_) => panic!("suspended twice"),
        }
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn rejection_yields_cancellation() {
        let step = ReasoningStep::new(Arc::new(ScriptedBackend::new()), "x")
            .with_approval(ApprovalPolicy::full());
        let message = ChatMessage::assistant_with_calls(
            "",
            vec![ToolCall::new("execute_query", json!({"sql": "SELECT 1"})).with_id("c1")],
        );
        let mut resumed = ctx();
        resumed.resume = Some(ResumeInput {
            request: crate::interrupt::InterruptRequest::new(
                &message.tool_calls,
                ApprovalPolicy::full(),
            ),
            responses: vec![InterruptResponse::Reject],
            stash: Some(serde_json::to_value(&message).unwrap()),
            child: None,
        });
        match step.run(&State::from_human("q"), resumed).await.unwrap() {
            StepResult::Completed { update, outcome } => {
                assert_eq!(outcome, StepOutcome::NoOutput);
                assert_eq!(update.messages.len(), 1);
                assert_eq!(update.messages[0].content, CANCELLED_MESSAGE);
            }
            StepResult::Suspended(_) => panic!("unexpected suspension"),
        }
    }
}
