use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::info;

use trellis_core::error::{Result, TrellisError};
use trellis_core::traits::ReasoningBackend;
use trellis_core::types::{BackendRequest, ToolChoice, ToolDefinition};

use crate::graph::{Next, Router, Step, StepContext, StepOutcome, StepResult};
use crate::state::{State, StateUpdate};

/// Name of the forced routing tool.
pub const ROUTE_TOOL: &str = "route";
/// State field holding the chosen step.
pub const NEXT_FIELD: &str = "next";

/// One routing choice: the label the backend picks and the step it maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expert {
    pub label: String,
    pub step: String,
}

impl Expert {
    pub fn new(label: impl Into<String>, step: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            step: step.into(),
        }
    }
}

/// Classifies the latest question and records which expert should answer.
///
/// The backend is forced to call the `route` tool. No message is added to
/// the transcript; only the `next` field changes.
pub struct SupervisorStep {
    backend: Arc<dyn ReasoningBackend>,
    instruction: String,
    experts: Vec<Expert>,
    reasoning: Option<bool>,
}

impl SupervisorStep {
    pub fn new(
        backend: Arc<dyn ReasoningBackend>,
        instruction: impl Into<String>,
        experts: Vec<Expert>,
    ) -> Self {
        Self {
            backend,
            instruction: instruction.into(),
            experts,
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, enabled: bool) -> Self {
        self.reasoning = Some(enabled);
        self
    }

    pub fn experts(&self) -> &[Expert] {
        &self.experts
    }

    fn route_tool(&self) -> ToolDefinition {
        let labels: Vec<&str> = self.experts.iter().map(|e| e.label.as_str()).collect();
        ToolDefinition {
            name: ROUTE_TOOL.to_string(),
            description: "어떤 에이전트를 다음으로 호출할지 결정합니다.".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "next": {
                        "type": "string",
                        "enum": labels,
                        "description": "다음 경로."
                    }
                },
                "required": ["next"]
            }),
        }
    }

    fn resolve(&self, label: &str) -> Option<&Expert> {
        self.experts
            .iter()
            .find(|e| e.label.eq_ignore_ascii_case(label) || e.step == label)
    }

    /// Router that sends the run to the recorded expert step.
    pub fn router(&self) -> Router {
        let steps: Vec<String> = self.experts.iter().map(|e| e.step.clone()).collect();
        let targets = steps.iter().map(Next::step).collect();
        Router::new(targets, move |state, _outcome| {
            let chosen = state.field_str(NEXT_FIELD).ok_or_else(|| {
                TrellisError::unroutable("supervisor", "no routing decision recorded")
            })?;
            if steps.contains(&chosen) {
                Ok(Next::Step(chosen))
            } else {
                Err(TrellisError::unroutable(
                    "supervisor",
                    format!("unknown expert '{}'", chosen),
                ))
            }
        })
    }
}

impl Step for SupervisorStep {
    fn run<'a>(&'a self, state: &'a State, ctx: StepContext) -> BoxFuture<'a, Result<StepResult>> {
        Box::pin(async move {
            let request = BackendRequest {
                instruction: self.instruction.clone(),
                messages: state.transcript.clone(),
                tools: vec![self.route_tool()],
                tool_choice: ToolChoice::Required(ROUTE_TOOL.to_string()),
                model: None,
                reasoning: self.reasoning,
            };
            let response = self.backend.complete(request).await?;

            let label = response
                .tool_calls
                .iter()
                .find(|c| c.name == ROUTE_TOOL)
                .and_then(|c| c.args.get(NEXT_FIELD))
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    TrellisError::BackendParse("supervisor did not call the route tool".to_string())
                })?;

            let expert = self.resolve(label).ok_or_else(|| {
                TrellisError::unroutable(&ctx.step, format!("unknown expert '{}'", label))
            })?;

            info!(step = %ctx.step, expert = %expert.step, "Routed question");
            Ok(StepResult::completed(
                StateUpdate::new().with_field(NEXT_FIELD, expert.step.clone()),
                StepOutcome::StageComplete,
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::types::ConversationId;
    use trellis_test_utils::ScriptedBackend;

    fn experts() -> Vec<Expert> {
        vec![
            Expert::new("Document_QA", "document_qa"),
            Expert::new("Casual_Chat", "casual_chat"),
        ]
    }

    fn ctx() -> StepContext {
        StepContext::new(ConversationId::new(), "supervisor", "supervisor")
    }

    #[tokio::test]
    async fn records_choice_without_messages() {
        let backend = ScriptedBackend::new();
        backend.call("r1", "route", json!({"next": "Casual_Chat"}));
        let step = SupervisorStep::new(Arc::new(backend.clone()), "route it", experts());

        let state = State::from_human("안녕?");
        let update = match step.run(&state, ctx()).await.unwrap() {
            StepResult::Completed { update, .. } => update,
            StepResult::Suspended(_) => panic!("unexpected suspension"),
        };
        assert!(update.messages.is_empty());
        assert_eq!(update.fields[NEXT_FIELD], "casual_chat");

        let request = &backend.requests()[0];
        assert_eq!(request.tool_choice, ToolChoice::Required("route".into()));
        assert_eq!(
            request.tools[0].input_schema["properties"]["next"]["enum"],
            json!(["Document_QA", "Casual_Chat"])
        );

        let mut after = state.clone();
        after.apply(update);
        assert_eq!(
            step.router()
                .route("supervisor", &after, &StepOutcome::StageComplete)
                .unwrap(),
            Next::step("casual_chat")
        );
    }

    #[tokio::test]
    async fn missing_route_call_is_parse_error() {
        let backend = ScriptedBackend::new();
        backend.text("I think this is casual chat");
        let step = SupervisorStep::new(Arc::new(backend), "x", experts());
        let err = step.run(&State::from_human("q"), ctx()).await.unwrap_err();
        assert!(matches!(err, TrellisError::BackendParse(_)));
    }

    #[tokio::test]
    async fn unknown_label_is_unroutable() {
        let backend = ScriptedBackend::new();
        backend.call("r1", "route", json!({"next": "Weather_Bot"}));
        let step = SupervisorStep::new(Arc::new(backend), "x", experts());
        let err = step.run(&State::from_human("q"), ctx()).await.unwrap_err();
        assert!(matches!(err, TrellisError::UnroutableState { .. }));
    }

    #[test]
    fn router_without_choice_fails() {
        let step = SupervisorStep::new(Arc::new(ScriptedBackend::new()), "x", experts());
        assert!(step
            .router()
            .route("supervisor", &State::new(), &StepOutcome::StageComplete)
            .is_err());
    }
}
