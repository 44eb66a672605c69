use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{info, warn};

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::{ChatMessage, GraphEvent, Role, ToolResult};
use trellis_tools::{CallGuard, ToolRegistry};

use crate::graph::{Step, StepContext, StepOutcome, StepResult};
use crate::state::{State, StateUpdate};

/// Runs the tool calls of the last assistant message, in order.
///
/// Each call yields exactly one tool-result message carrying the call id.
/// Validation and execution failures become error text for the backend to
/// read unless `propagate_errors` is set. Timeouts and transport failures
/// always fail the step.
pub struct ToolStep {
    registry: Arc<ToolRegistry>,
    allowed: Vec<String>,
    guard: Option<Arc<dyn CallGuard>>,
    payload_field: Option<String>,
    propagate_errors: bool,
}

impl ToolStep {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            allowed: Vec::new(),
            guard: None,
            payload_field: None,
            propagate_errors: false,
        }
    }

    /// Restrict dispatch to these tools. Other names get an error result.
    pub fn only(mut self, names: &[&str]) -> Self {
        self.allowed = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub fn with_guard(mut self, guard: Arc<dyn CallGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Copy a successful result's structured payload into this field.
    pub fn with_payload_field(mut self, field: impl Into<String>) -> Self {
        self.payload_field = Some(field.into());
        self
    }

    pub fn propagate_errors(mut self) -> Self {
        self.propagate_errors = true;
        self
    }

    fn is_allowed(&self, name: &str) -> bool {
        self.allowed.is_empty() || self.allowed.iter().any(|n| n == name)
    }
}

impl Step for ToolStep {
    fn run<'a>(&'a self, state: &'a State, ctx: StepContext) -> BoxFuture<'a, Result<StepResult>> {
        Box::pin(async move {
            let pending = state
                .transcript
                .last()
                .filter(|m| m.role == Role::Assistant && m.has_tool_calls())
                .ok_or_else(|| {
                    TrellisError::unroutable(&ctx.step, "no pending tool calls in the last message")
                })?;

            let mut update = StateUpdate::new();
            for call in &pending.tool_calls {
                ctx.publish(GraphEvent::ToolStart {
                    step: ctx.step.clone(),
                    name: call.name.clone(),
                    args: call.args.clone(),
                });

                let result = if let Some(rejection) =
                    self.guard.as_ref().and_then(|g| g.inspect(call))
                {
                    info!(step = %ctx.step, tool = %call.name, "Guard rejected tool call");
                    ToolResult::error(rejection)
                } else if !self.is_allowed(&call.name) {
                    let err = TrellisError::ToolNotFound(call.name.clone());
                    if self.propagate_errors {
                        return Err(err);
                    }
                    ToolResult::error(format!("Error: {}", err))
                } else {
                    match self
                        .registry
                        .execute(&call.name, call.args.clone(), ctx.tool_context())
                        .await
                    {
                        Ok(result) => result,
                        Err(e) if e.is_io_failure() || self.propagate_errors => {
                            warn!(step = %ctx.step, tool = %call.name, error = %e, "Tool failed; aborting run");
                            return Err(e);
                        }
                        Err(e) => {
                            warn!(step = %ctx.step, tool = %call.name, error = %e, "Tool failed");
                            ToolResult::error(format!("Error: {}", e))
                        }
                    }
                };

                if let (Some(field), Some(payload), false) =
                    (&self.payload_field, &result.payload, result.is_error)
                {
                    update = update.with_field(field.clone(), payload.clone());
                }

                update = update.with_message(ChatMessage::tool_result(
                    call.id.clone(),
                    call.name.clone(),
                    result.content.clone(),
                ));

                ctx.publish(GraphEvent::ToolEnd {
                    step: ctx.step.clone(),
                    name: call.name.clone(),
                    result,
                });
            }

            Ok(StepResult::completed(update, StepOutcome::StageComplete))
        })
    }
}
