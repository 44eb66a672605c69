//! Approval interrupts.
//!
//! A step that wants a human to vet pending tool calls asks its
//! [`StepContext`](crate::graph::StepContext) for approval. On first entry
//! the run halts and the caller receives an [`InterruptRequest`]. The caller
//! later presents one [`InterruptResponse`] per item, the executor re-enters
//! the same step, and the step gets back the surviving calls.

use serde::{Deserialize, Serialize};

use trellis_core::error::{Result, TrellisError};
use trellis_core::types::ToolCall;

use crate::state::State;

/// Fixed reply when every pending call was rejected.
pub const CANCELLED_MESSAGE: &str = "사용자가 요청을 취소했습니다.";

/// Which response kinds an approver may give.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    pub accept: bool,
    pub reject: bool,
    pub edit: bool,
}

impl ApprovalPolicy {
    /// Accept, reject or edit.
    pub fn full() -> Self {
        Self {
            accept: true,
            reject: true,
            edit: true,
        }
    }

    /// Accept or reject; arguments cannot be changed.
    pub fn accept_reject() -> Self {
        Self {
            edit: false,
            ..Self::full()
        }
    }

    fn allows(&self, response: &InterruptResponse) -> bool {
        match response {
            InterruptResponse::Accept => self.accept,
            InterruptResponse::Reject => self.reject,
            InterruptResponse::Edit { .. } => self.edit,
        }
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::full()
    }
}

/// One call awaiting a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalItem {
    pub description: String,
    pub call: ToolCall,
    pub policy: ApprovalPolicy,
}

/// What the caller must answer before the run can continue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub items: Vec<ApprovalItem>,
}

impl InterruptRequest {
    pub fn new(calls: &[ToolCall], policy: ApprovalPolicy) -> Self {
        let items = calls
            .iter()
            .map(|call| ApprovalItem {
                description: format!("도구 실행 승인이 필요합니다: {}", call.name),
                call: call.clone(),
                policy,
            })
            .collect();
        Self { items }
    }

    /// Check count and kinds. Responses pair with items by position.
    pub fn validate(&self, responses: &[InterruptResponse]) -> Result<()> {
        if responses.len() != self.items.len() {
            return Err(TrellisError::InterruptMismatch {
                expected: self.items.len(),
                actual: responses.len(),
            });
        }
        for (item, response) in self.items.iter().zip(responses) {
            if !item.policy.allows(response) {
                return Err(TrellisError::UnsupportedResponse {
                    kind: response.kind().to_string(),
                    call_id: item.call.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// The calls that survive the responses. Rejected calls are dropped and
    /// edited calls keep their id with the new arguments.
    pub fn apply(&self, responses: &[InterruptResponse]) -> Result<Vec<ToolCall>> {
        self.validate(responses)?;
        let calls = self
            .items
            .iter()
            .zip(responses)
            .filter_map(|(item, response)| match response {
                InterruptResponse::Accept => Some(item.call.clone()),
                InterruptResponse::Reject => None,
                InterruptResponse::Edit { args } => Some(ToolCall {
                    args: args.clone(),
                    ..item.call.clone()
                }),
            })
            .collect();
        Ok(calls)
    }
}

/// The approver's decision for one item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InterruptResponse {
    Accept,
    Reject,
    Edit { args: serde_json::Value },
}

impl InterruptResponse {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Edit { .. } => "edit",
        }
    }
}

/// Serializable continuation of a suspended run.
///
/// The caller hands it back unchanged on resume. `stash` holds whatever the
/// suspended step saved before asking. `child` is set when the suspension
/// happened inside a nested graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumePoint {
    pub graph: String,
    pub step: String,
    /// Steps completed before the suspended one.
    pub steps_taken: usize,
    pub request: InterruptRequest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stash: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<Box<NestedResume>>,
}

impl ResumePoint {
    /// Names of the graphs and steps from the outermost suspension inwards.
    pub fn path(&self) -> Vec<(String, String)> {
        let mut out = vec![(self.graph.clone(), self.step.clone())];
        let mut next = self.child.as_deref();
        while let Some(nested) = next {
            out.push((nested.point.graph.clone(), nested.point.step.clone()));
            next = nested.point.child.as_deref();
        }
        out
    }
}

/// A child graph's own state and continuation, carried by its parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedResume {
    pub state: State,
    pub point: ResumePoint,
}
