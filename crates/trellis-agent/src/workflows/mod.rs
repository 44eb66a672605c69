//! The assistant's workflows, assembled from the engine's step shapes.
//!
//! `chatbot` is the top-level graph. It runs `supervisor` as a sub-graph,
//! which classifies the question and hands it to one expert graph.

pub mod casual_chat;
pub mod chatbot;
pub mod code_assistant;
pub mod data_explorer;
pub mod document_qa;
pub mod prompts;
pub mod supervisor;

use std::sync::Arc;

use trellis_core::config::{AppConfig, ApprovalConfig};
use trellis_core::error::Result;
use trellis_core::traits::ReasoningBackend;
use trellis_tools::ToolRegistry;

use crate::graph::DEFAULT_MAX_STEPS;
use crate::interrupt::ApprovalPolicy;

/// Everything the workflows need from the outside.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub backend: Arc<dyn ReasoningBackend>,
    /// Backend for the code assistant.
    pub coder_backend: Arc<dyn ReasoningBackend>,
    pub tools: Arc<ToolRegistry>,
    pub approval: ApprovalConfig,
    pub max_steps: usize,
}

impl WorkflowDeps {
    pub fn new(backend: Arc<dyn ReasoningBackend>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            coder_backend: backend.clone(),
            backend,
            tools,
            approval: ApprovalConfig::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Backends from the configured models; the coder model falls back to
    /// the default one.
    pub fn from_config(config: &AppConfig, tools: Arc<ToolRegistry>) -> Result<Self> {
        let backend = trellis_llm::create_client(&config.model)?;
        let coder_backend = match &config.coder_model {
            Some(coder) => trellis_llm::create_client(coder)?,
            None => backend.clone(),
        };
        Ok(Self {
            backend,
            coder_backend,
            tools,
            approval: config.approval.clone(),
            max_steps: config.graph.max_steps,
        })
    }

    pub fn with_coder(mut self, coder_backend: Arc<dyn ReasoningBackend>) -> Self {
        self.coder_backend = coder_backend;
        self
    }

    pub fn with_approval(mut self, approval: ApprovalConfig) -> Self {
        self.approval = approval;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Policy for gated query execution, or `None` when approval is off.
    pub fn approval_policy(&self) -> Option<ApprovalPolicy> {
        match (self.approval.enabled, self.approval.allow_edit) {
            (false, _) => None,
            (true, true) => Some(ApprovalPolicy::full()),
            (true, false) => Some(ApprovalPolicy::accept_reject()),
        }
    }
}
