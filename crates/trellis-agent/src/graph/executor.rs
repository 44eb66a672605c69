use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use trellis_core::error::{Result, TrellisError};
use trellis_core::event::EventBus;
use trellis_core::types::{ConversationId, GraphEvent};

use super::edge::{Next, Router, Transition};
use super::step::{ResumeInput, Step, StepContext, StepOutcome, StepResult};
use crate::interrupt::{InterruptResponse, ResumePoint};
use crate::state::State;

/// Default per-run step budget.
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Record of one completed step.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub step: String,
    pub outcome: StepOutcome,
    pub elapsed_ms: u64,
}

/// How a run stopped.
#[derive(Debug, Clone)]
pub enum RunStatus {
    /// Reached the terminal.
    Complete,
    /// Halted for approval. The state in the result is the one the
    /// suspended step saw.
    Suspended(ResumePoint),
}

/// Result of running or resuming a graph.
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub state: State,
    pub status: RunStatus,
    /// Completed steps in execution order.
    pub steps: Vec<StepRecord>,
    pub total_elapsed_ms: u64,
}

impl ExecutionResult {
    pub fn is_complete(&self) -> bool {
        matches!(self.status, RunStatus::Complete)
    }

    pub fn resume_point(&self) -> Option<&ResumePoint> {
        match &self.status {
            RunStatus::Suspended(point) => Some(point),
            RunStatus::Complete => None,
        }
    }
}

/// Per-run settings shared by every step of one invocation.
#[derive(Clone, Default)]
pub struct RunContext {
    pub conversation_id: ConversationId,
    pub cancel: CancellationToken,
    pub events: Option<Arc<EventBus>>,
}

impl RunContext {
    pub fn new(conversation_id: ConversationId) -> Self {
        Self {
            conversation_id,
            ..Default::default()
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    fn publish(&self, event: GraphEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}

/// Collects steps and transitions. Definition errors surface at `compile`.
pub struct GraphBuilder {
    name: String,
    steps: Vec<(String, Arc<dyn Step>)>,
    transitions: Vec<(String, Transition)>,
    entry: Option<String>,
    max_steps: usize,
}

impl GraphBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            transitions: Vec::new(),
            entry: None,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn step(self, name: impl Into<String>, step: impl Step) -> Self {
        self.step_arc(name, Arc::new(step))
    }

    pub fn step_arc(mut self, name: impl Into<String>, step: Arc<dyn Step>) -> Self {
        self.steps.push((name.into(), step));
        self
    }

    /// Unconditional successor.
    pub fn edge(mut self, from: impl Into<String>, to: Next) -> Self {
        self.transitions.push((from.into(), Transition::Fixed(to)));
        self
    }

    /// Conditional successor.
    pub fn route(mut self, from: impl Into<String>, router: Router) -> Self {
        self.transitions.push((from.into(), Transition::Routed(router)));
        self
    }

    pub fn entry(mut self, name: impl Into<String>) -> Self {
        self.entry = Some(name.into());
        self
    }

    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn compile(self) -> Result<Graph> {
        let invalid = |msg: String| TrellisError::GraphDefinition(format!("{}: {}", self.name, msg));

        if self.max_steps == 0 {
            return Err(invalid("step budget must be at least 1".into()));
        }

        let mut steps: HashMap<String, Arc<dyn Step>> = HashMap::new();
        let mut order = Vec::with_capacity(self.steps.len());
        for (name, step) in &self.steps {
            if name.is_empty() {
                return Err(invalid("step names cannot be empty".into()));
            }
            if steps.insert(name.clone(), step.clone()).is_some() {
                return Err(invalid(format!("duplicate step '{}'", name)));
            }
            order.push(name.clone());
        }

        let entry = self
            .entry
            .clone()
            .ok_or_else(|| invalid("no entry step".into()))?;
        if !steps.contains_key(&entry) {
            return Err(invalid(format!("entry step '{}' is not defined", entry)));
        }

        let mut transitions: HashMap<String, Transition> = HashMap::new();
        for (from, transition) in &self.transitions {
            if !steps.contains_key(from) {
                return Err(invalid(format!("edge from unknown step '{}'", from)));
            }
            for target in transition.targets() {
                if let Next::Step(to) = target {
                    if !steps.contains_key(to) {
                        return Err(invalid(format!(
                            "edge '{}' -> '{}' targets an unknown step",
                            from, to
                        )));
                    }
                }
            }
            if transitions.insert(from.clone(), transition.clone()).is_some() {
                return Err(invalid(format!("step '{}' has more than one transition", from)));
            }
        }

        if let Some(missing) = order.iter().find(|name| !transitions.contains_key(*name)) {
            return Err(invalid(format!("step '{}' has no transition", missing)));
        }

        Ok(Graph {
            name: self.name,
            steps,
            order,
            transitions,
            entry,
            max_steps: self.max_steps,
        })
    }
}

/// A compiled, immutable workflow.
pub struct Graph {
    name: String,
    steps: HashMap<String, Arc<dyn Step>>,
    order: Vec<String>,
    transitions: HashMap<String, Transition>,
    entry: String,
    max_steps: usize,
}

impl Graph {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    /// Step names in definition order.
    pub fn step_names(&self) -> &[String] {
        &self.order
    }

    /// Run from the entry step.
    pub async fn run(&self, state: State, run: &RunContext) -> Result<ExecutionResult> {
        info!(
            graph = %self.name,
            conversation_id = %run.conversation_id,
            entry = %self.entry,
            "Running graph"
        );
        self.drive(state, self.entry.clone(), 0, None, run).await
    }

    /// Re-enter the suspended step of `point` with the approver's responses.
    ///
    /// `state` must be the state stored alongside the point. The responses are
    /// checked before anything runs.
    pub async fn resume(
        &self,
        state: State,
        point: ResumePoint,
        responses: Vec<InterruptResponse>,
        run: &RunContext,
    ) -> Result<ExecutionResult> {
        if point.graph != self.name {
            return Err(TrellisError::GraphDefinition(format!(
                "resume point belongs to graph '{}', not '{}'",
                point.graph, self.name
            )));
        }
        if !self.steps.contains_key(&point.step) {
            return Err(TrellisError::UnknownStep(point.step));
        }
        point.request.validate(&responses)?;

        info!(
            graph = %self.name,
            conversation_id = %run.conversation_id,
            step = %point.step,
            "Resuming graph"
        );

        let resume = ResumeInput {
            request: point.request,
            responses,
            stash: point.stash,
            child: point.child.map(|nested| *nested),
        };
        self.drive(state, point.step, point.steps_taken, Some(resume), run)
            .await
    }

    async fn drive(
        &self,
        mut state: State,
        mut cursor: String,
        mut steps_taken: usize,
        mut resume: Option<ResumeInput>,
        run: &RunContext,
    ) -> Result<ExecutionResult> {
        let start = Instant::now();
        let mut records = Vec::new();

        loop {
            if steps_taken >= self.max_steps {
                warn!(graph = %self.name, step = %cursor, limit = self.max_steps, "Step budget exhausted");
                return Err(TrellisError::StepBudgetExceeded {
                    graph: self.name.clone(),
                    limit: self.max_steps,
                });
            }

            let step = self
                .steps
                .get(&cursor)
                .ok_or_else(|| TrellisError::UnknownStep(cursor.clone()))?;

            let ctx = StepContext {
                conversation_id: run.conversation_id.clone(),
                graph: self.name.clone(),
                step: cursor.clone(),
                cancel: run.cancel.clone(),
                events: run.events.clone(),
                resume: resume.take(),
            };

            debug!(graph = %self.name, step = %cursor, "Executing step");
            run.publish(GraphEvent::StepStarted {
                graph: self.name.clone(),
                step: cursor.clone(),
            });

            let step_start = Instant::now();
            let result = tokio::select! {
                biased;
                _ = run.cancel.cancelled() => {
                    info!(graph = %self.name, step = %cursor, "Run cancelled");
                    return Err(TrellisError::Cancelled);
                }
                result = step.run(&state, ctx) => result?,
            };
            let elapsed_ms = step_start.elapsed().as_millis() as u64;

            let (update, outcome) = match result {
                StepResult::Completed { update, outcome } => (update, outcome),
                StepResult::Suspended(suspension) => {
                    info!(
                        graph = %self.name,
                        step = %cursor,
                        pending = suspension.request.items.len(),
                        "Step suspended for approval"
                    );
                    let point = ResumePoint {
                        graph: self.name.clone(),
                        step: cursor,
                        steps_taken,
                        request: suspension.request,
                        stash: suspension.stash,
                        child: suspension.child,
                    };
                    return Ok(ExecutionResult {
                        state,
                        status: RunStatus::Suspended(point),
                        steps: records,
                        total_elapsed_ms: start.elapsed().as_millis() as u64,
                    });
                }
            };

            state.apply(update);
            steps_taken += 1;

            run.publish(GraphEvent::StepFinished {
                graph: self.name.clone(),
                step: cursor.clone(),
                elapsed_ms,
            });

            let transition = self
                .transitions
                .get(&cursor)
                .ok_or_else(|| TrellisError::UnknownStep(cursor.clone()))?;
            let next = transition.resolve(&cursor, &state, &outcome)?;

            debug!(
                graph = %self.name,
                step = %cursor,
                outcome = outcome.label(),
                next = %next,
                elapsed_ms,
                "Step complete"
            );

            records.push(StepRecord {
                step: cursor.clone(),
                outcome,
                elapsed_ms,
            });

            match next {
                Next::Step(name) => cursor = name,
                Next::End => break,
            }
        }

        let total_elapsed_ms = start.elapsed().as_millis() as u64;
        info!(
            graph = %self.name,
            conversation_id = %run.conversation_id,
            steps = records.len(),
            total_elapsed_ms,
            "Graph complete"
        );

        Ok(ExecutionResult {
            state,
            status: RunStatus::Complete,
            steps: records,
            total_elapsed_ms,
        })
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("steps", &self.order)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}
