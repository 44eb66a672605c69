//! Graph engine.
//!
//! A workflow is a set of named [`Step`]s joined by fixed edges or
//! [`Router`]s. [`GraphBuilder::compile`] validates the definition and the
//! resulting [`Graph`] drives one run: call the current step, merge its
//! update, pick the successor, repeat until the terminal, a suspension, an
//! error or the step budget.

pub mod edge;
pub mod executor;
pub mod step;
pub mod subgraph;

pub use edge::{tool_loop, Next, Router, Transition};
pub use executor::{
    ExecutionResult, Graph, GraphBuilder, RunContext, RunStatus, StepRecord, DEFAULT_MAX_STEPS,
};
pub use step::{
    from_fn, Approval, FnStep, ResumeInput, Step, StepContext, StepOutcome, StepResult, Suspension,
};
pub use subgraph::{SubgraphInput, SubgraphOutput, SubgraphStep};
