pub mod checkpoint;
pub mod context;
pub mod conversation;
pub mod graph;
pub mod interrupt;
pub mod state;
pub mod steps;
pub mod workflows;

pub use checkpoint::{Checkpoint, CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
pub use conversation::{Conversations, TurnReply};
pub use graph::{
    ExecutionResult, Graph, GraphBuilder, Next, Router, RunContext, RunStatus, Step, StepContext,
    StepOutcome, StepResult,
};
pub use interrupt::{ApprovalPolicy, InterruptRequest, InterruptResponse, ResumePoint};
pub use state::{State, StateUpdate};
pub use workflows::WorkflowDeps;
