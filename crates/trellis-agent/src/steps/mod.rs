//! Reusable step shapes.

pub mod reasoning;
pub mod supervisor;
pub mod tool;

pub use reasoning::{ContextView, ReasoningStep, FALLBACK_MESSAGE};
pub use supervisor::{Expert, SupervisorStep};
pub use tool::ToolStep;
