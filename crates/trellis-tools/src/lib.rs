pub mod builtin;
pub mod guard;
pub mod rag;
pub mod registry;
pub mod warehouse;

pub use guard::{CallGuard, ReadOnlySqlGuard};
pub use rag::{RagClient, SearchHit};
pub use registry::ToolRegistry;
pub use warehouse::{QueryOutcome, WarehouseClient};
