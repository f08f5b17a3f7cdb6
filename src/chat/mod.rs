pub mod context;
pub mod orchestrator;
pub mod split;

pub use context::{RagMode, RequestContext, SplitMode};
pub use orchestrator::{ChatOrchestrator, ChatResponse, ChatTurnRequest};
