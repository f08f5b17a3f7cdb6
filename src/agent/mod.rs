pub mod assistant;
pub mod context;
pub mod executor;
pub mod factory;
pub mod group;
pub mod policy;
pub mod termination;
pub mod tools;

pub use assistant::{AgentMessage, AssistantAgent, ChatAgent, CodeExecutorAgent};
pub use context::RunContext;
pub use factory::{AgentFactory, AgentRunRequest, SelectorKind};
pub use group::{GroupChat, GroupChatRun, SpeakerSelection};
pub use policy::ToolPolicy;
pub use termination::{TerminationCondition, TerminationSpec};
pub use tools::{Tool, ToolKind, ToolRegistry, ToolSchema};
