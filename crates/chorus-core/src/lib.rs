//! Multi-agent orchestration runtime.
//!
//! Agents exchange structured messages through a hook pipeline and a
//! prioritized reply-dispatch table, execute model-requested tool calls, and
//! take turns under graph-constrained group coordination. Model providers,
//! memory backends, and tools plug in behind traits; the crate owns the
//! runtime contract between them.
//!
//! The conversation engine is single-threaded and cooperative: one reply at
//! a time per agent, with suspension only at the model, tool, and
//! human-input boundaries.

pub mod agent;
pub mod ai;
pub mod components;
pub mod error;
pub mod group;
pub mod memory;
pub mod message;
pub mod tools;

pub use agent::{
    Agent, AgentBuilder, AgentId, ChatResult, HumanInputMode, HumanInputProvider, ReplyOutcome,
    ReplyStrategy, ReplyTrigger, ScriptedInput, SummaryMethod, ToolFinishStrategy,
};
pub use ai::{
    CompletionRequest, CompletionResult, ModelClient, ModelClientFacade, ProviderConfig,
    UsageSummary,
};
pub use components::{Component, CycleComponent, Pipeline, SequentialComponent};
pub use error::{ChorusError, Result};
pub use group::{GroupChat, GroupCoordinator, SpeakerSelection, TransitionGraph};
pub use memory::{Memory, MemoryRecallHook, MemoryRecord};
pub use message::{
    ContentPart, FunctionExecutionResult, Message, MessageContent, Role, ToolCall,
    EXIT_SENTINEL, TERMINATE_SENTINEL,
};
pub use tools::{Tool, ToolExecutor, ToolSet};
