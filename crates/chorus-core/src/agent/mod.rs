//! The agent: identity, histories, hooks, reply dispatch, and the
//! termination/human-input state machine.

pub mod core;
pub mod hooks;
pub mod human;
pub mod reply;
pub mod state;

pub use core::{
    truncate_history, Agent, AgentBuilder, AgentId, ChatResult, SummaryMethod,
    TerminationPredicate, DEFAULT_SUMMARY_PROMPT,
};
pub use hooks::{
    BatchHookPoint, BatchTransformHook, HookChain, MessageHookPoint, MessageTransformHook,
};
pub use human::{HumanInputProvider, NoHumanInput, ScriptedInput};
pub use reply::{
    HumanInputReply, LlmReply, ReplyDispatcher, ReplyEntry, ReplyOutcome, ReplyStrategy,
    ReplyTrigger, ToolFinishStrategy, DEFAULT_TOOL_SUMMARY_TEMPLATE,
};
pub use state::{AgentState, HumanInputMode};
