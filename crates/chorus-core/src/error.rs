//! Error taxonomy for the runtime.
//!
//! Construction-time validation failures (bad provider config, invalid
//! transition graphs, duplicate hooks) are fatal and surface immediately.
//! Per-message and per-tool-call failures are recovered locally: tool errors
//! are folded into `FunctionExecutionResult { is_error: true }` and never
//! pass through this type.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChorusError>;

#[derive(Debug, Error)]
pub enum ChorusError {
    /// A message with neither content nor tool calls/results.
    #[error("message has no content and no tool call or tool result fields")]
    InvalidMessage,

    /// The same hook registered twice at the same lifecycle point.
    #[error("hook already registered at lifecycle point '{point}'")]
    DuplicateHook { point: &'static str },

    /// A name trigger was evaluated against a missing sender.
    #[error("reply trigger requires a sender but none was provided")]
    SenderRequired,

    /// The transition graph produced no candidate speakers.
    #[error("no eligible speaker can follow '{speaker}'")]
    NoEligibleSpeaker { speaker: String },

    /// A pipeline edge resolved to a label or node outside the graph.
    #[error("invalid route: {0}")]
    InvalidRoute(String),

    /// Every configured provider timed out.
    #[error("model call timed out on all configured providers")]
    ProviderTimeout,

    /// The last configured provider failed with a non-timeout error.
    #[error("model provider error: {0}")]
    Provider(String),

    /// The provider rejected the request on policy grounds; never retried.
    #[error("content filter rejected the request: {0}")]
    ContentFilterRejected(String),

    /// Construction-time configuration error.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation referenced a peer with no conversation history.
    #[error("no conversation with peer '{0}'")]
    UnknownPeer(String),
}
