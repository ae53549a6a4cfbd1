//! Multi-agent turn-taking: membership and transition graphs, the round
//! loop, and the in-conversation history-clearing command.

pub mod chat;
pub mod clear_history;
pub mod coordinator;

pub use chat::{GroupChat, GroupChatBuilder, SpeakerSelection, TransitionGraph};
pub use clear_history::{parse_clear_history, ClearHistoryCommand};
pub use coordinator::GroupCoordinator;
