//! Human input providers.
//!
//! Console prompting lives outside this crate; the runtime only needs a way
//! to ask for a line of text. `ScriptedInput` drives tests and batch runs.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::message::EXIT_SENTINEL;

#[async_trait]
pub trait HumanInputProvider: Send + Sync {
    /// Ask the human for input. An empty string means "no input, auto-reply".
    async fn get_input(&self, prompt: &str) -> String;
}

/// Provider for agents that never consult a human.
pub struct NoHumanInput;

#[async_trait]
impl HumanInputProvider for NoHumanInput {
    async fn get_input(&self, _prompt: &str) -> String {
        String::new()
    }
}

/// Replays a fixed list of answers, then exits.
pub struct ScriptedInput {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedInput {
    pub fn new(replies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }
}

#[async_trait]
impl HumanInputProvider for ScriptedInput {
    async fn get_input(&self, _prompt: &str) -> String {
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| EXIT_SENTINEL.to_string())
    }
}
