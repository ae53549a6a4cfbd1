//! Per-agent conversational state: auto-reply counters, terminated peers,
//! reply-at-receive defaults, and the human-input transcript.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::agent::core::AgentId;

/// Whether a human is consulted before each auto reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanInputMode {
    Always,
    #[default]
    Never,
}

#[derive(Debug)]
pub struct AgentState {
    pub human_input_mode: HumanInputMode,
    /// `None` means unlimited; `Some(0)` defers on the very first reply.
    pub max_consecutive_auto_reply: Option<u32>,
    consecutive_auto_reply: HashMap<AgentId, u32>,
    /// Monotonic: once a peer lands here the relationship stays closed.
    terminated_peers: HashSet<AgentId>,
    reply_at_receive: HashMap<AgentId, bool>,
    reply_at_receive_default: bool,
    human_input_log: Vec<String>,
}

impl AgentState {
    pub fn new(
        human_input_mode: HumanInputMode,
        max_consecutive_auto_reply: Option<u32>,
        reply_at_receive_default: bool,
    ) -> Self {
        Self {
            human_input_mode,
            max_consecutive_auto_reply,
            consecutive_auto_reply: HashMap::new(),
            terminated_peers: HashSet::new(),
            reply_at_receive: HashMap::new(),
            reply_at_receive_default,
            human_input_log: Vec::new(),
        }
    }

    pub fn auto_reply_exhausted(&self, peer: AgentId) -> bool {
        match self.max_consecutive_auto_reply {
            Some(max) => self.consecutive_auto_reply.get(&peer).copied().unwrap_or(0) >= max,
            None => false,
        }
    }

    pub fn increment_auto_reply(&mut self, peer: AgentId) {
        *self.consecutive_auto_reply.entry(peer).or_insert(0) += 1;
    }

    pub fn reset_auto_reply(&mut self, peer: AgentId) {
        self.consecutive_auto_reply.insert(peer, 0);
    }

    pub fn reset_all_auto_replies(&mut self) {
        self.consecutive_auto_reply.clear();
    }

    pub fn terminate_peer(&mut self, peer: AgentId) {
        self.terminated_peers.insert(peer);
    }

    pub fn is_terminated(&self, peer: AgentId) -> bool {
        self.terminated_peers.contains(&peer)
    }

    pub fn set_reply_at_receive(&mut self, peer: AgentId, value: bool) {
        self.reply_at_receive.insert(peer, value);
    }

    pub fn reply_at_receive(&self, peer: AgentId) -> bool {
        self.reply_at_receive
            .get(&peer)
            .copied()
            .unwrap_or(self.reply_at_receive_default)
    }

    pub fn record_human_input(&mut self, input: &str) {
        self.human_input_log.push(input.to_string());
    }

    pub fn human_input_log(&self) -> Vec<String> {
        self.human_input_log.clone()
    }
}
