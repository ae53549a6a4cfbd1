//! Fixed agent-to-agent relay.

use async_trait::async_trait;
use tracing::debug;

use crate::agent::core::Agent;
use crate::components::{Component, ComponentOutcome};
use crate::error::{ChorusError, Result};
use crate::message::Message;

/// Runs its agents in list order: each agent's reply becomes the next
/// agent's input. An agent that declines to reply passes the message along
/// unchanged.
pub struct SequentialComponent {
    name: String,
    agents: Vec<Agent>,
}

impl SequentialComponent {
    pub fn new(name: impl Into<String>, agents: Vec<Agent>) -> Result<Self> {
        if agents.is_empty() {
            return Err(ChorusError::InvalidConfig(
                "a sequence needs at least one agent".into(),
            ));
        }
        Ok(Self {
            name: name.into(),
            agents,
        })
    }

    pub(crate) async fn run_pass(
        &self,
        mut message: Message,
        sender: &Agent,
    ) -> Result<(Agent, Message)> {
        let mut speaker = sender.clone();
        for agent in &self.agents {
            speaker
                .send(message.clone(), agent, Some(false), true)
                .await?;
            let replies = agent
                .generate_reply(agent.history_with(speaker.id()), Some(&speaker))
                .await?;
            if let Some(last) = replies.into_iter().last() {
                message = last;
            } else {
                debug!(agent = %agent.name(), "no reply, passing message through");
            }
            speaker = agent.clone();
        }
        Ok((speaker, message))
    }
}

#[async_trait]
impl Component for SequentialComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, message: Message, sender: &Agent) -> Result<ComponentOutcome> {
        let (speaker, message) = self.run_pass(message, sender).await?;
        Ok(ComponentOutcome {
            speaker,
            message,
            next: None,
        })
    }
}
