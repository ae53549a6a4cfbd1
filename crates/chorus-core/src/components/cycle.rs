//! Bounded repetition with an optional router-driven early exit.

use async_trait::async_trait;
use tracing::debug;

use crate::agent::core::Agent;
use crate::components::sequence::SequentialComponent;
use crate::components::{Component, ComponentOutcome};
use crate::error::{ChorusError, Result};
use crate::message::{Message, TERMINATE_SENTINEL};

/// Repeats a sequence of agents for a fixed number of passes. After each
/// pass an optional router agent judges the current message; a termination
/// verdict exits the cycle early. Exhausting all passes falls through to the
/// configured default component.
pub struct CycleComponent {
    name: String,
    sequence: SequentialComponent,
    repetitions: usize,
    router: Option<Agent>,
    default_next: Option<String>,
}

impl CycleComponent {
    pub fn new(
        name: impl Into<String>,
        agents: Vec<Agent>,
        repetitions: usize,
    ) -> Result<Self> {
        let name = name.into();
        let sequence = SequentialComponent::new(format!("{name}-pass"), agents)?;
        if repetitions == 0 {
            return Err(ChorusError::InvalidConfig(
                "a cycle needs at least one repetition".into(),
            ));
        }
        Ok(Self {
            name,
            sequence,
            repetitions,
            router: None,
            default_next: None,
        })
    }

    /// A router without a default component has no defined fallthrough.
    pub fn with_router(mut self, router: Agent, default_next: impl Into<String>) -> Self {
        self.router = Some(router);
        self.default_next = Some(default_next.into());
        self
    }

    pub fn with_default_next(mut self, next: impl Into<String>) -> Self {
        self.default_next = Some(next.into());
        self
    }

    async fn router_says_stop(&self, router: &Agent, message: &Message) -> Result<bool> {
        let replies = router.generate_reply(vec![message.clone()], None).await?;
        Ok(replies
            .last()
            .and_then(|reply| reply.text_content())
            .map(|text| text.contains(TERMINATE_SENTINEL))
            .unwrap_or(false))
    }
}

#[async_trait]
impl Component for CycleComponent {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, message: Message, sender: &Agent) -> Result<ComponentOutcome> {
        let mut speaker = sender.clone();
        let mut message = message;
        for pass in 0..self.repetitions {
            let (new_speaker, new_message) = self.sequence.run_pass(message, &speaker).await?;
            speaker = new_speaker;
            message = new_message;

            if let Some(router) = &self.router {
                if self.router_says_stop(router, &message).await? {
                    debug!(cycle = %self.name, pass, "router ended the cycle early");
                    return Ok(ComponentOutcome {
                        speaker,
                        message,
                        next: None,
                    });
                }
            }
        }
        Ok(ComponentOutcome {
            speaker,
            message,
            next: self.default_next.clone(),
        })
    }
}
