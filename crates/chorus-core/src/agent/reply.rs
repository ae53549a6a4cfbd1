//! Reply dispatch: triggers, the ordered strategy table, and the two
//! built-in strategies (human input gating and model inference).
//!
//! Entries default to front insertion, so later registrations are tried
//! first. A specialised capability registered after construction intercepts
//! before the built-ins get a chance.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::agent::core::{Agent, AgentId};
use crate::agent::state::HumanInputMode;
use crate::ai::types::CompletionRequest;
use crate::error::{ChorusError, Result};
use crate::message::{
    FunctionExecutionResult, Message, Role, ToolCall, EXIT_SENTINEL,
};

/// Who a reply entry responds to.
#[derive(Clone)]
pub enum ReplyTrigger {
    /// Matches only when no sender is given.
    SenderAbsent,
    /// Matches the sender's display name exactly. Evaluating this against a
    /// missing sender is an error, not a non-match.
    ByName(String),
    /// Matches the sender's kind tag (`Agent::kind`).
    ByKind(String),
    ByIdentity(AgentId),
    ByPredicate(Arc<dyn Fn(Option<&Agent>) -> bool + Send + Sync>),
    /// Logical OR, short-circuiting.
    AnyOf(Vec<ReplyTrigger>),
}

impl ReplyTrigger {
    /// A trigger that matches every dispatch, sender or not.
    pub fn always() -> Self {
        ReplyTrigger::ByPredicate(Arc::new(|_| true))
    }

    pub fn matches(&self, sender: Option<&Agent>) -> Result<bool> {
        match self {
            ReplyTrigger::SenderAbsent => Ok(sender.is_none()),
            ReplyTrigger::ByName(name) => match sender {
                Some(agent) => Ok(agent.name() == name),
                None => Err(ChorusError::SenderRequired),
            },
            ReplyTrigger::ByKind(kind) => {
                Ok(sender.map(|agent| agent.kind() == kind).unwrap_or(false))
            }
            ReplyTrigger::ByIdentity(id) => {
                Ok(sender.map(|agent| agent.id() == *id).unwrap_or(false))
            }
            ReplyTrigger::ByPredicate(predicate) => Ok(predicate(sender)),
            ReplyTrigger::AnyOf(triggers) => {
                for trigger in triggers {
                    if trigger.matches(sender)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }
}

/// What a strategy produced. `Final` ends dispatch; its messages are the
/// yielded reply sequence (empty means "stop without replying").
pub enum ReplyOutcome {
    Final(Vec<Message>),
    Pass,
}

#[async_trait]
pub trait ReplyStrategy: Send + Sync {
    async fn reply(
        &self,
        agent: &Agent,
        messages: &[Message],
        sender: Option<&Agent>,
    ) -> Result<ReplyOutcome>;
}

#[derive(Clone)]
pub struct ReplyEntry {
    pub trigger: ReplyTrigger,
    pub strategy: Arc<dyn ReplyStrategy>,
}

/// Ordered reply table. Evaluation order is list order; the first entry
/// whose trigger matches and whose strategy is final wins.
#[derive(Default, Clone)]
pub struct ReplyDispatcher {
    entries: Vec<ReplyEntry>,
}

impl ReplyDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert at the front: last registered, first tried.
    pub fn register(&mut self, trigger: ReplyTrigger, strategy: Arc<dyn ReplyStrategy>) {
        self.register_at(0, trigger, strategy);
    }

    pub fn register_at(
        &mut self,
        position: usize,
        trigger: ReplyTrigger,
        strategy: Arc<dyn ReplyStrategy>,
    ) {
        let position = position.min(self.entries.len());
        self.entries.insert(position, ReplyEntry { trigger, strategy });
    }

    /// Snapshot for iteration outside the owning lock.
    pub fn entries(&self) -> Vec<ReplyEntry> {
        self.entries.clone()
    }
}

/// How a tool-call batch is folded back into a final reply.
#[derive(Debug, Clone)]
pub enum ToolFinishStrategy {
    /// One more inference call over the tool results; the model's follow-up
    /// becomes the final reply.
    Reflect,
    /// Deterministic rendering of each call through a template; no extra
    /// model call. Placeholders: `{tool}`, `{arguments}`, `{result}`.
    Summarize { template: String },
}

pub const DEFAULT_TOOL_SUMMARY_TEMPLATE: &str = "{tool}({arguments}) -> {result}";

impl Default for ToolFinishStrategy {
    fn default() -> Self {
        ToolFinishStrategy::Summarize {
            template: DEFAULT_TOOL_SUMMARY_TEMPLATE.to_string(),
        }
    }
}

pub(crate) fn render_tool_summary(
    template: &str,
    calls: &[ToolCall],
    results: &[FunctionExecutionResult],
) -> String {
    calls
        .iter()
        .zip(results)
        .map(|(call, result)| {
            template
                .replace("{tool}", &call.name)
                .replace("{arguments}", &call.arguments)
                .replace("{result}", &result.content)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Built-in: model inference, with tool execution and finishing.
///
/// An agent without a client passes rather than erroring, so fallback
/// entries further down the table still run.
pub struct LlmReply;

#[async_trait]
impl ReplyStrategy for LlmReply {
    async fn reply(
        &self,
        agent: &Agent,
        messages: &[Message],
        _sender: Option<&Agent>,
    ) -> Result<ReplyOutcome> {
        let Some(facade) = agent.client() else {
            return Ok(ReplyOutcome::Pass);
        };

        let mut conversation = Vec::with_capacity(messages.len() + 1);
        let system = agent.system_message();
        if !system.is_empty() {
            conversation.push(Message::text(Role::System, system));
        }
        conversation.extend_from_slice(messages);

        let mut request = CompletionRequest::new(conversation.clone());
        if !agent.tools().is_empty() {
            request = request.with_tools(agent.tools().schemas());
        }
        let result = facade.create(request).await?;

        if let Some(calls) = result.tool_calls() {
            let calls = calls.to_vec();
            debug!(agent = %agent.name(), count = calls.len(), "model requested tool calls");
            let call_message = Message::tool_calls(calls.clone());
            let results = agent
                .tool_executor()
                .execute_batch(&calls, agent.tools(), agent.cancellation())
                .await;
            let results_message = Message::tool_results(results.clone());

            let final_text = match agent.tool_finish() {
                ToolFinishStrategy::Reflect => {
                    let mut followup = conversation;
                    followup.push(call_message.clone());
                    followup.push(results_message.clone());
                    let reflection = facade.create(CompletionRequest::new(followup)).await?;
                    reflection.text().unwrap_or_default().to_string()
                }
                ToolFinishStrategy::Summarize { template } => {
                    render_tool_summary(&template, &calls, &results)
                }
            };

            return Ok(ReplyOutcome::Final(vec![
                call_message,
                results_message,
                Message::assistant(final_text),
            ]));
        }

        let text = result.text().unwrap_or_default().to_string();
        Ok(ReplyOutcome::Final(vec![Message::assistant(text)]))
    }
}

/// Built-in: termination check, human input solicitation, and auto-reply
/// counter management. Always tried before [`LlmReply`].
pub struct HumanInputReply;

#[async_trait]
impl ReplyStrategy for HumanInputReply {
    async fn reply(
        &self,
        agent: &Agent,
        messages: &[Message],
        sender: Option<&Agent>,
    ) -> Result<ReplyOutcome> {
        let is_termination = messages
            .last()
            .map(|last| agent.is_termination(last))
            .unwrap_or(false);
        let mode = agent.with_state(|state| state.human_input_mode);

        match mode {
            HumanInputMode::Never => {
                let exhausted = match sender {
                    Some(peer) => agent.with_state(|state| state.auto_reply_exhausted(peer.id())),
                    None => false,
                };
                if is_termination || exhausted {
                    if let Some(peer) = sender {
                        agent.with_state(|state| state.terminate_peer(peer.id()));
                    }
                    return Ok(ReplyOutcome::Final(Vec::new()));
                }
                if let Some(peer) = sender {
                    agent.with_state(|state| state.increment_auto_reply(peer.id()));
                }
                Ok(ReplyOutcome::Pass)
            }
            HumanInputMode::Always => {
                let peer_name = sender
                    .map(|peer| peer.name().to_string())
                    .unwrap_or_else(|| "the conversation".to_string());
                let prompt = format!(
                    "Provide feedback to {peer_name}. Press enter to auto-reply, \
                     or type '{EXIT_SENTINEL}' to end the conversation: "
                );
                let input = agent.human_input().get_input(&prompt).await;
                agent.with_state(|state| state.record_human_input(&input));

                if input == EXIT_SENTINEL || (input.is_empty() && is_termination) {
                    if let Some(peer) = sender {
                        agent.with_state(|state| state.terminate_peer(peer.id()));
                    }
                    return Ok(ReplyOutcome::Final(Vec::new()));
                }
                if input.is_empty() {
                    if let Some(peer) = sender {
                        agent.with_state(|state| state.increment_auto_reply(peer.id()));
                    }
                    return Ok(ReplyOutcome::Pass);
                }
                if let Some(peer) = sender {
                    agent.with_state(|state| state.reset_auto_reply(peer.id()));
                }
                Ok(ReplyOutcome::Final(vec![Message::user(input)]))
            }
        }
    }
}
