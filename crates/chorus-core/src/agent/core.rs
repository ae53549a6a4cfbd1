//! The conversational agent: per-peer histories, hook chain, reply
//! dispatcher, and the termination/human-input state machine.
//!
//! `Agent` is a cheap clone-able handle over shared inner state. Locks guard
//! the mutable pieces and are never held across an await; snapshots are
//! cloned out before any async work.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::hooks::{
    run_batch_hooks, run_message_hooks, BatchHookPoint, BatchTransformHook, HookChain,
    MessageHookPoint, MessageTransformHook,
};
use crate::agent::human::{HumanInputProvider, NoHumanInput};
use crate::agent::reply::{
    HumanInputReply, LlmReply, ReplyDispatcher, ReplyOutcome, ReplyStrategy, ReplyTrigger,
    ToolFinishStrategy,
};
use crate::agent::state::{AgentState, HumanInputMode};
use crate::ai::facade::{gather_usage, ModelClientFacade};
use crate::ai::types::{CompletionRequest, UsageSummary};
use crate::error::{ChorusError, Result};
use crate::message::{Message, Role, EXIT_SENTINEL, TERMINATE_SENTINEL};
use crate::tools::{Tool, ToolExecutor, ToolSet};

/// Stable agent identity. Display goes through the name; equality and
/// history keys go through this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(Uuid);

impl AgentId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub type TerminationPredicate = Arc<dyn Fn(&Message) -> bool + Send + Sync>;

struct AgentInner {
    id: AgentId,
    name: String,
    description: String,
    kind: String,
    system_message: String,
    client: Option<Arc<ModelClientFacade>>,
    tools: ToolSet,
    tool_executor: ToolExecutor,
    tool_finish: ToolFinishStrategy,
    default_auto_reply: Option<String>,
    termination: Option<TerminationPredicate>,
    human_input: Arc<dyn HumanInputProvider>,
    hooks: RwLock<HookChain>,
    dispatcher: RwLock<ReplyDispatcher>,
    state: Mutex<AgentState>,
    histories: Mutex<HashMap<AgentId, Vec<Message>>>,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

impl PartialEq for Agent {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Agent {}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish()
    }
}

impl Agent {
    pub fn builder(name: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(name)
    }

    pub fn id(&self) -> AgentId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn description(&self) -> &str {
        &self.inner.description
    }

    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    pub fn system_message(&self) -> &str {
        &self.inner.system_message
    }

    pub fn client(&self) -> Option<&ModelClientFacade> {
        self.inner.client.as_deref()
    }

    pub fn tools(&self) -> &ToolSet {
        &self.inner.tools
    }

    pub fn tool_executor(&self) -> &ToolExecutor {
        &self.inner.tool_executor
    }

    pub fn tool_finish(&self) -> ToolFinishStrategy {
        self.inner.tool_finish.clone()
    }

    pub fn human_input(&self) -> &Arc<dyn HumanInputProvider> {
        &self.inner.human_input
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.inner.cancel
    }

    /// Request cooperative cancellation of in-flight tool work.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
    }

    pub fn with_state<R>(&self, f: impl FnOnce(&mut AgentState) -> R) -> R {
        f(&mut self.inner.state.lock())
    }

    pub fn is_termination(&self, message: &Message) -> bool {
        match &self.inner.termination {
            Some(predicate) => predicate(message),
            None => message.is_terminate(),
        }
    }

    /// Register a reply entry at the front of the table: last registered,
    /// first tried.
    pub fn register_reply(&self, trigger: ReplyTrigger, strategy: Arc<dyn ReplyStrategy>) {
        self.inner.dispatcher.write().register(trigger, strategy);
    }

    pub fn register_reply_at(
        &self,
        position: usize,
        trigger: ReplyTrigger,
        strategy: Arc<dyn ReplyStrategy>,
    ) {
        self.inner
            .dispatcher
            .write()
            .register_at(position, trigger, strategy);
    }

    pub fn register_hook(
        &self,
        point: MessageHookPoint,
        hook: Arc<dyn MessageTransformHook>,
    ) -> Result<()> {
        self.inner.hooks.write().register_message(point, hook)
    }

    pub fn register_batch_hook(
        &self,
        point: BatchHookPoint,
        hook: Arc<dyn BatchTransformHook>,
    ) -> Result<()> {
        self.inner.hooks.write().register_batch(point, hook)
    }

    /// The conversation with one peer, oldest first.
    pub fn history_with(&self, peer: AgentId) -> Vec<Message> {
        self.inner
            .histories
            .lock()
            .get(&peer)
            .cloned()
            .unwrap_or_default()
    }

    pub fn history_len(&self, peer: AgentId) -> usize {
        self.inner
            .histories
            .lock()
            .get(&peer)
            .map(|msgs| msgs.len())
            .unwrap_or(0)
    }

    /// Last message exchanged with `peer`, or with the only known peer when
    /// `peer` is `None`. Ambiguous without a peer once several conversations
    /// exist.
    pub fn last_message(&self, peer: Option<&Agent>) -> Result<Option<Message>> {
        let histories = self.inner.histories.lock();
        match peer {
            Some(agent) => match histories.get(&agent.id()) {
                Some(messages) => Ok(messages.last().cloned()),
                None => Err(ChorusError::UnknownPeer(agent.name().to_string())),
            },
            None => {
                if histories.len() > 1 {
                    return Err(ChorusError::InvalidConfig(
                        "multiple conversations exist, specify a peer".into(),
                    ));
                }
                Ok(histories
                    .values()
                    .next()
                    .and_then(|messages| messages.last().cloned()))
            }
        }
    }

    /// Clear stored history, fully or keeping the last `keep_last` messages.
    /// Clearing a conversation also reopens its auto-reply budget.
    pub fn clear_history(&self, peer: Option<AgentId>, keep_last: Option<usize>) {
        {
            let mut histories = self.inner.histories.lock();
            match peer {
                Some(id) => {
                    if let Some(messages) = histories.get_mut(&id) {
                        truncate_history(messages, keep_last);
                    }
                }
                None => {
                    for messages in histories.values_mut() {
                        truncate_history(messages, keep_last);
                    }
                }
            }
        }
        let mut state = self.inner.state.lock();
        match peer {
            Some(id) => state.reset_auto_reply(id),
            None => state.reset_all_auto_replies(),
        }
    }

    fn append_history(&self, peer: &Agent, mut message: Message, as_sender: bool) -> Result<()> {
        message.validate()?;
        if message.carried_tool_results().is_some() {
            message.role = Role::Tool;
        } else if message.role != Role::Tool {
            message.role = if as_sender { Role::Assistant } else { Role::User };
        }
        if message.name.is_none() {
            let speaker = if as_sender { self.name() } else { peer.name() };
            message.name = Some(speaker.to_string());
        }
        self.inner
            .histories
            .lock()
            .entry(peer.id())
            .or_default()
            .push(message);
        Ok(())
    }

    /// Deliver a message: `before_send` hooks, own-history append, then the
    /// recipient's `receive`.
    pub fn send<'a>(
        &'a self,
        message: Message,
        recipient: &'a Agent,
        request_reply: Option<bool>,
        silent: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let hooks = self
                .inner
                .hooks
                .read()
                .message_hooks(MessageHookPoint::BeforeSend);
            let message = if hooks.is_empty() {
                message
            } else {
                run_message_hooks(&hooks, message).await
            };
            message.validate()?;
            self.append_history(recipient, message.clone(), true)?;
            if !silent {
                info!(from = %self.name(), to = %recipient.name(), "message sent");
            }
            recipient.receive(message, self, request_reply, silent).await
        })
    }

    /// Accept a message and, unless suppressed, generate and send replies
    /// back to the sender.
    pub fn receive<'a>(
        &'a self,
        message: Message,
        sender: &'a Agent,
        request_reply: Option<bool>,
        silent: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.append_history(sender, message, false)?;
            if !silent {
                info!(agent = %self.name(), from = %sender.name(), "message received");
            }

            let should_reply = match request_reply {
                Some(value) => value,
                None => self.with_state(|state| state.reply_at_receive(sender.id())),
            };
            if !should_reply || self.with_state(|state| state.is_terminated(sender.id())) {
                return Ok(());
            }

            let history = self.history_with(sender.id());
            let replies = self.generate_reply(history, Some(sender)).await?;
            let count = replies.len();
            for (index, reply) in replies.into_iter().enumerate() {
                // Intermediate events (tool calls and their results) must not
                // trigger a counter-reply; only the final one continues the
                // exchange.
                let reply_flag = if index + 1 == count { None } else { Some(false) };
                self.send(reply, sender, reply_flag, silent).await?;
            }
            Ok(())
        })
    }

    /// Produce this agent's reply sequence for a conversation snapshot.
    ///
    /// Pipeline: `on_receive_last` hooks over the last message (skipped for
    /// routed, non-textual, or exit messages), then the batch hook points,
    /// then the reply table in order. The first final entry wins; with no
    /// final entry the configured default auto reply is produced.
    pub async fn generate_reply(
        &self,
        mut messages: Vec<Message>,
        sender: Option<&Agent>,
    ) -> Result<Vec<Message>> {
        let skip_last_hooks = match messages.last() {
            Some(last) => {
                last.context.is_some()
                    || last.text_content().is_none()
                    || last.text_content() == Some(EXIT_SENTINEL)
            }
            None => true,
        };
        if !skip_last_hooks {
            let hooks = self
                .inner
                .hooks
                .read()
                .message_hooks(MessageHookPoint::OnReceiveLast);
            if !hooks.is_empty() {
                if let Some(last) = messages.pop() {
                    let transformed = run_message_hooks(&hooks, last).await;
                    messages.push(transformed);
                }
            }
        }

        for point in [BatchHookPoint::BeforeReplyAll, BatchHookPoint::BeforeReplyShortTerm] {
            let hooks = self.inner.hooks.read().batch_hooks(point);
            if !hooks.is_empty() {
                messages = run_batch_hooks(&hooks, messages).await;
            }
        }

        let entries = self.inner.dispatcher.read().entries();
        for entry in entries {
            if entry.trigger.matches(sender)? {
                match entry.strategy.reply(self, &messages, sender).await? {
                    ReplyOutcome::Final(replies) => return Ok(replies),
                    ReplyOutcome::Pass => continue,
                }
            }
        }

        match &self.inner.default_auto_reply {
            Some(text) if !text.is_empty() => Ok(vec![Message::assistant(text.clone())]),
            _ => Ok(Vec::new()),
        }
    }

    fn prepare_chat(&self, peer: &Agent, clear_history: bool) {
        self.with_state(|state| {
            state.set_reply_at_receive(peer.id(), true);
            state.reset_auto_reply(peer.id());
        });
        if clear_history {
            self.clear_history(Some(peer.id()), None);
        }
    }

    /// Open a two-agent conversation and drive it to completion.
    pub async fn initiate_chat(
        &self,
        recipient: &Agent,
        message: Message,
        clear_history: bool,
        summary: SummaryMethod,
    ) -> Result<ChatResult> {
        self.prepare_chat(recipient, clear_history);
        recipient.prepare_chat(self, clear_history);
        debug!(from = %self.name(), to = %recipient.name(), "chat initiated");

        self.send(message, recipient, None, false).await?;

        let transcript = self.history_with(recipient.id());
        let summary_text = summarize_transcript(
            &transcript,
            &summary,
            self.client().or_else(|| recipient.client()),
        )
        .await?;
        let (total_usage, actual_usage) = gather_usage(
            [self.client(), recipient.client()].into_iter().flatten(),
        );
        let mut human_input = self.with_state(|state| state.human_input_log());
        human_input.extend(recipient.with_state(|state| state.human_input_log()));

        Ok(ChatResult {
            transcript,
            summary: summary_text,
            total_usage,
            actual_usage,
            human_input,
        })
    }
}

/// How a finished conversation is summarized.
#[derive(Debug, Clone, Default)]
pub enum SummaryMethod {
    /// The final message's text with the termination sentinel stripped.
    #[default]
    LastMessage,
    /// One extra inference over the transcript with a summarizing prompt.
    ReflectionWithLlm { prompt: String },
}

pub const DEFAULT_SUMMARY_PROMPT: &str =
    "Summarize the takeaway from the conversation. Do not add any introductory phrases.";

/// Outcome of a completed conversation.
#[derive(Debug, Clone)]
pub struct ChatResult {
    pub transcript: Vec<Message>,
    pub summary: String,
    pub total_usage: UsageSummary,
    pub actual_usage: UsageSummary,
    pub human_input: Vec<String>,
}

pub(crate) fn strip_termination_sentinel(text: &str) -> String {
    text.trim()
        .trim_end_matches(TERMINATE_SENTINEL)
        .trim()
        .to_string()
}

pub(crate) async fn summarize_transcript(
    transcript: &[Message],
    method: &SummaryMethod,
    facade: Option<&ModelClientFacade>,
) -> Result<String> {
    match method {
        SummaryMethod::LastMessage => Ok(transcript
            .last()
            .and_then(|message| message.text_content())
            .map(strip_termination_sentinel)
            .unwrap_or_default()),
        SummaryMethod::ReflectionWithLlm { prompt } => {
            let Some(facade) = facade else {
                return Err(ChorusError::InvalidConfig(
                    "reflection summary requires a model client".into(),
                ));
            };
            let mut messages = transcript.to_vec();
            messages.push(Message::text(Role::System, prompt.clone()));
            let result = facade.create(CompletionRequest::new(messages)).await?;
            Ok(strip_termination_sentinel(result.text().unwrap_or_default()))
        }
    }
}

/// Drop everything before the last `keep_last` messages. When the cut would
/// orphan a tool-result message from its tool-call message, one extra
/// message is kept.
pub fn truncate_history(messages: &mut Vec<Message>, keep_last: Option<usize>) {
    let Some(keep) = keep_last else {
        messages.clear();
        return;
    };
    if keep >= messages.len() {
        return;
    }
    let mut start = messages.len() - keep;
    if start > 0 && messages[start].carried_tool_results().is_some() {
        start -= 1;
    }
    messages.drain(..start);
}

pub struct AgentBuilder {
    name: String,
    description: String,
    kind: String,
    system_message: String,
    client: Option<Arc<ModelClientFacade>>,
    tools: Vec<Arc<dyn Tool>>,
    tool_finish: ToolFinishStrategy,
    tool_timeout: Option<Duration>,
    default_auto_reply: Option<String>,
    max_consecutive_auto_reply: Option<u32>,
    human_input_mode: HumanInputMode,
    human_input: Option<Arc<dyn HumanInputProvider>>,
    termination: Option<TerminationPredicate>,
    reply_at_receive_default: bool,
}

impl AgentBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind: "agent".into(),
            system_message: String::new(),
            client: None,
            tools: Vec::new(),
            tool_finish: ToolFinishStrategy::default(),
            tool_timeout: None,
            default_auto_reply: None,
            max_consecutive_auto_reply: None,
            human_input_mode: HumanInputMode::Never,
            human_input: None,
            termination: None,
            reply_at_receive_default: true,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    pub fn system_message(mut self, system_message: impl Into<String>) -> Self {
        self.system_message = system_message.into();
        self
    }

    pub fn client(mut self, client: Arc<ModelClientFacade>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn tool_finish(mut self, strategy: ToolFinishStrategy) -> Self {
        self.tool_finish = strategy;
        self
    }

    pub fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = Some(timeout);
        self
    }

    pub fn default_auto_reply(mut self, reply: impl Into<String>) -> Self {
        self.default_auto_reply = Some(reply.into());
        self
    }

    /// `Some(0)` defers on the very first auto reply; `None` is unlimited.
    pub fn max_consecutive_auto_reply(mut self, max: Option<u32>) -> Self {
        self.max_consecutive_auto_reply = max;
        self
    }

    pub fn human_input_mode(mut self, mode: HumanInputMode) -> Self {
        self.human_input_mode = mode;
        self
    }

    pub fn human_input(mut self, provider: Arc<dyn HumanInputProvider>) -> Self {
        self.human_input = Some(provider);
        self
    }

    pub fn termination(mut self, predicate: TerminationPredicate) -> Self {
        self.termination = Some(predicate);
        self
    }

    pub fn reply_at_receive(mut self, default: bool) -> Self {
        self.reply_at_receive_default = default;
        self
    }

    pub fn build(self) -> Result<Agent> {
        if self.name.trim().is_empty() {
            return Err(ChorusError::InvalidConfig("agent name is empty".into()));
        }
        if matches!(self.tool_finish, ToolFinishStrategy::Reflect) && self.client.is_none() {
            return Err(ChorusError::InvalidConfig(
                "reflect-on-tool-use requires a model client".into(),
            ));
        }
        let tools = ToolSet::from_tools(self.tools)?;
        if !tools.is_empty() && self.client.is_none() {
            warn!(agent = %self.name, "tools configured without a model client");
        }

        let mut dispatcher = ReplyDispatcher::new();
        // Front insertion: the human-input gate ends up first in the table.
        dispatcher.register(ReplyTrigger::always(), Arc::new(LlmReply));
        dispatcher.register(ReplyTrigger::always(), Arc::new(HumanInputReply));

        let tool_executor = match self.tool_timeout {
            Some(timeout) => ToolExecutor::with_timeout(timeout),
            None => ToolExecutor::new(),
        };

        Ok(Agent {
            inner: Arc::new(AgentInner {
                id: AgentId::new(),
                name: self.name,
                description: self.description,
                kind: self.kind,
                system_message: self.system_message,
                client: self.client,
                tools,
                tool_executor,
                tool_finish: self.tool_finish,
                default_auto_reply: self.default_auto_reply,
                termination: self.termination,
                human_input: self
                    .human_input
                    .unwrap_or_else(|| Arc::new(NoHumanInput)),
                hooks: RwLock::new(HookChain::new()),
                dispatcher: RwLock::new(ReplyDispatcher::new()),
                state: Mutex::new(AgentState::new(
                    self.human_input_mode,
                    self.max_consecutive_auto_reply,
                    self.reply_at_receive_default,
                )),
                histories: Mutex::new(HashMap::new()),
                cancel: CancellationToken::new(),
            }),
        }
        .with_dispatcher(dispatcher))
    }
}

impl Agent {
    fn with_dispatcher(self, dispatcher: ReplyDispatcher) -> Self {
        *self.inner.dispatcher.write() = dispatcher;
        self
    }
}
