//! Hook chains for the agent message lifecycle.
//!
//! Hooks intercept messages at fixed lifecycle points and transform them in
//! registration order. They operate on transient copies handed through
//! `generate_reply`; a hook never mutates the agent's stored history, so
//! repeated invocations are idempotent with respect to stored state.
//!
//! Two hook shapes exist:
//! - [`MessageTransformHook`] — one message in, one message out
//!   (`before_send`, `on_receive_last`)
//! - [`BatchTransformHook`] — the full message list in and out
//!   (`before_reply_all`, `before_reply_short_term`)

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ChorusError, Result};
use crate::message::Message;

/// Lifecycle points taking a single-message hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageHookPoint {
    /// Runs on the outgoing message before it is appended and delivered.
    BeforeSend,
    /// Runs on the last received message before reply dispatch.
    OnReceiveLast,
}

impl MessageHookPoint {
    fn name(self) -> &'static str {
        match self {
            MessageHookPoint::BeforeSend => "before_send",
            MessageHookPoint::OnReceiveLast => "on_receive_last",
        }
    }
}

/// Lifecycle points taking a whole-conversation hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchHookPoint {
    /// Runs over the full message list before reply dispatch.
    BeforeReplyAll,
    /// Runs over the message list for short-term memory injection.
    BeforeReplyShortTerm,
}

impl BatchHookPoint {
    fn name(self) -> &'static str {
        match self {
            BatchHookPoint::BeforeReplyAll => "before_reply_all",
            BatchHookPoint::BeforeReplyShortTerm => "before_reply_short_term",
        }
    }
}

/// Transforms a single message at a lifecycle point.
#[async_trait]
pub trait MessageTransformHook: Send + Sync {
    async fn transform(&self, message: Message) -> Message;
}

/// Transforms the whole message list at a lifecycle point.
#[async_trait]
pub trait BatchTransformHook: Send + Sync {
    async fn transform(&self, messages: Vec<Message>) -> Vec<Message>;
}

/// Ordered hook lists, one per lifecycle point.
#[derive(Default)]
pub struct HookChain {
    before_send: Vec<Arc<dyn MessageTransformHook>>,
    on_receive_last: Vec<Arc<dyn MessageTransformHook>>,
    before_reply_all: Vec<Arc<dyn BatchTransformHook>>,
    before_reply_short_term: Vec<Arc<dyn BatchTransformHook>>,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a single-message hook. Registering the same hook instance
    /// twice at the same point is a programmer error.
    pub fn register_message(
        &mut self,
        point: MessageHookPoint,
        hook: Arc<dyn MessageTransformHook>,
    ) -> Result<()> {
        let list = match point {
            MessageHookPoint::BeforeSend => &mut self.before_send,
            MessageHookPoint::OnReceiveLast => &mut self.on_receive_last,
        };
        if list.iter().any(|existing| Arc::ptr_eq(existing, &hook)) {
            return Err(ChorusError::DuplicateHook { point: point.name() });
        }
        list.push(hook);
        Ok(())
    }

    /// Register a whole-conversation hook, same duplicate guard.
    pub fn register_batch(
        &mut self,
        point: BatchHookPoint,
        hook: Arc<dyn BatchTransformHook>,
    ) -> Result<()> {
        let list = match point {
            BatchHookPoint::BeforeReplyAll => &mut self.before_reply_all,
            BatchHookPoint::BeforeReplyShortTerm => &mut self.before_reply_short_term,
        };
        if list.iter().any(|existing| Arc::ptr_eq(existing, &hook)) {
            return Err(ChorusError::DuplicateHook { point: point.name() });
        }
        list.push(hook);
        Ok(())
    }

    pub(crate) fn message_hooks(
        &self,
        point: MessageHookPoint,
    ) -> Vec<Arc<dyn MessageTransformHook>> {
        match point {
            MessageHookPoint::BeforeSend => self.before_send.clone(),
            MessageHookPoint::OnReceiveLast => self.on_receive_last.clone(),
        }
    }

    pub(crate) fn batch_hooks(&self, point: BatchHookPoint) -> Vec<Arc<dyn BatchTransformHook>> {
        match point {
            BatchHookPoint::BeforeReplyAll => self.before_reply_all.clone(),
            BatchHookPoint::BeforeReplyShortTerm => self.before_reply_short_term.clone(),
        }
    }

    pub fn is_empty(&self, point: MessageHookPoint) -> bool {
        match point {
            MessageHookPoint::BeforeSend => self.before_send.is_empty(),
            MessageHookPoint::OnReceiveLast => self.on_receive_last.is_empty(),
        }
    }
}

/// Apply each hook in registration order, threading output into input.
/// With zero hooks this is the identity; that fast path matters because it
/// runs on every message.
pub async fn run_message_hooks(
    hooks: &[Arc<dyn MessageTransformHook>],
    mut message: Message,
) -> Message {
    for hook in hooks {
        message = hook.transform(message).await;
    }
    message
}

/// Batch counterpart of [`run_message_hooks`].
pub async fn run_batch_hooks(
    hooks: &[Arc<dyn BatchTransformHook>],
    mut messages: Vec<Message>,
) -> Vec<Message> {
    for hook in hooks {
        messages = hook.transform(messages).await;
    }
    messages
}
