//! Message types exchanged between agents.
//!
//! These are the wire vocabulary of the runtime: every conversation history,
//! broadcast, and provider request is built from `Message` values. A message
//! must carry either content or tool traffic; anything else is rejected
//! before it can reach a history.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ChorusError, Result};

/// Content of a message that terminates a conversation.
pub const TERMINATE_SENTINEL: &str = "TERMINATE";

/// Human input that ends the agent's participation in a chat.
pub const EXIT_SENTINEL: &str = "exit";

/// Message role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool call requested by a model completion.
///
/// `arguments` is the raw JSON string as produced by the provider; it is
/// parsed only at execution time so a malformed payload degrades into a
/// captured tool error instead of a dropped message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: format!("call-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// The outcome of executing one tool call.
///
/// A tool call always produces exactly one of these, success or captured
/// error; tool execution never raises past the executor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionExecutionResult {
    pub call_id: String,
    pub name: String,
    pub content: String,
    pub is_error: bool,
}

/// One part of a multimodal message body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        base64: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        media_type: Option<String>,
    },
}

/// Message body variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
    ToolCalls(Vec<ToolCall>),
    ToolResults(Vec<FunctionExecutionResult>),
}

impl MessageContent {
    /// Plain text view of the content, if it has one.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Render the content to a display string for transcripts and prompts.
    pub fn to_display(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::Image { .. } => Some("<image>"),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            MessageContent::ToolCalls(calls) => calls
                .iter()
                .map(|c| format!("{}({})", c.name, c.arguments))
                .collect::<Vec<_>>()
                .join("\n"),
            MessageContent::ToolResults(results) => results
                .iter()
                .map(|r| r.content.clone())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<MessageContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Template-variable map used for routed messages; its presence makes
    /// the last-message hooks skip the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<BTreeMap<String, Value>>,
}

impl Message {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(content.into())),
            name: None,
            context: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(MessageContent::ToolCalls(calls)),
            name: None,
            context: None,
        }
    }

    pub fn tool_results(results: Vec<FunctionExecutionResult>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(MessageContent::ToolResults(results)),
            name: None,
            context: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_context(mut self, context: BTreeMap<String, Value>) -> Self {
        self.context = Some(context);
        self
    }

    /// Reject messages with neither content nor tool traffic.
    ///
    /// Runs before any history append, so an invalid message can never be
    /// stored.
    pub fn validate(&self) -> Result<()> {
        match &self.content {
            Some(MessageContent::ToolCalls(calls)) if calls.is_empty() => {
                Err(ChorusError::InvalidMessage)
            }
            Some(MessageContent::ToolResults(results)) if results.is_empty() => {
                Err(ChorusError::InvalidMessage)
            }
            Some(_) => Ok(()),
            None => Err(ChorusError::InvalidMessage),
        }
    }

    /// Plain text view of the message, if it has one.
    pub fn text_content(&self) -> Option<&str> {
        self.content.as_ref().and_then(MessageContent::as_text)
    }

    /// The tool calls carried by this message, if any.
    pub fn requested_tool_calls(&self) -> Option<&[ToolCall]> {
        match &self.content {
            Some(MessageContent::ToolCalls(calls)) => Some(calls),
            _ => None,
        }
    }

    /// Tool results carried by this message, if any.
    pub fn carried_tool_results(&self) -> Option<&[FunctionExecutionResult]> {
        match &self.content {
            Some(MessageContent::ToolResults(results)) => Some(results),
            _ => None,
        }
    }

    /// Whether the message is the termination sentinel.
    pub fn is_terminate(&self) -> bool {
        self.text_content()
            .map(|t| t.trim() == TERMINATE_SENTINEL)
            .unwrap_or(false)
    }
}
