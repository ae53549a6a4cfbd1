//! Model inference types for provider communication
//!
//! These are NOT domain types - they're the request/response vocabulary at the
//! `ModelClient` boundary.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::message::{Message, MessageContent};

/// Tool definition handed to the model (for provider communication only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A single inference request.
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Model override; when unset the provider config's model is used.
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
}

/// Token counts for one completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// One completed inference. `content` is either text or a tool-call batch.
#[derive(Debug, Clone)]
pub struct CompletionResult {
    pub model: String,
    pub content: MessageContent,
    pub usage: Usage,
    pub finish_reason: FinishReason,
    /// True when the provider served this from a response cache. Cached
    /// results count toward the total usage summary but not the actual one.
    pub cached: bool,
    /// Dollar cost, filled in by the facade after pricing.
    pub cost: f64,
}

impl CompletionResult {
    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }

    pub fn tool_calls(&self) -> Option<&[crate::message::ToolCall]> {
        match &self.content {
            MessageContent::ToolCalls(calls) => Some(calls),
            _ => None,
        }
    }
}

/// Per-model rollup inside a [`UsageSummary`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct ModelUsage {
    pub cost: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// Running token/cost rollup keyed by model name. Merging is additive, so
/// summaries from several facades can be folded into one.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UsageSummary {
    pub total_cost: f64,
    pub by_model: BTreeMap<String, ModelUsage>,
}

impl UsageSummary {
    pub fn record(&mut self, model: &str, usage: Usage, cost: f64) {
        self.total_cost += cost;
        let entry = self.by_model.entry(model.to_string()).or_default();
        entry.cost += cost;
        entry.prompt_tokens += usage.prompt_tokens;
        entry.completion_tokens += usage.completion_tokens;
        entry.total_tokens += usage.total_tokens;
    }

    pub fn merge(&mut self, other: &UsageSummary) {
        self.total_cost += other.total_cost;
        for (model, usage) in &other.by_model {
            let entry = self.by_model.entry(model.clone()).or_default();
            entry.cost += usage.cost;
            entry.prompt_tokens += usage.prompt_tokens;
            entry.completion_tokens += usage.completion_tokens;
            entry.total_tokens += usage.total_tokens;
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_model.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_summary_merge_is_additive() {
        let mut a = UsageSummary::default();
        a.record("gpt-4o", Usage::new(100, 50), 0.01);

        let mut b = UsageSummary::default();
        b.record("gpt-4o", Usage::new(200, 100), 0.02);
        b.record("llama-3.1-8b", Usage::new(500, 20), 0.0);

        a.merge(&b);
        assert!((a.total_cost - 0.03).abs() < 1e-9);
        assert_eq!(a.by_model["gpt-4o"].total_tokens, 450);
        assert_eq!(a.by_model["llama-3.1-8b"].prompt_tokens, 500);
        assert_eq!(a.by_model.len(), 2);
    }

    #[test]
    fn usage_totals_derive_from_parts() {
        let usage = Usage::new(10, 5);
        assert_eq!(usage.total_tokens, 15);
    }
}
