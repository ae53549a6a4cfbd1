//! Memory collaborator boundary and its hook adapter.
//!
//! Storage and retrieval backends live outside this crate. The runtime only
//! touches memory through hooks, so recalled context reaches the model
//! without ever mutating stored history.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::agent::hooks::BatchTransformHook;
use crate::error::Result;
use crate::message::{Message, MessageContent};

#[derive(Debug, Clone)]
pub struct MemoryRecord {
    pub content: String,
    pub score: f32,
    pub metadata: Option<Value>,
}

#[async_trait]
pub trait Memory: Send + Sync {
    async fn add(&self, content: &str, metadata: Option<Value>) -> Result<()>;
    /// Ranked results, most relevant first.
    async fn query(&self, text: &str) -> Result<Vec<MemoryRecord>>;
    async fn clear(&self) -> Result<()>;
}

/// Adapts a [`Memory`] into a `before_reply_all` batch hook: queries with
/// the last message's text and appends recalled snippets to it. Operates on
/// the transient reply copy only.
pub struct MemoryRecallHook {
    memory: Arc<dyn Memory>,
    limit: usize,
}

impl MemoryRecallHook {
    pub fn new(memory: Arc<dyn Memory>, limit: usize) -> Self {
        Self { memory, limit }
    }
}

#[async_trait]
impl BatchTransformHook for MemoryRecallHook {
    async fn transform(&self, mut messages: Vec<Message>) -> Vec<Message> {
        let Some(last) = messages.last() else {
            return messages;
        };
        let Some(query) = last.text_content() else {
            return messages;
        };

        let records = match self.memory.query(query).await {
            Ok(records) => records,
            Err(err) => {
                // Recall is best-effort; a failed lookup never blocks a reply.
                debug!(error = %err, "memory query failed");
                return messages;
            }
        };
        if records.is_empty() {
            return messages;
        }

        let snippets: Vec<String> = records
            .iter()
            .take(self.limit)
            .map(|record| format!("- {}", record.content))
            .collect();
        let text = format!(
            "{query}\n\nRelevant context:\n{}",
            snippets.join("\n")
        );
        if let Some(last) = messages.last_mut() {
            last.content = Some(MessageContent::Text(text));
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct VecMemory {
        records: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Memory for VecMemory {
        async fn add(&self, content: &str, _metadata: Option<Value>) -> Result<()> {
            self.records.lock().push(content.to_string());
            Ok(())
        }

        async fn query(&self, text: &str) -> Result<Vec<MemoryRecord>> {
            Ok(self
                .records
                .lock()
                .iter()
                .filter(|record| record.contains(text))
                .map(|record| MemoryRecord {
                    content: record.clone(),
                    score: 1.0,
                    metadata: None,
                })
                .collect())
        }

        async fn clear(&self) -> Result<()> {
            self.records.lock().clear();
            Ok(())
        }
    }

    #[tokio::test]
    async fn recall_appends_snippets_to_the_last_message() {
        let memory = Arc::new(VecMemory::default());
        memory.add("the deploy key lives in vault", None).await.unwrap();
        let hook = MemoryRecallHook::new(memory, 3);

        let out = hook.transform(vec![Message::user("deploy")]).await;
        let text = out[0].text_content().unwrap();
        assert!(text.starts_with("deploy"));
        assert!(text.contains("Relevant context:"));
        assert!(text.contains("the deploy key lives in vault"));
    }

    #[tokio::test]
    async fn no_matches_leaves_messages_untouched() {
        let memory = Arc::new(VecMemory::default());
        let hook = MemoryRecallHook::new(memory, 3);
        let original = vec![Message::user("unrelated")];
        let out = hook.transform(original.clone()).await;
        assert_eq!(out, original);
    }

    #[tokio::test]
    async fn recall_respects_the_limit() {
        let memory = Arc::new(VecMemory::default());
        for i in 0..5 {
            memory.add(&format!("note {i}"), None).await.unwrap();
        }
        let hook = MemoryRecallHook::new(memory, 2);
        let out = hook.transform(vec![Message::user("note")]).await;
        let text = out[0].text_content().unwrap();
        assert_eq!(text.matches("- note").count(), 2);
    }
}
