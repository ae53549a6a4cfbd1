//! Tool-call execution with captured errors.
//!
//! Every `ToolCall` produces exactly one `FunctionExecutionResult`. Unknown
//! tools, malformed arguments, invocation failures, timeouts, and
//! cancellation are all folded into an error-flagged result so a multi-call
//! batch keeps executing its remaining calls.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::message::{FunctionExecutionResult, ToolCall};
use crate::tools::registry::ToolSet;

#[derive(Default, Clone)]
pub struct ToolExecutor {
    /// Per-invocation deadline. `None` lets a tool run until it finishes or
    /// observes cancellation.
    timeout: Option<Duration>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// Execute one call, never propagating a failure to the caller.
    pub async fn execute(
        &self,
        call: &ToolCall,
        tools: &ToolSet,
        cancel: &CancellationToken,
    ) -> FunctionExecutionResult {
        let tool = match tools.get(&call.name) {
            Some(tool) => tool.clone(),
            None => {
                warn!(tool = %call.name, call_id = %call.id, "requested tool not found");
                return self.error_result(call, format!("Error: tool '{}' not found", call.name));
            }
        };

        let arguments: serde_json::Value = match serde_json::from_str(&call.arguments) {
            Ok(value) => value,
            Err(err) => {
                return self.error_result(
                    call,
                    format!("Error: invalid arguments for '{}': {err}", call.name),
                );
            }
        };

        if cancel.is_cancelled() {
            return self.error_result(call, format!("Error: '{}' was cancelled", call.name));
        }

        debug!(tool = %call.name, call_id = %call.id, "executing tool");
        let invocation = tool.invoke(arguments, cancel);
        let outcome = match self.timeout {
            Some(deadline) => match tokio::time::timeout(deadline, invocation).await {
                Ok(result) => result,
                Err(_) => {
                    return self.error_result(
                        call,
                        format!("Error: '{}' timed out after {:?}", call.name, deadline),
                    );
                }
            },
            None => invocation.await,
        };

        match outcome {
            Ok(content) => FunctionExecutionResult {
                call_id: call.id.clone(),
                name: call.name.clone(),
                content,
                is_error: false,
            },
            Err(err) => {
                warn!(tool = %call.name, error = %err, "tool execution failed");
                self.error_result(call, format!("Error: {err}"))
            }
        }
    }

    /// Execute a batch in order. A failed call never stops the batch.
    pub async fn execute_batch(
        &self,
        calls: &[ToolCall],
        tools: &ToolSet,
        cancel: &CancellationToken,
    ) -> Vec<FunctionExecutionResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute(call, tools, cancel).await);
        }
        results
    }

    fn error_result(&self, call: &ToolCall, message: String) -> FunctionExecutionResult {
        FunctionExecutionResult {
            call_id: call.id.clone(),
            name: call.name.clone(),
            content: message,
            is_error: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::tools::registry::Tool;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Adder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Tool for Adder {
        fn name(&self) -> &str {
            "add"
        }

        fn description(&self) -> &str {
            "Adds two integers"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": {
                    "a": {"type": "integer"},
                    "b": {"type": "integer"}
                },
                "required": ["a", "b"]
            })
        }

        async fn invoke(&self, arguments: Value, _cancel: &CancellationToken) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let sum = arguments["a"].as_i64().unwrap_or(0) + arguments["b"].as_i64().unwrap_or(0);
            Ok(sum.to_string())
        }
    }

    struct Sleeper;

    #[async_trait]
    impl Tool for Sleeper {
        fn name(&self) -> &str {
            "sleep"
        }

        fn description(&self) -> &str {
            "Sleeps forever"
        }

        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }

        async fn invoke(&self, _arguments: Value, cancel: &CancellationToken) -> Result<String> {
            cancel.cancelled().await;
            Ok("woke".into())
        }
    }

    fn call(name: &str, arguments: &str) -> ToolCall {
        ToolCall::new(name, arguments)
    }

    #[tokio::test]
    async fn batch_isolates_the_failing_call() {
        let adder = Arc::new(Adder {
            calls: AtomicUsize::new(0),
        });
        let tools = ToolSet::from_tools(vec![adder.clone()]).unwrap();
        let calls = vec![
            call("add", r#"{"a": 1, "b": 2}"#),
            call("subtract", r#"{"a": 1, "b": 2}"#),
            call("add", r#"{"a": 3, "b": 4}"#),
        ];

        let results = ToolExecutor::new()
            .execute_batch(&calls, &tools, &CancellationToken::new())
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results.iter().filter(|r| r.is_error).count(), 1);
        assert!(results[1].is_error);
        assert!(results[1].content.contains("subtract"));
        assert_eq!(results[0].content, "3");
        assert_eq!(results[2].content, "7");
        // The third call ran even though the second failed.
        assert_eq!(adder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn malformed_arguments_are_captured() {
        let tools = ToolSet::from_tools(vec![Arc::new(Adder {
            calls: AtomicUsize::new(0),
        }) as Arc<dyn Tool>])
        .unwrap();
        let result = ToolExecutor::new()
            .execute(&call("add", "{not json"), &tools, &CancellationToken::new())
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("invalid arguments"));
    }

    #[tokio::test]
    async fn empty_tool_set_yields_error_result() {
        let result = ToolExecutor::new()
            .execute(
                &call("anything", "{}"),
                &ToolSet::new(),
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("not found"));
    }

    #[tokio::test]
    async fn timeout_is_captured_not_propagated() {
        let tools = ToolSet::from_tools(vec![Arc::new(Sleeper) as Arc<dyn Tool>]).unwrap();
        let result = ToolExecutor::with_timeout(Duration::from_millis(10))
            .execute(&call("sleep", "{}"), &tools, &CancellationToken::new())
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("timed out"));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let tools = ToolSet::from_tools(vec![Arc::new(Sleeper) as Arc<dyn Tool>]).unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let result = ToolExecutor::new()
            .execute(&call("sleep", "{}"), &tools, &token)
            .await;
        assert!(result.is_error);
        assert!(result.content.contains("cancelled"));
    }

    #[tokio::test]
    async fn result_carries_the_call_id() {
        let tools = ToolSet::from_tools(vec![Arc::new(Adder {
            calls: AtomicUsize::new(0),
        }) as Arc<dyn Tool>])
        .unwrap();
        let the_call = call("add", r#"{"a": 1, "b": 1}"#);
        let result = ToolExecutor::new()
            .execute(&the_call, &tools, &CancellationToken::new())
            .await;
        assert_eq!(result.call_id, the_call.id);
        assert_eq!(result.name, "add");
    }
}
