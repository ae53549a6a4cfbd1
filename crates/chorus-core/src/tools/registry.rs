//! Tool trait and per-agent tool set.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::ai::types::ToolSchema;
use crate::error::{ChorusError, Result};

/// A callable the model can request by name. Implementations should check the
/// cancellation token between long-running steps; cancellation is cooperative.
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// JSON schema describing the arguments object.
    fn parameters_schema(&self) -> Value;
    async fn invoke(&self, arguments: Value, cancel: &CancellationToken) -> Result<String>;
}

/// One agent's tools. Names are unique; collisions are construction errors.
#[derive(Default, Clone)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        if self.tools.iter().any(|t| t.name() == tool.name()) {
            return Err(ChorusError::InvalidConfig(format!(
                "duplicate tool name '{}'",
                tool.name()
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn from_tools(tools: Vec<Arc<dyn Tool>>) -> Result<Self> {
        let mut set = Self::new();
        for tool in tools {
            set.add(tool)?;
        }
        Ok(set)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Schemas in registration order, for the model request.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .iter()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }
}
