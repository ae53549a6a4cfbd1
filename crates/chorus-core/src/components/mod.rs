//! Workflow composition: fixed sequences, bounded cycles with an optional
//! router-driven early exit, and routed pipelines.

pub mod cycle;
pub mod pipeline;
pub mod sequence;

use async_trait::async_trait;

use crate::agent::core::Agent;
use crate::error::Result;
use crate::message::Message;

pub use cycle::CycleComponent;
pub use pipeline::{EdgeTarget, Pipeline, PipelineBuilder, PipelineNode};
pub use sequence::SequentialComponent;

/// What a component hands back to its caller. `next` names a component to
/// fall through to, overriding the graph's static edge.
pub struct ComponentOutcome {
    pub speaker: Agent,
    pub message: Message,
    pub next: Option<String>,
}

/// A runnable workflow step over one or more agents.
#[async_trait]
pub trait Component: Send + Sync {
    fn name(&self) -> &str;
    async fn run(&self, message: Message, sender: &Agent) -> Result<ComponentOutcome>;
}
