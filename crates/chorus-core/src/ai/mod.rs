//! Model inference layer: request/response types, the provider-client
//! boundary, provider configuration, and the failover facade.

pub mod client;
pub mod facade;
pub mod providers;
pub mod types;

pub use client::ModelClient;
pub use facade::{gather_usage, CompletionFilter, ModelClientFacade};
pub use providers::{GroqConfig, OllamaConfig, OpenAiConfig, PriceOverride, ProviderConfig};
pub use types::{
    CompletionRequest, CompletionResult, FinishReason, ModelUsage, ToolSchema, Usage, UsageSummary,
};
