//! The provider-client boundary.
//!
//! Concrete HTTP clients live outside this crate; anything that can answer a
//! [`CompletionRequest`] plugs in here. Auth and network failures must be
//! returned, never swallowed, so the facade's failover loop can react.

use async_trait::async_trait;

use crate::ai::types::{CompletionRequest, CompletionResult};
use crate::error::Result;

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one inference. Errors map to the crate taxonomy:
    /// `ProviderTimeout` for deadline misses, `ContentFilterRejected` for
    /// policy rejections, `Provider` for everything else.
    async fn create(&self, request: CompletionRequest) -> Result<CompletionResult>;

    /// Provider-reported dollar cost for a completed result. The facade
    /// prefers a configured price override when one is present.
    fn cost(&self, result: &CompletionResult) -> f64;
}
