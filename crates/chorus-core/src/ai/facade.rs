//! Multi-provider failover facade.
//!
//! Wraps an ordered list of `(ProviderConfig, ModelClient)` pairs. Requests
//! try each provider in order; timeouts and transient errors fall through to
//! the next provider, content-filter rejections stop the loop immediately.
//! The facade also owns pricing and the running usage summaries.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::ai::client::ModelClient;
use crate::ai::providers::ProviderConfig;
use crate::ai::types::{CompletionRequest, CompletionResult, UsageSummary};
use crate::error::{ChorusError, Result};

/// Caller-supplied acceptance predicate. A rejected response moves on to the
/// next provider; the last provider's response is returned regardless.
pub type CompletionFilter = Arc<dyn Fn(&CompletionResult) -> bool + Send + Sync>;

struct ProviderEntry {
    config: ProviderConfig,
    client: Arc<dyn ModelClient>,
}

pub struct ModelClientFacade {
    entries: Vec<ProviderEntry>,
    filter: Option<CompletionFilter>,
    /// Every completion, cache hits included.
    total_usage: Mutex<UsageSummary>,
    /// Only completions the provider actually computed.
    actual_usage: Mutex<UsageSummary>,
}

impl ModelClientFacade {
    /// Build a facade over providers tried in the given order. Every config
    /// is validated up front; an empty list is a configuration error.
    pub fn new(providers: Vec<(ProviderConfig, Arc<dyn ModelClient>)>) -> Result<Self> {
        if providers.is_empty() {
            return Err(ChorusError::InvalidConfig(
                "at least one provider is required".into(),
            ));
        }
        let mut entries = Vec::with_capacity(providers.len());
        for (config, client) in providers {
            config.validate()?;
            entries.push(ProviderEntry { config, client });
        }
        Ok(Self {
            entries,
            filter: None,
            total_usage: Mutex::new(UsageSummary::default()),
            actual_usage: Mutex::new(UsageSummary::default()),
        })
    }

    pub fn with_filter(mut self, filter: CompletionFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Run one inference with failover across the configured providers.
    pub async fn create(&self, request: CompletionRequest) -> Result<CompletionResult> {
        let last = self.entries.len() - 1;
        for (index, entry) in self.entries.iter().enumerate() {
            let is_last = index == last;
            let provider_request = self.apply_config(&entry.config, request.clone());

            let outcome = match entry.config.timeout() {
                Some(deadline) => {
                    match tokio::time::timeout(deadline, entry.client.create(provider_request))
                        .await
                    {
                        Ok(result) => result,
                        Err(_) => Err(ChorusError::ProviderTimeout),
                    }
                }
                None => entry.client.create(provider_request).await,
            };

            match outcome {
                Ok(mut result) => {
                    let cost = match entry.config.price() {
                        Some(price) => price.for_usage(result.usage),
                        None => entry.client.cost(&result),
                    };
                    result.cost = cost;
                    self.total_usage.lock().record(&result.model, result.usage, cost);
                    if !result.cached {
                        self.actual_usage
                            .lock()
                            .record(&result.model, result.usage, cost);
                    }

                    if let Some(filter) = &self.filter {
                        if !filter(&result) && !is_last {
                            debug!(
                                provider = %entry.config,
                                index,
                                "completion rejected by filter, trying next provider"
                            );
                            continue;
                        }
                    }
                    return Ok(result);
                }
                Err(ChorusError::ProviderTimeout) => {
                    if is_last {
                        return Err(ChorusError::ProviderTimeout);
                    }
                    warn!(provider = %entry.config, index, "provider timed out, trying next");
                }
                Err(err @ ChorusError::ContentFilterRejected(_)) => {
                    // Policy rejection, not a transient fault. Never retried.
                    return Err(err);
                }
                Err(err) => {
                    if is_last {
                        return Err(err);
                    }
                    warn!(
                        provider = %entry.config,
                        index,
                        error = %err,
                        "provider failed, trying next"
                    );
                }
            }
        }
        Err(ChorusError::Provider("no providers configured".into()))
    }

    fn apply_config(
        &self,
        config: &ProviderConfig,
        mut request: CompletionRequest,
    ) -> CompletionRequest {
        if request.model.is_none() {
            request.model = Some(config.model().to_string());
        }
        if request.temperature.is_none() {
            request.temperature = config.temperature();
        }
        request
    }

    /// Usage summary including cache hits.
    pub fn total_usage(&self) -> UsageSummary {
        self.total_usage.lock().clone()
    }

    /// Usage summary excluding cache hits.
    pub fn actual_usage(&self) -> UsageSummary {
        self.actual_usage.lock().clone()
    }
}

/// Fold the summaries of several facades into one `(total, actual)` pair.
pub fn gather_usage<'a>(
    facades: impl IntoIterator<Item = &'a ModelClientFacade>,
) -> (UsageSummary, UsageSummary) {
    let mut total = UsageSummary::default();
    let mut actual = UsageSummary::default();
    for facade in facades {
        total.merge(&facade.total_usage());
        actual.merge(&facade.actual_usage());
    }
    (total, actual)
}
