//! Provider configuration
//!
//! One variant per supported backend, each exposing only its legal fields.
//! Validation happens at facade construction, not at request time.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ChorusError, Result};

/// Price override in dollars per 1000 tokens. Takes precedence over the
/// provider-reported cost when set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PriceOverride {
    pub prompt: f64,
    pub completion: f64,
}

impl PriceOverride {
    pub fn for_usage(&self, usage: crate::ai::types::Usage) -> f64 {
        (usage.prompt_tokens as f64 / 1000.0) * self.prompt
            + (usage.completion_tokens as f64 / 1000.0) * self.completion
    }
}

/// Hosted OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    pub model: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Groq cloud endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroqConfig {
    pub model: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<PriceOverride>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Local Ollama endpoint. No API key; defaults to localhost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Sum of all supported provider configurations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum ProviderConfig {
    OpenAi(OpenAiConfig),
    Groq(GroqConfig),
    Ollama(OllamaConfig),
}

impl ProviderConfig {
    pub fn validate(&self) -> Result<()> {
        match self {
            ProviderConfig::OpenAi(cfg) => {
                if cfg.model.trim().is_empty() {
                    return Err(ChorusError::InvalidConfig(
                        "openai provider requires a model".into(),
                    ));
                }
                if cfg.api_key.trim().is_empty() {
                    return Err(ChorusError::InvalidConfig(
                        "openai provider requires an api key".into(),
                    ));
                }
            }
            ProviderConfig::Groq(cfg) => {
                if cfg.model.trim().is_empty() {
                    return Err(ChorusError::InvalidConfig(
                        "groq provider requires a model".into(),
                    ));
                }
                if cfg.api_key.trim().is_empty() {
                    return Err(ChorusError::InvalidConfig(
                        "groq provider requires an api key".into(),
                    ));
                }
            }
            ProviderConfig::Ollama(cfg) => {
                if cfg.model.trim().is_empty() {
                    return Err(ChorusError::InvalidConfig(
                        "ollama provider requires a model".into(),
                    ));
                }
            }
        }
        Ok(())
    }

    pub fn model(&self) -> &str {
        match self {
            ProviderConfig::OpenAi(cfg) => &cfg.model,
            ProviderConfig::Groq(cfg) => &cfg.model,
            ProviderConfig::Ollama(cfg) => &cfg.model,
        }
    }

    pub fn temperature(&self) -> Option<f32> {
        match self {
            ProviderConfig::OpenAi(cfg) => cfg.temperature,
            ProviderConfig::Groq(cfg) => cfg.temperature,
            ProviderConfig::Ollama(cfg) => cfg.temperature,
        }
    }

    pub fn price(&self) -> Option<PriceOverride> {
        match self {
            ProviderConfig::OpenAi(cfg) => cfg.price,
            ProviderConfig::Groq(cfg) => cfg.price,
            ProviderConfig::Ollama(_) => None,
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        let secs = match self {
            ProviderConfig::OpenAi(cfg) => cfg.timeout_secs,
            ProviderConfig::Groq(cfg) => cfg.timeout_secs,
            ProviderConfig::Ollama(cfg) => cfg.timeout_secs,
        };
        secs.map(Duration::from_secs)
    }
}

impl fmt::Display for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderConfig::OpenAi(cfg) => write!(f, "openai/{}", cfg.model),
            ProviderConfig::Groq(cfg) => write!(f, "groq/{}", cfg.model),
            ProviderConfig::Ollama(cfg) => write!(f, "ollama/{}", cfg.model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::Usage;

    #[test]
    fn empty_model_fails_validation() {
        let cfg = ProviderConfig::Ollama(OllamaConfig {
            model: "  ".into(),
            base_url: None,
            temperature: None,
            timeout_secs: None,
        });
        assert!(matches!(
            cfg.validate(),
            Err(ChorusError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_api_key_fails_validation() {
        let cfg = ProviderConfig::OpenAi(OpenAiConfig {
            model: "gpt-4o".into(),
            api_key: String::new(),
            base_url: None,
            temperature: None,
            price: None,
            timeout_secs: None,
        });
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn price_override_is_per_thousand_tokens() {
        let price = PriceOverride {
            prompt: 0.5,
            completion: 1.5,
        };
        let cost = price.for_usage(Usage::new(2000, 1000));
        assert!((cost - 2.5).abs() < 1e-9);
    }
}
