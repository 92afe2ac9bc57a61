//! Model-provider API key checks.
//!
//! Each check lists the provider's models with the supplied key and reports
//! a sample model id. A missing key is reported, not raised.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::{Result, USER_AGENT};

/// Providers whose keys can be checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    DeepSeek,
    Gemini,
}

impl Provider {
    /// Every supported provider, in reporting order.
    pub const ALL: [Provider; 3] = [Provider::OpenAi, Provider::DeepSeek, Provider::Gemini];

    pub fn name(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::DeepSeek => "deepseek",
            Provider::Gemini => "gemini",
        }
    }

    /// Environment variable holding the provider's API key.
    pub fn env_var(&self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
            Provider::Gemini => "GEMINI_API_KEY",
        }
    }

    fn models_url(&self) -> &'static str {
        match self {
            Provider::OpenAi => "https://api.openai.com/v1/models",
            Provider::DeepSeek => "https://api.deepseek.com/v1/models",
            Provider::Gemini => "https://generativelanguage.googleapis.com/v1beta/models",
        }
    }
}

/// Outcome of one provider check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatus {
    /// The key listed models; carries the first model id or a placeholder.
    Ok { sample_model: String },
    /// No key was supplied.
    Missing,
    /// The request failed.
    Failed(String),
}

/// Provider paired with its check outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCheck {
    pub provider: Provider,
    pub status: KeyStatus,
}

impl KeyCheck {
    pub fn is_ok(&self) -> bool {
        matches!(self.status, KeyStatus::Ok { .. })
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        match &self.status {
            KeyStatus::Ok { sample_model } => {
                format!("ok {}: sample model {}", self.provider.name(), sample_model)
            }
            KeyStatus::Missing => {
                format!("missing {}: {} not set", self.provider.name(), self.provider.env_var())
            }
            KeyStatus::Failed(reason) => format!("error {}: {}", self.provider.name(), reason),
        }
    }
}

/// Check one provider key by listing its models.
pub async fn check_provider(
    client: &reqwest::Client,
    provider: Provider,
    key: Option<&str>,
) -> KeyCheck {
    let Some(key) = key.filter(|k| !k.trim().is_empty()) else {
        debug!(provider = provider.name(), "no key; skipping");
        return KeyCheck {
            provider,
            status: KeyStatus::Missing,
        };
    };

    let status = match list_models(client, provider, key).await {
        Ok(body) => KeyStatus::Ok {
            sample_model: sample_model(provider, &body),
        },
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "key check failed");
            KeyStatus::Failed(e.to_string())
        }
    };

    KeyCheck { provider, status }
}

/// Check every provider in [`Provider::ALL`] order.
///
/// `lookup` returns the key for a provider, if any.
pub async fn check_all_providers<F>(lookup: F, timeout: Duration) -> Result<Vec<KeyCheck>>
where
    F: Fn(Provider) -> Option<String>,
{
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;

    let mut checks = Vec::with_capacity(Provider::ALL.len());
    for provider in Provider::ALL {
        let key = lookup(provider);
        checks.push(check_provider(&client, provider, key.as_deref()).await);
    }
    Ok(checks)
}

async fn list_models(client: &reqwest::Client, provider: Provider, key: &str) -> Result<Value> {
    let request = client.get(provider.models_url());
    let request = match provider {
        Provider::Gemini => request.query(&[("key", key)]),
        Provider::OpenAi | Provider::DeepSeek => request.bearer_auth(key),
    };

    // reqwest errors can embed the request URL, which carries the Gemini key.
    let response = request
        .send()
        .await
        .map_err(|e| ProbeError::Http(e.without_url().to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProbeError::UnexpectedStatus {
            service: provider.name().to_string(),
            status: status.as_u16(),
        });
    }

    response
        .json()
        .await
        .map_err(|e| ProbeError::Http(e.without_url().to_string()))
}

/// Pick the first model identifier out of a list-models response.
pub fn sample_model(provider: Provider, body: &Value) -> String {
    let (list_field, id_field) = match provider {
        Provider::Gemini => ("models", "name"),
        Provider::OpenAi | Provider::DeepSeek => ("data", "id"),
    };

    body.get(list_field)
        .and_then(Value::as_array)
        .and_then(|models| models.first())
        .and_then(|m| m.get(id_field))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "no models returned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sample_model_openai_shape() {
        let body = json!({ "object": "list", "data": [{ "id": "gpt-4o" }, { "id": "gpt-4o-mini" }] });
        assert_eq!(sample_model(Provider::OpenAi, &body), "gpt-4o");
    }

    #[test]
    fn test_sample_model_gemini_shape() {
        let body = json!({ "models": [{ "name": "models/gemini-1.5-pro" }] });
        assert_eq!(sample_model(Provider::Gemini, &body), "models/gemini-1.5-pro");
    }

    #[test]
    fn test_sample_model_empty_list() {
        let body = json!({ "data": [] });
        assert_eq!(sample_model(Provider::DeepSeek, &body), "no models returned");
    }

    #[tokio::test]
    async fn test_missing_key_is_reported_without_request() {
        let client = reqwest::Client::new();
        let check = check_provider(&client, Provider::OpenAi, None).await;
        assert_eq!(check.status, KeyStatus::Missing);
        assert!(!check.is_ok());

        let blank = check_provider(&client, Provider::Gemini, Some("  ")).await;
        assert_eq!(blank.status, KeyStatus::Missing);
        assert!(blank.summary().contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn test_check_all_without_keys_reports_every_provider() {
        let checks = check_all_providers(|_| None, Duration::from_secs(1))
            .await
            .unwrap();
        let providers: Vec<Provider> = checks.iter().map(|c| c.provider).collect();
        assert_eq!(providers, Provider::ALL.to_vec());
        assert!(checks.iter().all(|c| c.status == KeyStatus::Missing));
    }
}
