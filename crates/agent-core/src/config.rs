//! LLM Configuration
//!
//! Provider, model, sampling and transport settings plus credentials, built
//! with chained `with_*` calls or read from the environment.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AgentError, Result};
use crate::provider::ProviderKind;

pub const DEFAULT_TEMPERATURE: f32 = 0.3;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// API key and/or endpoint, depending on the provider
///
/// OpenAI, Anthropic and Gemini use the key only, Azure uses both and
/// Ollama uses the endpoint only.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub endpoint: Option<String>,
}

impl Credentials {
    /// Non-empty API key, if any
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }

    /// Non-empty endpoint, if any
    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref().filter(|endpoint| !endpoint.is_empty())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// Configuration consumed by the provider factory
#[derive(Clone, Debug, PartialEq)]
pub struct LlmConfig {
    pub provider: Option<ProviderKind>,

    pub model: String,

    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,

    /// Maximum output tokens
    pub max_tokens: u32,

    /// Per-request HTTP timeout
    pub timeout: Duration,

    /// Attempts per request, including the first one
    pub max_retries: u32,

    pub credentials: Credentials,

    /// Overrides the provider's public API base URL (proxies, test servers)
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: None,
            model: String::new(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            timeout: DEFAULT_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            credentials: Credentials::default(),
            base_url: None,
        }
    }
}

impl LlmConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    // Each credential setter replaces whatever was configured before.

    pub fn with_openai_credentials(mut self, api_key: impl Into<String>) -> Self {
        self.credentials = Credentials {
            api_key: Some(api_key.into()),
            endpoint: None,
        };
        self
    }

    pub fn with_azure_openai_credentials(
        mut self,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        self.credentials = Credentials {
            api_key: Some(api_key.into()),
            endpoint: Some(endpoint.into()),
        };
        self
    }

    pub fn with_anthropic_credentials(self, api_key: impl Into<String>) -> Self {
        self.with_openai_credentials(api_key)
    }

    pub fn with_gemini_credentials(self, api_key: impl Into<String>) -> Self {
        self.with_openai_credentials(api_key)
    }

    pub fn with_ollama_credentials(mut self, endpoint: impl Into<String>) -> Self {
        self.credentials = Credentials {
            api_key: None,
            endpoint: Some(endpoint.into()),
        };
        self
    }

    /// Check structural bounds. Model catalog checks happen in the factory.
    pub fn validate(&self) -> Result<()> {
        if self.provider.is_none() {
            return Err(AgentError::InvalidConfig("provider is required".into()));
        }
        if self.model.is_empty() {
            return Err(AgentError::InvalidConfig("model is required".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(AgentError::InvalidConfig(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(AgentError::InvalidConfig(
                "max tokens must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Load from environment variables
    ///
    /// `LLM_PROVIDER` is required; `LLM_MODEL`, `LLM_TEMPERATURE`,
    /// `LLM_MAX_TOKENS`, `LLM_TIMEOUT_SECS` and `LLM_MAX_RETRIES` are
    /// optional. Credentials come from the provider's own variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LlmConfig::from_env`] with an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let provider: ProviderKind = get("LLM_PROVIDER")
            .ok_or_else(|| AgentError::InvalidConfig("LLM_PROVIDER is not set".into()))?
            .parse()?;

        let mut config = Self::new().with_provider(provider);
        if let Some(model) = get("LLM_MODEL") {
            config.model = model;
        }
        if let Some(temperature) = parse_var(&get, "LLM_TEMPERATURE")? {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = parse_var(&get, "LLM_MAX_TOKENS")? {
            config.max_tokens = max_tokens;
        }
        if let Some(secs) = parse_var(&get, "LLM_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(max_retries) = parse_var(&get, "LLM_MAX_RETRIES")? {
            config.max_retries = max_retries;
        }

        config.credentials = match provider {
            ProviderKind::OpenAi => Credentials {
                api_key: get("OPENAI_API_KEY"),
                endpoint: None,
            },
            ProviderKind::Azure => Credentials {
                api_key: get("AZURE_OPENAI_API_KEY"),
                endpoint: get("AZURE_OPENAI_ENDPOINT"),
            },
            ProviderKind::Anthropic => Credentials {
                api_key: get("ANTHROPIC_API_KEY"),
                endpoint: None,
            },
            ProviderKind::Gemini => Credentials {
                api_key: get("GEMINI_API_KEY"),
                endpoint: None,
            },
            ProviderKind::Ollama => Credentials {
                api_key: None,
                endpoint: get("OLLAMA_HOST"),
            },
        };

        Ok(config)
    }
}

fn parse_var<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .map_err(|e| AgentError::InvalidConfig(format!("{key}={raw:?}: {e}")))
        })
        .transpose()
}
