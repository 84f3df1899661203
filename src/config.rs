use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::auth::Credential;
use crate::error::ConfigError;

/// Main configuration for the query service
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub servicenow: ServiceNowConfig,
    pub http: HttpConfig,
}

/// Listening address for the HTTP API
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 7000,
        }
    }
}

/// Azure OpenAI chat deployment used for plan parsing and narration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Deployment name (the `engine` in Azure terms)
    pub deployment: String,
    /// Model name sent alongside the request
    pub model: String,
    pub temperature: f32,
    /// Resource endpoint, e.g. "https://my-resource.openai.azure.com"
    pub endpoint: String,
    /// API key — literal value or "env:VAR_NAME" to read from environment
    pub api_key: Option<String>,
    pub api_version: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            deployment: String::new(),
            model: String::new(),
            temperature: 0.0,
            endpoint: String::new(),
            api_key: None,
            api_version: "2024-02-01".into(),
        }
    }
}

impl LlmConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret(self.api_key.as_deref())
    }

    /// Check the settings needed to reach the deployment are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::Missing("llm.endpoint"));
        }
        if self.deployment.trim().is_empty() {
            return Err(ConfigError::Missing("llm.deployment"));
        }
        Ok(())
    }
}

/// ServiceNow instance and OAuth credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceNowConfig {
    pub instance_url: String,
    pub client_id: String,
    /// Literal value or "env:VAR_NAME"
    pub client_secret: Option<String>,
    pub username: String,
    /// Literal value or "env:VAR_NAME"
    pub password: Option<String>,
    pub grant_type: String,
}

impl Default for ServiceNowConfig {
    fn default() -> Self {
        Self {
            instance_url: String::new(),
            client_id: String::new(),
            client_secret: None,
            username: String::new(),
            password: None,
            grant_type: "password".into(),
        }
    }
}

impl ServiceNowConfig {
    /// Build the validated credential for the token exchange.
    pub fn credential(&self) -> Result<Credential, ConfigError> {
        Credential::new(
            &self.instance_url,
            self.client_id.clone(),
            resolve_secret(self.client_secret.as_deref()).unwrap_or_default(),
            self.username.clone(),
            resolve_secret(self.password.as_deref()).unwrap_or_default(),
            self.grant_type.clone(),
        )
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout for token, record and model calls
    pub timeout_secs: u64,
    /// Related-incident lookups allowed in flight per question
    pub max_concurrent_lookups: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_concurrent_lookups: 8,
        }
    }
}

/// Resolve a secret, supporting "env:VAR_NAME" indirection
pub fn resolve_secret(value: Option<&str>) -> Option<String> {
    value.and_then(|v| {
        if let Some(var_name) = v.strip_prefix("env:") {
            std::env::var(var_name).ok()
        } else if v.is_empty() {
            None
        } else {
            Some(v.to_string())
        }
    })
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load the optional config file, then apply `.env` and process environment overrides.
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::load(p)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Override settings from environment variables, read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = var("AZURE_OPENAI_ENGINE") {
            self.llm.deployment = v;
        }
        if let Some(v) = var("AZURE_OPENAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = var("AZURE_OPENAI_TEMPERATURE") {
            match v.parse() {
                Ok(t) => self.llm.temperature = t,
                Err(_) => tracing::warn!("Ignoring invalid AZURE_OPENAI_TEMPERATURE: {}", v),
            }
        }
        if let Some(v) = var("AZURE_OPENAI_ENDPOINT") {
            self.llm.endpoint = v;
        }
        if let Some(v) = var("AZURE_OPENAI_API_KEY") {
            self.llm.api_key = Some(v);
        }
        if let Some(v) = var("AZURE_OPENAI_API_VERSION") {
            self.llm.api_version = v;
        }

        if let Some(v) = var("API_HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("API_PORT") {
            match v.parse() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring invalid API_PORT: {}", v),
            }
        }

        if let Some(v) = var("SERVICENOW_INSTANCE_URL") {
            self.servicenow.instance_url = v;
        }
        if let Some(v) = var("SERVICENOW_CLIENT_ID") {
            self.servicenow.client_id = v;
        }
        if let Some(v) = var("SERVICENOW_CLIENT_SECRET") {
            self.servicenow.client_secret = Some(v);
        }
        if let Some(v) = var("SERVICENOW_USERNAME") {
            self.servicenow.username = v;
        }
        if let Some(v) = var("SERVICENOW_PASSWORD") {
            self.servicenow.password = Some(v);
        }
        if let Some(v) = var("SERVICENOW_GRANT_TYPE") {
            self.servicenow.grant_type = v;
        }
    }
}
