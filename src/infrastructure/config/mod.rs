//! Application configuration.
//!
//! Layered with figment: built-in defaults, then an optional TOML file
//! (`sqlchat.toml`, or the path in `SQLCHAT_CONFIG`), then `SQLCHAT_*`
//! environment variables with `__` separating nested keys, e.g.
//! `SQLCHAT_LLM__MODEL=gpt-4o-mini`.

use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use crate::infrastructure::security::resolve_secret;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_CONFIG_FILE: &str = "sqlchat.toml";
pub const CONFIG_PATH_ENV: &str = "SQLCHAT_CONFIG";
pub const ENV_PREFIX: &str = "SQLCHAT_";

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// `postgres://...` or `sqlite:...`
    #[validate(length(min = 1))]
    pub url: String,
    #[validate(range(min = 1, max = 100))]
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://sqlchat.db?mode=rwc".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PipelineConfig {
    /// Regenerations allowed after a rejected audit.
    #[validate(range(max = 10))]
    pub max_retries: u32,
    #[validate(range(min = 1, max = 50))]
    pub summary_sample_rows: usize,
    #[validate(range(min = 1, max = 20))]
    pub relevance_limit: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            summary_sample_rows: 5,
            relevance_limit: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LoggingConfig {
    pub filter: String,
    #[validate(range(min = 1, max = 10000))]
    pub buffer_size: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            buffer_size: 100,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[validate(nested)]
    pub llm: LLMConfig,
    #[validate(nested)]
    pub pipeline: PipelineConfig,
    #[validate(nested)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn figment() -> Figment {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Load, validate and resolve secret references.
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: AppConfig = figment.extract()?;

        config
            .validate()
            .map_err(|e| AppError::ConfigError(format!("Invalid configuration: {}", e)))?;

        if let Some(reference) = config.llm.api_key.take() {
            let key = resolve_secret(&reference)?;
            config.llm.api_key = if key.is_empty() { None } else { Some(key) };
        }

        Ok(config)
    }
}
