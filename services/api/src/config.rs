//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,

    // Token issuance
    pub jwt_secret: String,
    pub jwt_ttl_minutes: i64,

    // Completion provider
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub completion_max_tokens: u32,
    pub completion_temperature: f32,
    /// Per-call deadline for the completion provider, in seconds.
    pub completion_timeout_seconds: u64,

    // Billing provider
    pub billing_access_token: Option<String>,
    pub billing_webhook_secret: String,
    pub billing_sandbox: bool,
    /// Per-call deadline for billing provider requests, in seconds.
    pub billing_timeout_seconds: u64,

    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Token Issuance ---
        let jwt_secret = std::env::var("SECRET_KEY")
            .map_err(|_| ConfigError::MissingVar("SECRET_KEY".to_string()))?;
        let jwt_ttl_minutes = std::env::var("ACCESS_TOKEN_EXPIRE_MINUTES")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<i64>()
            .map_err(|e| {
                ConfigError::InvalidValue("ACCESS_TOKEN_EXPIRE_MINUTES".to_string(), e.to_string())
            })?;

        // --- Completion Provider ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let openai_model = std::env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4".to_string());
        let completion_max_tokens = std::env::var("COMPLETION_MAX_TOKENS")
            .unwrap_or_else(|_| "2000".to_string())
            .parse::<u32>()
            .map_err(|e| {
                ConfigError::InvalidValue("COMPLETION_MAX_TOKENS".to_string(), e.to_string())
            })?;
        let completion_temperature = std::env::var("COMPLETION_TEMPERATURE")
            .unwrap_or_else(|_| "0.7".to_string())
            .parse::<f32>()
            .map_err(|e| {
                ConfigError::InvalidValue("COMPLETION_TEMPERATURE".to_string(), e.to_string())
            })?;
        let completion_timeout_seconds = std::env::var("COMPLETION_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "120".to_string())
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidValue("COMPLETION_TIMEOUT_SECONDS".to_string(), e.to_string())
            })?;

        // --- Billing Provider ---
        let billing_access_token = std::env::var("BILLING_ACCESS_TOKEN").ok();
        let billing_webhook_secret = std::env::var("BILLING_WEBHOOK_SECRET")
            .map_err(|_| ConfigError::MissingVar("BILLING_WEBHOOK_SECRET".to_string()))?;
        let billing_sandbox = std::env::var("BILLING_SANDBOX")
            .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
            .unwrap_or(true);
        let billing_timeout_seconds = std::env::var("BILLING_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse::<u64>()
            .map_err(|e| {
                ConfigError::InvalidValue("BILLING_TIMEOUT_SECONDS".to_string(), e.to_string())
            })?;

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000,http://127.0.0.1:3000".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            jwt_secret,
            jwt_ttl_minutes,
            openai_api_key,
            openai_model,
            completion_max_tokens,
            completion_temperature,
            completion_timeout_seconds,
            billing_access_token,
            billing_webhook_secret,
            billing_sandbox,
            billing_timeout_seconds,
            allowed_origins,
        })
    }
}
