//! Server configuration.
//!
//! Defaults, then an optional TOML file named by `PATRON_CONFIG`, then
//! environment variables.

use patron_mailer::SmtpConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Environment variable naming the TOML config file.
pub const CONFIG_PATH_VAR: &str = "PATRON_CONFIG";

/// Full application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PatronConfig {
    pub server: ServerConfig,
    /// Outbound mail. An empty host logs mail instead of sending it.
    pub smtp: SmtpConfig,
    pub stripe: StripeConfig,
    pub site: SiteConfig,
}

/// Server-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to listen on.
    pub port: u16,
    /// Host to bind to.
    pub host: String,
    /// Log level, used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Bearer token required on `/admin` and `/auth` routes when set.
    pub admin_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
            log_level: "info".to_string(),
            admin_token: None,
        }
    }
}

/// Payment processor credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StripeConfig {
    /// API key used for enrichment lookups.
    pub secret_key: Option<String>,
    /// Shared secret for webhook signatures.
    pub webhook_secret: String,
    /// Override for the API host.
    pub api_base: Option<String>,
}

/// Public site details used in notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub organization: String,
    pub url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            organization: "Patron".to_string(),
            url: "http://localhost:3000".to_string(),
        }
    }
}

impl PatronConfig {
    /// Loads from `PATRON_CONFIG` (if set) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => load_config(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Overlays values from `var`, which looks up an environment variable.
    pub fn apply_env<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("SMTP_HOST") {
            self.smtp.host = host;
        }
        if let Some(port) = var("SMTP_PORT") {
            self.smtp.port = parse("SMTP_PORT", &port)?;
        }
        if let Some(secure) = var("SMTP_SECURE") {
            self.smtp.secure = parse_bool("SMTP_SECURE", &secure)?;
        }
        if let Some(user) = var("SMTP_USER") {
            self.smtp.user = Some(user);
        }
        if let Some(password) = var("SMTP_PASSWORD") {
            self.smtp.password = Some(password);
        }
        if let Some(pool_size) = var("SMTP_POOL_SIZE") {
            self.smtp.pool_size = parse("SMTP_POOL_SIZE", &pool_size)?;
        }
        if let Some(max_messages) = var("SMTP_MAX_MESSAGES") {
            self.smtp.max_messages = parse("SMTP_MAX_MESSAGES", &max_messages)?;
        }
        if let Some(rate_limit) = var("SMTP_RATE_LIMIT") {
            self.smtp.rate_limit = parse("SMTP_RATE_LIMIT", &rate_limit)?;
        }
        if let Some(rate_delta) = var("SMTP_RATE_DELTA_MS") {
            self.smtp.rate_delta_ms = parse("SMTP_RATE_DELTA_MS", &rate_delta)?;
        }
        if let Some(from) = var("MAIL_FROM") {
            self.smtp.from = from;
        }

        if let Some(secret_key) = var("STRIPE_SECRET_KEY") {
            self.stripe.secret_key = Some(secret_key);
        }
        if let Some(webhook_secret) = var("STRIPE_WEBHOOK_SECRET") {
            self.stripe.webhook_secret = webhook_secret;
        }

        if let Some(url) = var("SITE_URL") {
            self.site.url = url;
        }

        if let Some(port) = var("PORT") {
            self.server.port = parse("PORT", &port)?;
        }
        if let Some(host) = var("HOST") {
            self.server.host = host;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.server.log_level = level;
        }
        if let Some(token) = var("ADMIN_TOKEN") {
            self.server.admin_token = Some(token);
        }

        Ok(())
    }

    /// Checks that everything required to serve webhooks is present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stripe.webhook_secret.trim().is_empty() {
            return Err(ConfigError::Missing("STRIPE_WEBHOOK_SECRET".to_string()));
        }
        Ok(())
    }

    /// Whether mail goes out over SMTP.
    pub fn smtp_enabled(&self) -> bool {
        !self.smtp.host.trim().is_empty()
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// Loads configuration from a TOML file.
pub fn load_config(path: &str) -> Result<PatronConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
    parse_config(&content)
}

/// Parses configuration from TOML text; absent sections take defaults.
pub fn parse_config(content: &str) -> Result<PatronConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
}

fn parse<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
    #[error("Missing required setting: {0}")]
    Missing(String),
}
