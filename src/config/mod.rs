//! Configuration management for cnet-security
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

pub use crate::error::ConfigError;
use crate::auth::compile_exclusion;
use crate::ratelimit::adapter::validate_window;
use crate::ratelimit::{IpRateLimitAdapter, RateLimitSettings, TokenRateLimitAdapter};

const ENV_PREFIX: &str = "CNET_SECURITY_";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Token storage configuration
    #[serde(default)]
    pub tokens: TokensConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("Failed to read config file: {}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded)
            .map_err(|e| ConfigError::Parse(format!("Failed to parse YAML: {}", e)))
    }

    /// Load configuration from environment variables with prefix CNET_SECURITY_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(host) = env_var("SERVER_HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_var("SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }

        if let Some(enabled) = env_var("AUTH_ENABLED") {
            config.auth.enabled = enabled.parse().unwrap_or(true);
        }
        if let Some(exclusions) = env_var("AUTH_EXCLUSIONS") {
            config.auth.exclusions = exclusions
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(path) = env_var("TOKENS_PATH") {
            config.tokens.path = path;
        }

        if let Some(secs) = env_var("RATE_LIMIT_TICK_INTERVAL_SECS") {
            config.rate_limit.tick_interval_secs = parse_number(&secs, "tick interval")?;
        }
        apply_adapter_env("IP", &mut config.rate_limit.ip)?;
        apply_adapter_env("TOKEN", &mut config.rate_limit.token)?;

        if let Some(level) = env_var("LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Some(format) = env_var("LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Reject values the security context cannot be built from
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::InvalidValue("server.port must not be 0".to_string()));
        }
        if self.rate_limit.tick_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "rate_limit.tick_interval_secs must not be 0".to_string(),
            ));
        }

        validate_window(self.rate_limit.ip.window_ms)?;
        validate_window(self.rate_limit.token.window_ms)?;

        for exclusion in &self.auth.exclusions {
            compile_exclusion(exclusion)?;
        }

        match self.logging.format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(ConfigError::InvalidValue(format!(
                    "logging.format must be json or pretty, got '{other}'"
                )))
            }
        }

        Ok(())
    }
}

fn env_var(suffix: &str) -> Option<String> {
    std::env::var(format!("{ENV_PREFIX}{suffix}")).ok()
}

fn parse_number(value: &str, what: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Parse(format!("Invalid {what}: {value}")))
}

fn apply_adapter_env(id: &str, adapter: &mut AdapterConfig) -> Result<(), ConfigError> {
    if let Some(enabled) = env_var(&format!("RATE_LIMIT_{id}_ENABLED")) {
        adapter.enabled = enabled.parse().unwrap_or(true);
    }
    if let Some(max) = env_var(&format!("RATE_LIMIT_{id}_MAX")) {
        adapter.max = parse_number(&max, "rate limit max")?;
    }
    if let Some(window) = env_var(&format!("RATE_LIMIT_{id}_WINDOW_MS")) {
        adapter.window_ms = parse_number(&window, "rate limit window")?;
    }
    if let Some(headers) = env_var(&format!("RATE_LIMIT_{id}_INCLUDE_HEADERS")) {
        adapter.include_headers = headers.parse().unwrap_or(true);
    }
    Ok(())
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Whether the default token auth chain is installed
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Full-match URL patterns that skip authentication
    #[serde(default = "default_exclusions")]
    pub exclusions: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exclusions: default_exclusions(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_exclusions() -> Vec<String> {
    vec!["/health".to_string()]
}

/// Token storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokensConfig {
    /// Path of the JSON token file
    #[serde(default = "default_tokens_path")]
    pub path: String,
}

impl Default for TokensConfig {
    fn default() -> Self {
        Self {
            path: default_tokens_path(),
        }
    }
}

fn default_tokens_path() -> String {
    "data/tokens.json".to_string()
}

/// Rate limiting configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Seconds between sweeps of expired counters
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Per-address limit
    #[serde(
        default = "AdapterConfig::ip_defaults",
        deserialize_with = "deserialize_ip_adapter"
    )]
    pub ip: AdapterConfig,

    /// Per-token limit
    #[serde(
        default = "AdapterConfig::token_defaults",
        deserialize_with = "deserialize_token_adapter"
    )]
    pub token: AdapterConfig,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            ip: AdapterConfig::ip_defaults(),
            token: AdapterConfig::token_defaults(),
        }
    }
}

fn default_tick_interval() -> u64 {
    60
}

/// Settings of one built-in rate limit adapter
///
/// Fields missing from a section keep that section's defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterConfig {
    /// Whether the adapter is registered
    pub enabled: bool,

    /// Requests allowed per window
    pub max: u64,

    /// Window length in milliseconds
    pub window_ms: u64,

    /// Whether X-RateLimit-* headers are sent
    pub include_headers: bool,
}

impl AdapterConfig {
    pub fn ip_defaults() -> Self {
        Self::with_max(IpRateLimitAdapter::DEFAULT_MAX)
    }

    pub fn token_defaults() -> Self {
        Self::with_max(TokenRateLimitAdapter::DEFAULT_MAX)
    }

    fn with_max(max: u64) -> Self {
        Self {
            enabled: true,
            max,
            window_ms: crate::ratelimit::DEFAULT_WINDOW_MILLIS,
            include_headers: true,
        }
    }

    /// Validated adapter settings under `id`
    pub fn settings(&self, id: &str) -> Result<RateLimitSettings, ConfigError> {
        RateLimitSettings::new(id, self.max, self.window_ms, self.include_headers)
    }
}

/// An adapter section as written, before defaults are applied
#[derive(Debug, Default, Deserialize)]
struct AdapterOverrides {
    enabled: Option<bool>,
    max: Option<u64>,
    window_ms: Option<u64>,
    include_headers: Option<bool>,
}

impl AdapterOverrides {
    fn apply(self, mut base: AdapterConfig) -> AdapterConfig {
        if let Some(enabled) = self.enabled {
            base.enabled = enabled;
        }
        if let Some(max) = self.max {
            base.max = max;
        }
        if let Some(window_ms) = self.window_ms {
            base.window_ms = window_ms;
        }
        if let Some(include_headers) = self.include_headers {
            base.include_headers = include_headers;
        }
        base
    }
}

fn deserialize_ip_adapter<'de, D>(deserializer: D) -> Result<AdapterConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = Option::<AdapterOverrides>::deserialize(deserializer)?.unwrap_or_default();
    Ok(overrides.apply(AdapterConfig::ip_defaults()))
}

fn deserialize_token_adapter<'de, D>(deserializer: D) -> Result<AdapterConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let overrides = Option::<AdapterOverrides>::deserialize(deserializer)?.unwrap_or_default();
    Ok(overrides.apply(AdapterConfig::token_defaults()))
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format, `json` or `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax. Unknown variables are left untouched.
fn expand_env_vars(input: &str) -> String {
    let Ok(re) = regex_lite::Regex::new(r"\$\{([^}]+)\}") else {
        return input.to_string();
    };

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
