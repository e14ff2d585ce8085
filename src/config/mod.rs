//! Configuration management for keygate
//!
//! This module handles loading and parsing application configuration from
//! YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Key store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileRead(format!("{}", e)))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        // Expand environment variables before parsing
        let expanded = expand_env_vars(yaml);
        serde_yaml::from_str(&expanded).map_err(|e| ConfigError::Parse(format!("{}", e)))
    }

    /// Load configuration from environment variables with prefix KEYGATE_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("KEYGATE_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("KEYGATE_SERVER_PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid port number".to_string()))?;
        }

        if let Ok(path) = std::env::var("KEYGATE_STORE_PATH") {
            config.store.path = path;
        }

        if let Ok(enabled) = std::env::var("KEYGATE_AUTH_ENABLED") {
            config.auth.auth_enabled = enabled.parse().unwrap_or(true);
        }
        if let Ok(enabled) = std::env::var("KEYGATE_API_KEY_ENABLED") {
            config.auth.api_key_enabled = enabled.parse().unwrap_or(true);
        }
        if let Ok(secret) = std::env::var("KEYGATE_JWT_SECRET") {
            config.auth.jwt_secret = secret;
        }
        if let Ok(hash) = std::env::var("KEYGATE_ADMIN_PASSWORD_HASH") {
            config.auth.admin_password_hash = Some(hash);
        }
        if let Ok(hours) = std::env::var("KEYGATE_TOKEN_EXPIRY_HOURS") {
            config.auth.token_expiry_hours = hours
                .parse()
                .map_err(|_| ConfigError::Parse("Invalid token expiry".to_string()))?;
        }

        if let Ok(level) = std::env::var("KEYGATE_LOG_LEVEL") {
            config.logging.level = level;
        }

        Ok(config)
    }
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
    8888
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// Whether bearer-token authentication is enforced
    #[serde(default = "default_enabled")]
    pub auth_enabled: bool,

    /// Whether API-key authentication is accepted
    #[serde(default = "default_enabled")]
    pub api_key_enabled: bool,

    /// HMAC secret for signing bearer tokens
    #[serde(default)]
    pub jwt_secret: String,

    /// Argon2id PHC hash of the admin password
    pub admin_password_hash: Option<String>,

    /// Bearer token lifetime in hours
    #[serde(default = "default_token_expiry_hours")]
    pub token_expiry_hours: i64,

    /// Non-admin users, username to password
    #[serde(default)]
    pub users: HashMap<String, String>,

    /// Login rate limiting
    #[serde(default)]
    pub rate_limit: LoginRateLimitConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            auth_enabled: default_enabled(),
            api_key_enabled: default_enabled(),
            jwt_secret: String::new(),
            admin_password_hash: None,
            token_expiry_hours: default_token_expiry_hours(),
            users: HashMap::new(),
            rate_limit: LoginRateLimitConfig::default(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_token_expiry_hours() -> i64 {
    24
}

/// Rate limiting configuration for login attempts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRateLimitConfig {
    /// Maximum attempts inside the window
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,

    /// Window length in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for LoginRateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_attempts() -> usize {
    5
}

fn default_window_secs() -> u64 {
    60
}

/// Key store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoreConfig {
    /// Path to the JSON key store file
    #[serde(default = "default_store_path")]
    pub path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

fn default_store_path() -> String {
    "data/apikeys.json".to_string()
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Expand environment variables in a string
///
/// Supports `${VAR_NAME}` syntax
fn expand_env_vars(input: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([^}]+)\}")
        .expect("Invalid regex pattern for environment variable expansion");

    re.replace_all(input, |caps: &regex_lite::Captures| {
        let var_name = &caps[1];
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
