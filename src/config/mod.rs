//! Configuration management for productivity-api
//!
//! This module handles loading, parsing, and validating application configuration
//! from YAML files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest accepted token lifetime (ten years)
pub const MAX_TOKEN_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

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

    /// Load configuration from environment variables with prefix PRODUCTIVITY_API_
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(host) = std::env::var("PRODUCTIVITY_API_SERVER_HOST") {
            config.server.host = host;
        }
        if let Ok(port) = std::env::var("PRODUCTIVITY_API_SERVER_PORT") {
            config.server.port = parse_env("PRODUCTIVITY_API_SERVER_PORT", &port)?;
        }

        if let Ok(secret) = std::env::var("PRODUCTIVITY_API_JWT_SECRET") {
            config.auth.jwt_secret = Some(secret);
        }
        if let Ok(ttl) = std::env::var("PRODUCTIVITY_API_TOKEN_TTL_SECS") {
            config.auth.token_ttl_secs = parse_env("PRODUCTIVITY_API_TOKEN_TTL_SECS", &ttl)?;
        }

        if let Ok(path) = std::env::var("PRODUCTIVITY_API_DATABASE_PATH") {
            config.database.path = path;
        }
        if let Ok(size) = std::env::var("PRODUCTIVITY_API_DATABASE_POOL_SIZE") {
            config.database.pool_size = parse_env("PRODUCTIVITY_API_DATABASE_POOL_SIZE", &size)?;
        }

        if let Ok(level) = std::env::var("PRODUCTIVITY_API_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(format) = std::env::var("PRODUCTIVITY_API_LOG_FORMAT") {
            config.logging.format = format;
        }

        Ok(config)
    }

    /// Reject configurations the server cannot start with
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.auth.jwt_secret.as_deref() {
            Some(secret) if !secret.trim().is_empty() => {}
            _ => return Err(ConfigError::MissingRequired("auth.jwt_secret".to_string())),
        }
        if self.auth.token_ttl_secs == 0 || self.auth.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::InvalidValue(format!(
                "auth.token_ttl_secs must be between 1 and {}",
                MAX_TOKEN_TTL_SECS
            )));
        }
        if self.auth.pbkdf2_rounds == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.pbkdf2_rounds must be greater than 0".to_string(),
            ));
        }
        if self.auth.revocation_sweep_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "auth.revocation_sweep_secs must be greater than 0".to_string(),
            ));
        }
        if self.database.pool_size == 0 {
            return Err(ConfigError::InvalidValue(
                "database.pool_size must be greater than 0".to_string(),
            ));
        }
        if self.database.max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "database.max_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::Parse(format!("Invalid value for {}: {}", name, value)))
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
    5000
}

/// Authentication configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// HMAC secret used to sign session tokens
    pub jwt_secret: Option<String>,

    /// Session token lifetime in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,

    /// PBKDF2 rounds used when provisioning a new admin
    #[serde(default = "default_pbkdf2_rounds")]
    pub pbkdf2_rounds: u32,

    /// How often expired revocations are purged, in seconds
    #[serde(default = "default_revocation_sweep")]
    pub revocation_sweep_secs: u64,

    /// Login rate limiting
    #[serde(default)]
    pub rate_limit: LoginRateLimitConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_secs: default_token_ttl(),
            pbkdf2_rounds: default_pbkdf2_rounds(),
            revocation_sweep_secs: default_revocation_sweep(),
            rate_limit: LoginRateLimitConfig::default(),
        }
    }
}

fn default_token_ttl() -> u64 {
    86400 // 24 hours
}

fn default_pbkdf2_rounds() -> u32 {
    29000
}

fn default_revocation_sweep() -> u64 {
    300
}

/// Per-address login attempt limits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoginRateLimitConfig {
    /// Attempts allowed per window
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Window length in seconds
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// How long an address stays blocked once over the limit
    #[serde(default = "default_block_duration")]
    pub block_duration_secs: u64,
}

impl Default for LoginRateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_secs: default_window(),
            block_duration_secs: default_block_duration(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_window() -> u64 {
    60
}

fn default_block_duration() -> u64 {
    60
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of pooled connections
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Connection attempts before giving up
    #[serde(default = "default_connect_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between connection attempts, in seconds
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            pool_size: default_pool_size(),
            max_attempts: default_connect_attempts(),
            retry_delay_secs: default_retry_delay(),
        }
    }
}

impl DatabaseConfig {
    /// Retry policy for connection acquisition: fixed delay, no jitter
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_backoff_secs: self.retry_delay_secs,
            max_backoff_secs: self.retry_delay_secs,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }
}

fn default_database_path() -> String {
    "/data/db/productivity.db".to_string()
}

fn default_pool_size() -> usize {
    5
}

fn default_connect_attempts() -> u32 {
    5
}

fn default_retry_delay() -> u64 {
    2
}

/// Retry policy for an operation
///
/// Built from the section that owns the operation, see
/// [`DatabaseConfig::retry_config`].
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,

    /// Initial backoff duration in seconds
    pub initial_backoff_secs: u64,

    /// Maximum backoff duration in seconds
    pub max_backoff_secs: u64,

    /// Backoff multiplier
    pub backoff_multiplier: f64,

    /// Whether to add jitter to backoff
    pub jitter: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format ("json" or "pretty")
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

/// Configuration error types
#[derive(Debug, thiserror::Error, Clone, PartialEq)]
pub enum ConfigError {
    /// Error reading configuration file
    #[error("Failed to read configuration file: {0}")]
    FileRead(String),

    /// Error parsing configuration
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Invalid configuration value
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// Missing required configuration
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
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

#[cfg(test)]
mod tests {
    use super::*;

    // Test 1: Parse complete configuration from YAML
    #[test]
    fn test_parse_complete_yaml_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 9090

auth:
  jwt_secret: "secret123"
  token_ttl_secs: 3600
  pbkdf2_rounds: 1000
  revocation_sweep_secs: 60
  rate_limit:
    max_attempts: 5
    window_secs: 30
    block_duration_secs: 120

database:
  path: "/tmp/test.db"
  pool_size: 8
  max_attempts: 3
  retry_delay_secs: 1

logging:
  level: "debug"
  format: "pretty"
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 9090);

        assert_eq!(config.auth.jwt_secret, Some("secret123".to_string()));
        assert_eq!(config.auth.token_ttl_secs, 3600);
        assert_eq!(config.auth.pbkdf2_rounds, 1000);
        assert_eq!(config.auth.revocation_sweep_secs, 60);
        assert_eq!(config.auth.rate_limit.max_attempts, 5);
        assert_eq!(config.auth.rate_limit.window_secs, 30);
        assert_eq!(config.auth.rate_limit.block_duration_secs, 120);

        assert_eq!(config.database.path, "/tmp/test.db");
        assert_eq!(config.database.pool_size, 8);
        assert_eq!(config.database.max_attempts, 3);
        assert_eq!(config.database.retry_delay_secs, 1);

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, "pretty");
    }

    // Test 2: Default values are applied for missing fields
    #[test]
    fn test_default_values_applied() {
        let yaml = r#"
server:
  port: 3000
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);

        assert_eq!(config.auth.jwt_secret, None);
        assert_eq!(config.auth.token_ttl_secs, 86400);
        assert_eq!(config.auth.pbkdf2_rounds, 29000);
        assert_eq!(config.auth.rate_limit.max_attempts, 10);
        assert_eq!(config.auth.rate_limit.window_secs, 60);

        assert_eq!(config.database.pool_size, 5);
        assert_eq!(config.database.max_attempts, 5);
        assert_eq!(config.database.retry_delay_secs, 2);

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "json");
    }

    // Test 3: Environment variable expansion
    #[test]
    fn test_env_var_expansion() {
        std::env::set_var("TEST_PA_JWT_SECRET", "env_secret");
        std::env::set_var("TEST_PA_DB_PATH", "/var/data/test.db");

        let yaml = r#"
auth:
  jwt_secret: "${TEST_PA_JWT_SECRET}"

database:
  path: "${TEST_PA_DB_PATH}"
"#;

        let config = Config::from_yaml(yaml).unwrap();

        assert_eq!(config.auth.jwt_secret, Some("env_secret".to_string()));
        assert_eq!(config.database.path, "/var/data/test.db");

        std::env::remove_var("TEST_PA_JWT_SECRET");
        std::env::remove_var("TEST_PA_DB_PATH");
    }

    // Test 4: from_env loads config from environment variables
    #[test]
    fn test_from_env() {
        std::env::set_var("PRODUCTIVITY_API_SERVER_HOST", "localhost");
        std::env::set_var("PRODUCTIVITY_API_SERVER_PORT", "9999");
        std::env::set_var("PRODUCTIVITY_API_JWT_SECRET", "from-env");
        std::env::set_var("PRODUCTIVITY_API_TOKEN_TTL_SECS", "7200");
        std::env::set_var("PRODUCTIVITY_API_DATABASE_PATH", "/env/test.db");
        std::env::set_var("PRODUCTIVITY_API_DATABASE_POOL_SIZE", "3");

        let config = Config::from_env().unwrap();

        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.auth.jwt_secret, Some("from-env".to_string()));
        assert_eq!(config.auth.token_ttl_secs, 7200);
        assert_eq!(config.database.path, "/env/test.db");
        assert_eq!(config.database.pool_size, 3);

        std::env::remove_var("PRODUCTIVITY_API_SERVER_HOST");
        std::env::remove_var("PRODUCTIVITY_API_SERVER_PORT");
        std::env::remove_var("PRODUCTIVITY_API_JWT_SECRET");
        std::env::remove_var("PRODUCTIVITY_API_TOKEN_TTL_SECS");
        std::env::remove_var("PRODUCTIVITY_API_DATABASE_PATH");
        std::env::remove_var("PRODUCTIVITY_API_DATABASE_POOL_SIZE");
    }

    // Test 5: Parse error for invalid YAML
    #[test]
    fn test_parse_error_invalid_yaml() {
        let yaml = r#"
server:
  port: "not_a_number"
"#;

        let result = Config::from_yaml(yaml);
        match result {
            Err(ConfigError::Parse(msg)) => {
                assert!(msg.contains("Failed to parse YAML"));
            }
            _ => panic!("Expected ConfigError::Parse"),
        }
    }

    // Test 6: Validation requires a signing secret
    #[test]
    fn test_validate_requires_secret() {
        let config = Config::default();
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingRequired("auth.jwt_secret".to_string()))
        );

        let mut config = Config::default();
        config.auth.jwt_secret = Some("   ".to_string());
        assert!(config.validate().is_err());

        config.auth.jwt_secret = Some("s3cret".to_string());
        assert!(config.validate().is_ok());
    }

    // Test 7: Validation rejects an empty pool
    #[test]
    fn test_validate_rejects_zero_pool() {
        let mut config = Config::default();
        config.auth.jwt_secret = Some("s3cret".to_string());
        config.database.pool_size = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    // Test 8: Connection retry policy is a fixed delay
    #[test]
    fn test_database_retry_config_is_fixed() {
        let db = DatabaseConfig::default();
        let retry = db.retry_config();

        assert_eq!(retry.max_attempts, 5);
        assert_eq!(retry.initial_backoff_secs, 2);
        assert_eq!(retry.max_backoff_secs, 2);
        assert!((retry.backoff_multiplier - 1.0).abs() < f64::EPSILON);
        assert!(!retry.jitter);
    }

    // Test 9: Empty YAML results in defaults
    #[test]
    fn test_empty_yaml_defaults() {
        let config = Config::from_yaml("{}").unwrap();
        assert_eq!(config, Config::default());
    }

    // Test 10: Shipped example config parses
    #[test]
    fn test_example_config_parses() {
        let config = Config::from_yaml(include_str!("../../config.example.yaml")).unwrap();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.auth.rate_limit.max_attempts, 10);
        assert_eq!(config.database.pool_size, 5);
        assert!(config.auth.jwt_secret.is_some());
    }

    // Test 11: Zero hashing rounds and oversized token lifetimes are rejected
    #[test]
    fn test_validate_rejects_bad_auth_values() {
        let mut config = Config::default();
        config.auth.jwt_secret = Some("s3cret".to_string());
        config.auth.pbkdf2_rounds = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        config.auth.pbkdf2_rounds = 29000;
        config.auth.token_ttl_secs = u64::MAX;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));

        config.auth.token_ttl_secs = MAX_TOKEN_TTL_SECS;
        assert!(config.validate().is_ok());
    }
}
