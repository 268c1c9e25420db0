//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Fills `firetail.api_token` when the file leaves it empty.
pub const API_TOKEN_ENV: &str = "FIRETAIL_API_TOKEN";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&content, std::env::var(API_TOKEN_ENV).ok())
}

/// Parse and validate TOML text. `env_token` stands in for an empty `api_token`.
pub fn parse_config(content: &str, env_token: Option<String>) -> Result<ProxyConfig, ConfigError> {
    let mut config: ProxyConfig = toml::from_str(content).map_err(ConfigError::Parse)?;
    apply_env_token(&mut config, env_token);

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Defaults plus the token from the environment, for runs without a config file.
pub fn default_config() -> ProxyConfig {
    let mut config = ProxyConfig::default();
    apply_env_token(&mut config, std::env::var(API_TOKEN_ENV).ok());
    config
}

fn apply_env_token(config: &mut ProxyConfig, env_token: Option<String>) {
    if config.firetail.api_token.is_empty() {
        if let Some(token) = env_token.filter(|t| !t.is_empty()) {
            config.firetail.api_token = token;
        }
    }
}
