//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::config::schema::{AppConfig, Environment};
use crate::config::secret::Secret;
use crate::config::validation::{validate_config, ValidationError};

/// Variable selecting the deployment environment.
pub const ENVIRONMENT_VAR: &str = "APP_ENV";

/// Variable carrying the session secret.
pub const SESSION_SECRET_VAR: &str = "APP_SESSION_SECRET";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unknown environment {0:?} (expected development, test or production)")]
    UnknownEnvironment(String),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration using the real process environment.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    load_config_with(path, |key| std::env::var(key).ok())
}

/// Load and validate configuration, resolving environment values through
/// `lookup`.
pub fn load_config_with<F>(path: Option<&Path>, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let content = match path {
        Some(path) => fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?,
        None => String::new(),
    };
    parse_config(&content, lookup)
}

/// Parse TOML content, overlay the environment and validate.
pub fn parse_config<F>(content: &str, lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config: AppConfig = toml::from_str(content)?;

    if let Some(value) = lookup(ENVIRONMENT_VAR) {
        config.environment =
            Environment::parse(&value).ok_or(ConfigError::UnknownEnvironment(value))?;
    }

    config.session_secret = resolve_secret(config.environment, lookup(SESSION_SECRET_VAR));

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Only development falls back to a deterministic secret. Anywhere else a
/// missing secret stays missing and validation rejects it.
fn resolve_secret(environment: Environment, provided: Option<String>) -> Option<Secret<String>> {
    match provided.filter(|s| !s.is_empty()) {
        Some(secret) => Some(Secret::new(secret)),
        None if environment.is_development() => Some(Secret::new(development_secret())),
        None => None,
    }
}

fn development_secret() -> String {
    let digest = Sha256::digest(b"app-server development session secret");
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_development_defaults_secret() {
        let config = parse_config("", env(&[])).unwrap();
        assert_eq!(config.environment, Environment::Development);
        let secret = config.session_secret.unwrap();
        assert_eq!(secret.expose_secret().len(), 64);
        assert_eq!(secret.expose_secret(), &development_secret());
    }

    #[test]
    fn test_production_requires_secret() {
        let err = parse_config("", env(&[("APP_ENV", "production")])).unwrap_err();
        match err {
            ConfigError::Validation(errors) => {
                assert_eq!(errors, vec![ValidationError::MissingSecret(Environment::Production)]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_test_environment_requires_secret() {
        let err = parse_config("environment = \"test\"", env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_env_overrides_file() {
        let secret = "k".repeat(64);
        let config = parse_config(
            "environment = \"development\"",
            env(&[("APP_ENV", "production"), ("APP_SESSION_SECRET", &secret)]),
        )
        .unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.session_secret.unwrap().expose_secret(), &secret);
    }

    #[test]
    fn test_unknown_environment() {
        let err = parse_config("", env(&[("APP_ENV", "staging")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownEnvironment(v) if v == "staging"));
    }

    #[test]
    fn test_missing_file() {
        let err = load_config_with(Some(Path::new("/nonexistent/app.toml")), env(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
