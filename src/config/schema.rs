//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.
//! The session secret is deliberately absent from the file format; it only
//! ever arrives through the process environment (see `loader.rs`).

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::secret::Secret;

/// Deployment environment, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Parse the value of `APP_ENV`. Unknown values are rejected rather than
    /// silently treated as development.
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "test" => Some(Self::Test),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root configuration for the application server.
#[derive(Debug, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Deployment mode (overridden by `APP_ENV`).
    pub environment: Environment,

    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Session cookie settings.
    pub session: SessionConfig,

    /// Anti-forgery token settings.
    pub csrf: CsrfConfig,

    /// Response header and request size policy.
    pub security: SecurityConfig,

    /// Handler unit discovery.
    pub routes: RoutesConfig,

    /// View templates.
    pub views: ViewsConfig,

    /// Public files and compiled assets.
    pub assets: AssetsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Session signing secret, resolved from the environment at startup.
    #[serde(skip)]
    pub session_secret: Option<Secret<String>>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:9292").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9292".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request deadline enforced by the hosting server, in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Session cookie configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Cookie name.
    pub cookie_name: String,

    /// Add the `Secure` attribute (HTTPS-only deployments).
    pub secure: bool,

    /// Absolute session lifetime in seconds. Older cookies load as empty.
    pub max_age_secs: u64,

    /// Re-issue an unmodified session once its refresh stamp is this old.
    pub rotate_after_secs: u64,

    /// Largest cookie value the store will emit.
    pub max_cookie_bytes: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "_App.session".to_string(),
            secure: false,
            max_age_secs: 30 * 24 * 3600, // 30 days
            rotate_after_secs: 24 * 3600,
            max_cookie_bytes: 4096,
        }
    }
}

/// Anti-forgery token configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CsrfConfig {
    /// Hidden form field carrying the token.
    pub field_name: String,

    /// Request header carrying the token (for scripted requests).
    pub header_name: String,
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            field_name: "_csrf".to_string(),
            header_name: "X-CSRF-Token".to_string(),
        }
    }
}

/// Security hardening configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// The one external origin allowed for stylesheets.
    pub style_origin: String,

    /// `Strict-Transport-Security` value; only set for HTTPS-only deployments.
    pub strict_transport_security: Option<String>,

    /// Maximum body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            style_origin: "https://maxcdn.bootstrapcdn.com".to_string(),
            strict_transport_security: None,
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Handler unit discovery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Directory scanned for handler units at startup.
    pub dir: PathBuf,

    /// Watch the directory and reload units on change (development only).
    pub hot_reload: bool,
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("routes"),
            hot_reload: true,
        }
    }
}

/// View template configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ViewsConfig {
    /// Directory holding `<name>.html` templates and `layout.html`.
    pub dir: PathBuf,
}

impl Default for ViewsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("views"),
        }
    }
}

/// Static file configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Files served as-is when the request path matches.
    pub public_dir: PathBuf,

    /// Directory holding compiled stylesheet bundles.
    pub assets_dir: PathBuf,

    /// URL prefix reserved for compiled assets.
    pub prefix: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            public_dir: PathBuf::from("public"),
            assets_dir: PathBuf::from("assets"),
            prefix: "/assets".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log format; chosen from the environment when unset.
    pub log_format: Option<LogFormat>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: None,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

impl AppConfig {
    /// A configuration for the given environment with all defaults and the
    /// provided secret.
    pub fn for_environment(environment: Environment, secret: impl Into<String>) -> Self {
        Self {
            environment,
            session_secret: Some(Secret::new(secret.into())),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_parse() {
        assert_eq!(Environment::parse("production"), Some(Environment::Production));
        assert_eq!(Environment::parse(" Test "), Some(Environment::Test));
        assert_eq!(Environment::parse("dev"), Some(Environment::Development));
        assert_eq!(Environment::parse("staging"), None);
    }

    #[test]
    fn test_minimal_toml() {
        let config: AppConfig = toml::from_str("environment = \"production\"\n").unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.session.cookie_name, "_App.session");
        assert_eq!(config.csrf.field_name, "_csrf");
        assert!(config.session_secret.is_none());
    }

    #[test]
    fn test_secret_not_read_from_file() {
        let config: AppConfig = toml::from_str("session_secret = \"x\"\n").unwrap();
        assert!(config.session_secret.is_none());
    }
}
