//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Enforce secret provisioning (present and long enough)
//! - Validate values that end up in headers and cookies
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::schema::{AppConfig, Environment};

/// Shortest accepted session secret, in bytes.
pub const MIN_SECRET_LEN: usize = 64;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("session secret is required in {0} (set APP_SESSION_SECRET)")]
    MissingSecret(Environment),

    #[error("session secret must be at least {min} bytes, got {actual}")]
    SecretTooShort { min: usize, actual: usize },

    #[error("invalid session cookie name {0:?}")]
    CookieName(String),

    #[error("invalid CSRF form field name {0:?}")]
    CsrfField(String),

    #[error("invalid CSRF header name {0:?}")]
    CsrfHeader(String),

    #[error("invalid stylesheet origin {0:?}")]
    StyleOrigin(String),

    #[error("invalid Strict-Transport-Security value {0:?}")]
    Hsts(String),

    #[error("invalid bind address {0:?}")]
    BindAddress(String),

    #[error("asset prefix must start with '/', got {0:?}")]
    AssetPrefix(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Validate the whole configuration, collecting every error.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    match &config.session_secret {
        None => errors.push(ValidationError::MissingSecret(config.environment)),
        Some(secret) => {
            let len = secret.expose_secret().len();
            if len < MIN_SECRET_LEN {
                errors.push(ValidationError::SecretTooShort {
                    min: MIN_SECRET_LEN,
                    actual: len,
                });
            }
        }
    }

    let cookie_name = &config.session.cookie_name;
    if cookie_name.is_empty() || !cookie_name.chars().all(is_cookie_name_char) {
        errors.push(ValidationError::CookieName(cookie_name.clone()));
    }

    let field = &config.csrf.field_name;
    if field.is_empty() || field.chars().any(|c| c.is_whitespace() || c == '&' || c == '=') {
        errors.push(ValidationError::CsrfField(field.clone()));
    }

    if HeaderName::from_bytes(config.csrf.header_name.as_bytes()).is_err() {
        errors.push(ValidationError::CsrfHeader(config.csrf.header_name.clone()));
    }

    let origin = &config.security.style_origin;
    if origin.is_empty()
        || origin.chars().any(|c| c.is_whitespace() || c == ';' || c == ',' || c.is_control())
    {
        errors.push(ValidationError::StyleOrigin(origin.clone()));
    }

    if let Some(hsts) = &config.security.strict_transport_security {
        if HeaderValue::from_str(hsts).is_err() {
            errors.push(ValidationError::Hsts(hsts.clone()));
        }
    }

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if !config.assets.prefix.starts_with('/') {
        errors.push(ValidationError::AssetPrefix(config.assets.prefix.clone()));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::Zero("timeouts.request_secs"));
    }
    if config.security.max_body_size == 0 {
        errors.push(ValidationError::Zero("security.max_body_size"));
    }
    if config.session.max_age_secs == 0 {
        errors.push(ValidationError::Zero("session.max_age_secs"));
    }
    if config.session.max_cookie_bytes == 0 {
        errors.push(ValidationError::Zero("session.max_cookie_bytes"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

// RFC 6265 cookie-name token characters.
fn is_cookie_name_char(c: char) -> bool {
    c.is_ascii_graphic() && !"()<>@,;:\\\"/[]?={}".contains(c)
}
