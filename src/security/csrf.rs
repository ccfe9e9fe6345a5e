//! Anti-forgery tokens bound to the session.
//!
//! # Responsibilities
//! - Issue one random token per session, stored in the session itself
//! - Validate the token submitted with every state-changing request
//!
//! # Design Decisions
//! - Safe methods (GET, HEAD, OPTIONS, TRACE) bypass validation
//! - Token accepted from the form field or the request header
//! - Comparison is constant time
//! - A session without a token cannot validate anything: no token is minted during validation

use axum::http::{HeaderMap, Method};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::schema::CsrfConfig;
use crate::security::session::Session;

/// Session key holding the token.
pub const SESSION_KEY: &str = "_csrf";

const TOKEN_BYTES: usize = 32;

/// Why a request was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidToken {
    #[error("no security token was submitted")]
    Missing,

    #[error("the session has no security token")]
    NoSessionToken,

    #[error("the submitted security token does not match")]
    Mismatch,
}

/// Issues and checks session-bound tokens.
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    config: CsrfConfig,
}

impl CsrfGuard {
    pub fn new(config: CsrfConfig) -> Self {
        Self { config }
    }

    pub fn field_name(&self) -> &str {
        &self.config.field_name
    }

    pub fn header_name(&self) -> &str {
        &self.config.header_name
    }

    /// The session's token, created and stored on first access.
    pub fn token_for(&self, session: &mut Session) -> String {
        if let Some(token) = session.get_str(SESSION_KEY) {
            return token.to_string();
        }
        let token = generate_token();
        session.insert(SESSION_KEY, token.clone());
        token
    }

    /// Replace the session's token, e.g. after login.
    pub fn rotate(&self, session: &mut Session) -> String {
        let token = generate_token();
        session.insert(SESSION_KEY, token.clone());
        token
    }

    /// Methods that never change state.
    pub fn is_safe_method(method: &Method) -> bool {
        matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE)
    }

    /// Check a request. A non-empty form value is consulted before the header.
    pub fn validate(
        &self,
        method: &Method,
        headers: &HeaderMap,
        form_token: Option<&str>,
        session: &Session,
    ) -> Result<(), InvalidToken> {
        if Self::is_safe_method(method) {
            return Ok(());
        }

        let submitted = form_token
            .filter(|t| !t.is_empty())
            .or_else(|| {
                headers
                    .get(self.config.header_name.as_str())
                    .and_then(|v| v.to_str().ok())
                    .filter(|t| !t.is_empty())
            })
            .ok_or(InvalidToken::Missing)?;

        let expected = session
            .get_str(SESSION_KEY)
            .ok_or(InvalidToken::NoSessionToken)?;

        if bool::from(submitted.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(InvalidToken::Mismatch)
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn guard() -> CsrfGuard {
        CsrfGuard::new(CsrfConfig::default())
    }

    #[test]
    fn test_token_is_stable() {
        let guard = guard();
        let mut session = Session::new();
        let first = guard.token_for(&mut session);
        let second = guard.token_for(&mut session);
        assert_eq!(first, second);
        assert_eq!(session.get_str(SESSION_KEY), Some(first.as_str()));
        assert!(session.is_modified());
    }

    #[test]
    fn test_rotate_changes_token() {
        let guard = guard();
        let mut session = Session::new();
        let first = guard.token_for(&mut session);
        let rotated = guard.rotate(&mut session);
        assert_ne!(first, rotated);
        assert_eq!(guard.token_for(&mut session), rotated);
    }

    #[test]
    fn test_safe_methods_bypass() {
        let guard = guard();
        let session = Session::new();
        for method in [Method::GET, Method::HEAD, Method::OPTIONS] {
            assert!(guard.validate(&method, &HeaderMap::new(), None, &session).is_ok());
        }
    }

    #[test]
    fn test_state_changing_requires_token() {
        let guard = guard();
        let mut session = Session::new();
        let token = guard.token_for(&mut session);
        let headers = HeaderMap::new();

        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            assert_eq!(
                guard.validate(&method, &headers, None, &session),
                Err(InvalidToken::Missing)
            );
            assert_eq!(
                guard.validate(&method, &headers, Some("wrong"), &session),
                Err(InvalidToken::Mismatch)
            );
            assert!(guard.validate(&method, &headers, Some(&token), &session).is_ok());
        }
    }

    #[test]
    fn test_header_token() {
        let guard = guard();
        let mut session = Session::new();
        let token = guard.token_for(&mut session);
        let mut headers = HeaderMap::new();
        headers.insert("x-csrf-token", HeaderValue::from_str(&token).unwrap());
        assert!(guard.validate(&Method::POST, &headers, None, &session).is_ok());
        assert!(guard.validate(&Method::POST, &headers, Some(""), &session).is_ok());
        assert_eq!(
            guard.validate(&Method::POST, &HeaderMap::new(), Some(""), &session),
            Err(InvalidToken::Missing)
        );
    }

    #[test]
    fn test_session_without_token() {
        let guard = guard();
        assert_eq!(
            guard.validate(&Method::POST, &HeaderMap::new(), Some("anything"), &Session::new()),
            Err(InvalidToken::NoSessionToken)
        );
    }
}
