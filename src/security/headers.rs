//! Security response headers.
//!
//! # Responsibilities
//! - Build the Content-Security-Policy value from declared directives
//! - Hold the fixed header set applied to every response
//! - Apply it without duplicating any header
//!
//! # Design Decisions
//! - Computed once from static configuration; no request dependence
//! - `Content-Type` is a default: a handler that set its own keeps it
//! - Every other header overwrites, so exactly one copy is ever sent

use std::fmt;

use axum::http::header::{
    InvalidHeaderValue, CONTENT_SECURITY_POLICY, CONTENT_TYPE, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::config::schema::SecurityConfig;

/// Default content type for responses that do not set one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/html";

/// A source expression inside a CSP directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CspSource {
    None,
    SelfOrigin,
    Origin(String),
}

impl fmt::Display for CspSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CspSource::None => f.write_str("'none'"),
            CspSource::SelfOrigin => f.write_str("'self'"),
            CspSource::Origin(origin) => f.write_str(origin),
        }
    }
}

/// Ordered list of CSP directives.
#[derive(Debug, Clone, Default)]
pub struct ContentSecurityPolicy {
    directives: Vec<(&'static str, Vec<CspSource>)>,
}

impl ContentSecurityPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a directive.
    pub fn directive(mut self, name: &'static str, sources: Vec<CspSource>) -> Self {
        match self.directives.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = sources,
            None => self.directives.push((name, sources)),
        }
        self
    }

    /// The site policy: nothing by default, same-origin scripts, forms and
    /// connections, stylesheets from self plus one external origin.
    pub fn site(style_origin: &str) -> Self {
        use CspSource::*;
        Self::new()
            .directive("default-src", vec![None])
            .directive("style-src", vec![SelfOrigin, Origin(style_origin.to_string())])
            .directive("form-action", vec![SelfOrigin])
            .directive("script-src", vec![SelfOrigin])
            .directive("connect-src", vec![SelfOrigin])
            .directive("base-uri", vec![None])
            .directive("frame-ancestors", vec![None])
    }

    pub fn header_value(&self) -> String {
        self.directives
            .iter()
            .map(|(name, sources)| {
                let sources: Vec<String> = sources.iter().map(ToString::to_string).collect();
                format!("{} {}", name, sources.join(" "))
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// The fixed header set attached to every response.
#[derive(Debug, Clone)]
pub struct SecurityHeaderPolicy {
    content_type: HeaderValue,
    fixed: Vec<(HeaderName, HeaderValue)>,
}

impl SecurityHeaderPolicy {
    pub fn from_config(config: &SecurityConfig) -> Result<Self, InvalidHeaderValue> {
        let csp = ContentSecurityPolicy::site(&config.style_origin);
        let mut fixed = vec![
            (X_FRAME_OPTIONS, HeaderValue::from_static("deny")),
            (X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff")),
            (X_XSS_PROTECTION, HeaderValue::from_static("1; mode=block")),
            (CONTENT_SECURITY_POLICY, HeaderValue::from_str(&csp.header_value())?),
        ];
        if let Some(hsts) = &config.strict_transport_security {
            fixed.push((STRICT_TRANSPORT_SECURITY, HeaderValue::from_str(hsts)?));
        }

        Ok(Self {
            content_type: HeaderValue::from_static(DEFAULT_CONTENT_TYPE),
            fixed,
        })
    }

    /// The full header mapping.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        self.apply(&mut headers);
        headers
    }

    /// Apply the policy to a response's headers.
    pub fn apply(&self, headers: &mut HeaderMap) {
        if !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, self.content_type.clone());
        }
        for (name, value) in &self.fixed {
            headers.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_csp() {
        let csp = ContentSecurityPolicy::site("https://maxcdn.bootstrapcdn.com");
        assert_eq!(
            csp.header_value(),
            "default-src 'none'; style-src 'self' https://maxcdn.bootstrapcdn.com; \
             form-action 'self'; script-src 'self'; connect-src 'self'; \
             base-uri 'none'; frame-ancestors 'none'"
        );
    }

    #[test]
    fn test_directive_replaces() {
        let csp = ContentSecurityPolicy::new()
            .directive("script-src", vec![CspSource::None])
            .directive("script-src", vec![CspSource::SelfOrigin]);
        assert_eq!(csp.header_value(), "script-src 'self'");
    }

    #[test]
    fn test_fixed_headers() {
        let policy = SecurityHeaderPolicy::from_config(&SecurityConfig::default()).unwrap();
        let headers = policy.headers();
        assert_eq!(headers[CONTENT_TYPE], "text/html");
        assert_eq!(headers[X_FRAME_OPTIONS], "deny");
        assert_eq!(headers[X_CONTENT_TYPE_OPTIONS], "nosniff");
        assert_eq!(headers[X_XSS_PROTECTION], "1; mode=block");
        assert!(headers.contains_key(CONTENT_SECURITY_POLICY));
        assert!(!headers.contains_key(STRICT_TRANSPORT_SECURITY));
    }

    #[test]
    fn test_apply_keeps_content_type_and_dedupes() {
        let policy = SecurityHeaderPolicy::from_config(&SecurityConfig::default()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/css"));
        headers.append(CONTENT_SECURITY_POLICY, HeaderValue::from_static("default-src *"));
        headers.append(CONTENT_SECURITY_POLICY, HeaderValue::from_static("script-src *"));

        policy.apply(&mut headers);

        assert_eq!(headers[CONTENT_TYPE], "text/css");
        assert_eq!(headers.get_all(CONTENT_SECURITY_POLICY).iter().count(), 1);
        assert!(headers[CONTENT_SECURITY_POLICY]
            .to_str()
            .unwrap()
            .starts_with("default-src 'none'"));
    }

    #[test]
    fn test_hsts_when_configured() {
        let config = SecurityConfig {
            strict_transport_security: Some("max-age=16070400;".to_string()),
            ..SecurityConfig::default()
        };
        let headers = SecurityHeaderPolicy::from_config(&config).unwrap().headers();
        assert_eq!(headers[STRICT_TRANSPORT_SECURITY], "max-age=16070400;");
    }
}
