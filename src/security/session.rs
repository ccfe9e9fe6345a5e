//! Client-side sessions in a signed cookie.
//!
//! # Cookie Format
//! ```text
//! v1.<base64url(json payload)>.<base64url(hmac-sha256(secret, "v1.<payload>"))>
//!
//! payload = { "c": created_at, "r": refreshed_at, "d": { key: value, ... } }
//! ```
//!
//! # Design Decisions
//! - Fail open: anything that does not verify loads as an empty session
//! - Signature checked in constant time before the payload is decoded
//! - Cookies older than `max_age_secs` are treated as absent
//! - Only emitted when modified, or when the refresh stamp is due for rotation

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

use crate::config::schema::SessionConfig;
use crate::config::secret::Secret;

type HmacSha256 = Hmac<Sha256>;

const FORMAT_VERSION: &str = "v1";

/// Session mapping as stored in the cookie.
pub type SessionData = BTreeMap<String, Value>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid session key")]
    InvalidKey,

    #[error("session cookie is {size} bytes, limit is {max}")]
    CookieTooLarge { size: usize, max: usize },

    #[error("session serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Mutable key-value session for the lifetime of one request.
#[derive(Debug, Clone, Default)]
pub struct Session {
    data: SessionData,
    created_at: u64,
    refreshed_at: u64,
    loaded: bool,
    modified: bool,
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

impl Session {
    /// A fresh, empty session.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }

    /// Deserialize a stored value; `None` when absent or of another shape.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.data
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
        self.modified = true;
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let removed = self.data.remove(key);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    pub fn clear(&mut self) {
        if !self.data.is_empty() {
            self.data.clear();
            self.modified = true;
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &SessionData {
        &self.data
    }

    /// True once any mutation happened during this request.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// True when the session came from a verified cookie.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

#[derive(Serialize, Deserialize)]
struct CookiePayload {
    #[serde(rename = "c")]
    created_at: u64,
    #[serde(rename = "r")]
    refreshed_at: u64,
    #[serde(rename = "d")]
    data: SessionData,
}

/// Signs and verifies session cookies with the process-wide secret.
#[derive(Clone)]
pub struct SessionStore {
    mac: HmacSha256,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(secret: &Secret<String>, config: SessionConfig) -> Result<Self, SessionError> {
        let mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
            .map_err(|_| SessionError::InvalidKey)?;
        Ok(Self { mac, config })
    }

    pub fn cookie_name(&self) -> &str {
        &self.config.cookie_name
    }

    /// Load a session from a cookie value. Never fails.
    pub fn load(&self, cookie: Option<&str>) -> Session {
        self.load_at(cookie, unix_now())
    }

    pub fn load_at(&self, cookie: Option<&str>, now: u64) -> Session {
        let Some(cookie) = cookie else {
            return Session::new();
        };
        match self.verify(cookie) {
            Some(payload) if payload.created_at.saturating_add(self.config.max_age_secs) >= now => {
                Session {
                    data: payload.data,
                    created_at: payload.created_at,
                    refreshed_at: payload.refreshed_at,
                    loaded: true,
                    modified: false,
                }
            }
            Some(_) => {
                tracing::debug!("Session cookie expired, starting empty session");
                Session::new()
            }
            None => {
                tracing::debug!("Session cookie failed verification, starting empty session");
                Session::new()
            }
        }
    }

    fn verify(&self, cookie: &str) -> Option<CookiePayload> {
        let (signed, signature) = cookie.rsplit_once('.')?;
        let payload = signed.strip_prefix(FORMAT_VERSION)?.strip_prefix('.')?;
        let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;

        let mut mac = self.mac.clone();
        mac.update(signed.as_bytes());
        mac.verify_slice(&signature).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    /// Whether the session must be written back into the response.
    pub fn needs_save(&self, session: &Session, now: u64) -> bool {
        session.modified
            || (session.loaded
                && now.saturating_sub(session.refreshed_at) >= self.config.rotate_after_secs)
    }

    /// Serialize and sign a session into a cookie value.
    pub fn save(&self, session: &Session) -> Result<String, SessionError> {
        self.save_at(session, unix_now())
    }

    pub fn save_at(&self, session: &Session, now: u64) -> Result<String, SessionError> {
        let payload = CookiePayload {
            created_at: if session.loaded { session.created_at } else { now },
            refreshed_at: now,
            data: session.data.clone(),
        };
        let json = serde_json::to_vec(&payload)?;
        let signed = format!("{}.{}", FORMAT_VERSION, URL_SAFE_NO_PAD.encode(json));

        let mut mac = self.mac.clone();
        mac.update(signed.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        let cookie = format!("{}.{}", signed, signature);
        if cookie.len() > self.config.max_cookie_bytes {
            return Err(SessionError::CookieTooLarge {
                size: cookie.len(),
                max: self.config.max_cookie_bytes,
            });
        }
        Ok(cookie)
    }

    /// `Set-Cookie` header value for a saved session.
    pub fn set_cookie(&self, value: &str) -> String {
        let mut cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.config.cookie_name, value
        );
        if self.config.secure {
            cookie.push_str("; Secure");
        }
        cookie
    }
}

pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
