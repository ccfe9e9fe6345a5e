//! Per-request state handed to route handlers.
//!
//! # Responsibilities
//! - Hold method, path, headers, cookies and query/form parameters
//! - Own the request's session and flash messages
//! - Parse parameters into sized integers and other scalars
//!
//! # Design Decisions
//! - Built once per request by the pipeline, dropped after the response
//! - Later parameter values win over earlier ones with the same name
//! - Flash values set now are only visible during the next request

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::header::COOKIE;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{Html, IntoResponse};
use serde_json::Value;

use crate::http::error::{HandlerResult, ParameterError};
use crate::security::csrf::CsrfGuard;
use crate::security::session::Session;
use crate::view::{escape_html, Locals, RenderError, Renderer, TITLE};

/// Session key carrying flash messages between requests.
pub const FLASH_KEY: &str = "_flash";

/// Query and form parameters in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` string (query or body).
    pub fn parse(input: &[u8]) -> Self {
        let mut params = Self::new();
        params.extend_urlencoded(input);
        params
    }

    pub fn extend_urlencoded(&mut self, input: &[u8]) {
        self.pairs.extend(
            url::form_urlencoded::parse(input).map(|(k, v)| (k.into_owned(), v.into_owned())),
        );
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    /// The last value given for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn typed(&self) -> TypedParams<'_> {
        TypedParams { params: self }
    }
}

/// Integer types parameters can be parsed into.
pub trait SizedInt: Copy + Sized {
    const NAME: &'static str;
    fn from_i128(value: i128) -> Option<Self>;
    fn is_positive(self) -> bool;
}

macro_rules! sized_int {
    ($($t:ty),*) => {
        $(
            impl SizedInt for $t {
                const NAME: &'static str = stringify!($t);

                fn from_i128(value: i128) -> Option<Self> {
                    <$t>::try_from(value).ok()
                }

                #[allow(unused_comparisons)]
                fn is_positive(self) -> bool {
                    self > 0
                }
            }
        )*
    };
}

sized_int!(i8, i16, i32, i64, u8, u16, u32, u64);

/// Typed view over [`Params`].
///
/// Optional accessors return `Ok(None)` for absent or blank values; the
/// `require_*` forms turn that into [`ParameterError::Missing`].
#[derive(Debug, Clone, Copy)]
pub struct TypedParams<'a> {
    params: &'a Params,
}

impl<'a> TypedParams<'a> {
    fn present(&self, key: &str) -> Option<&'a str> {
        self.params.get(key).map(str::trim).filter(|v| !v.is_empty())
    }

    /// Raw string value, possibly empty.
    pub fn str(&self, key: &str) -> Option<&'a str> {
        self.params.get(key)
    }

    /// Trimmed, non-empty string value.
    pub fn nonempty_str(&self, key: &str) -> Option<&'a str> {
        self.present(key)
    }

    pub fn require_str(&self, key: &str) -> Result<&'a str, ParameterError> {
        self.present(key)
            .ok_or_else(|| ParameterError::Missing(key.to_string()))
    }

    /// Integer of the requested size (64-bit when unsure).
    pub fn int<T: SizedInt>(&self, key: &str) -> Result<Option<T>, ParameterError> {
        let Some(raw) = self.present(key) else {
            return Ok(None);
        };
        let wide = raw.parse::<i128>().map_err(|e| match e.kind() {
            std::num::IntErrorKind::PosOverflow | std::num::IntErrorKind::NegOverflow => {
                ParameterError::OutOfRange {
                    key: key.to_string(),
                    expected: T::NAME,
                }
            }
            _ => ParameterError::Invalid {
                key: key.to_string(),
                expected: T::NAME,
            },
        })?;
        T::from_i128(wide)
            .map(Some)
            .ok_or_else(|| ParameterError::OutOfRange {
                key: key.to_string(),
                expected: T::NAME,
            })
    }

    pub fn require_int<T: SizedInt>(&self, key: &str) -> Result<T, ParameterError> {
        self.int(key)?
            .ok_or_else(|| ParameterError::Missing(key.to_string()))
    }

    /// Integer greater than zero.
    pub fn pos_int<T: SizedInt>(&self, key: &str) -> Result<Option<T>, ParameterError> {
        match self.int::<T>(key)? {
            Some(v) if v.is_positive() => Ok(Some(v)),
            Some(_) => Err(ParameterError::OutOfRange {
                key: key.to_string(),
                expected: "positive integer",
            }),
            None => Ok(None),
        }
    }

    pub fn require_pos_int<T: SizedInt>(&self, key: &str) -> Result<T, ParameterError> {
        self.pos_int(key)?
            .ok_or_else(|| ParameterError::Missing(key.to_string()))
    }

    /// Boolean from the usual form spellings.
    pub fn bool(&self, key: &str) -> Result<Option<bool>, ParameterError> {
        let Some(raw) = self.present(key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "1" | "t" | "true" | "y" | "yes" | "on" => Ok(Some(true)),
            "0" | "f" | "false" | "n" | "no" | "off" => Ok(Some(false)),
            _ => Err(ParameterError::Invalid {
                key: key.to_string(),
                expected: "boolean",
            }),
        }
    }

    pub fn float(&self, key: &str) -> Result<Option<f64>, ParameterError> {
        let Some(raw) = self.present(key) else {
            return Ok(None);
        };
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .map(Some)
            .ok_or_else(|| ParameterError::Invalid {
                key: key.to_string(),
                expected: "number",
            })
    }
}

/// Parse every `Cookie` header into a name → value map.
pub fn parse_cookies(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            Some((name.trim().to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Everything a handler can see and touch for one request.
pub struct RequestContext {
    method: Method,
    path: String,
    key: String,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    params: Params,
    session: Session,
    flash_now: Locals,
    flash_next: Locals,
    renderer: Arc<dyn Renderer>,
    csrf: Arc<CsrfGuard>,
}

impl RequestContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        method: Method,
        path: impl Into<String>,
        key: impl Into<String>,
        headers: HeaderMap,
        params: Params,
        mut session: Session,
        renderer: Arc<dyn Renderer>,
        csrf: Arc<CsrfGuard>,
    ) -> Self {
        let cookies = parse_cookies(&headers);
        let flash_now = match session.remove(FLASH_KEY) {
            Some(Value::Object(map)) => map,
            _ => Locals::new(),
        };
        Self {
            method,
            path: path.into(),
            key: key.into(),
            headers,
            cookies,
            params,
            session,
            flash_now,
            flash_next: Locals::new(),
            renderer,
            csrf,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Dispatch key the request was routed by.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    pub fn typed(&self) -> TypedParams<'_> {
        self.params.typed()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The session's anti-forgery token for embedding in forms.
    pub fn csrf_token(&mut self) -> String {
        self.csrf.token_for(&mut self.session)
    }

    /// Hidden input carrying the token.
    pub fn csrf_field(&mut self) -> String {
        let token = self.csrf_token();
        format!(
            "<input type=\"hidden\" name=\"{}\" value=\"{}\">",
            escape_html(self.csrf.field_name()),
            escape_html(&token)
        )
    }

    /// Flash value set by the previous request.
    pub fn flash(&self, key: &str) -> Option<&Value> {
        self.flash_now.get(key)
    }

    /// Set a flash value for the next request.
    pub fn flash_set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.flash_next.insert(key.into(), value.into());
    }

    /// Render a view in the layout.
    pub fn render(&self, view: &str, locals: &Locals) -> Result<String, RenderError> {
        self.renderer.render(view, locals)
    }

    /// Render a view in the layout as a 200 response.
    pub fn view(&self, view: &str, locals: Locals) -> HandlerResult {
        Ok(Html(self.render(view, &locals)?).into_response())
    }

    /// Render with just a page title.
    pub fn view_titled(&self, view: &str, title: &str) -> HandlerResult {
        let mut locals = Locals::new();
        locals.insert(TITLE.to_string(), Value::String(title.to_string()));
        self.view(view, locals)
    }

    pub fn status_view(&self, status: StatusCode, view: &str, locals: Locals) -> HandlerResult {
        let mut response = self.view(view, locals)?;
        *response.status_mut() = status;
        Ok(response)
    }

    /// Hand the session back, with pending flash values stored in it.
    pub fn into_session(mut self) -> Session {
        self.take_session()
    }

    /// Like [`into_session`](Self::into_session), leaving an empty session
    /// behind so the rest of the context stays readable.
    pub fn take_session(&mut self) -> Session {
        if !self.flash_next.is_empty() {
            self.session
                .insert(FLASH_KEY, Value::Object(std::mem::take(&mut self.flash_next)));
        }
        std::mem::take(&mut self.session)
    }
}
