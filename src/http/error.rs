//! Errors raised by route handlers.

use std::any::{type_name, Any, TypeId};
use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use axum::response::Response;
use thiserror::Error;

/// Malformed or missing typed request parameter. Always a client error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("missing parameter {0:?}")]
    Missing(String),

    #[error("parameter {key:?} is not a valid {expected}")]
    Invalid { key: String, expected: &'static str },

    #[error("parameter {key:?} is out of range for {expected}")]
    OutOfRange { key: String, expected: &'static str },
}

/// Any failure raised by a handler.
///
/// Every `std::error::Error` converts into it with `?`. The concrete type
/// name and a backtrace are captured at conversion time so diagnostics can
/// show where the failure came from.
pub struct HandlerError {
    inner: Box<dyn StdError + Send + Sync + 'static>,
    type_name: &'static str,
    backtrace: Backtrace,
}

/// Result type returned by handlers.
pub type HandlerResult = Result<Response, HandlerError>;

#[derive(Debug)]
struct Message(String);

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl StdError for Message {}

impl HandlerError {
    /// A failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self {
            inner: Box::new(Message(message.into())),
            type_name: "HandlerError",
            backtrace: Backtrace::force_capture(),
        }
    }

    /// A handler that panicked. The payload message is kept when it is a string.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "handler panicked".to_string()
        };
        Self {
            inner: Box::new(Message(message)),
            type_name: "panic",
            backtrace: Backtrace::force_capture(),
        }
    }

    /// Name of the concrete error type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// The wrapped parameter error, if that is what this is.
    pub fn as_parameter_error(&self) -> Option<&ParameterError> {
        self.downcast_ref::<ParameterError>()
    }

    /// Messages of this error and all its sources, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.inner.to_string()];
        let mut source = self.inner.source();
        while let Some(err) = source {
            messages.push(err.to_string());
            source = err.source();
        }
        messages
    }
}

impl<E> From<E> for HandlerError
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        // Parameter errors are client errors and never show a trace.
        let backtrace = if TypeId::of::<E>() == TypeId::of::<ParameterError>() {
            Backtrace::disabled()
        } else {
            Backtrace::force_capture()
        };
        Self {
            inner: Box::new(error),
            type_name: type_name::<E>(),
            backtrace,
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl fmt::Debug for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::backtrace::BacktraceStatus;

    #[derive(Debug, Error)]
    #[error("outer failure")]
    struct Outer(#[source] std::io::Error);

    fn fails() -> Result<(), HandlerError> {
        Err::<(), _>(Outer(std::io::Error::other("disk gone")))?;
        Ok(())
    }

    #[test]
    fn test_question_mark_conversion() {
        let err = fails().unwrap_err();
        assert!(err.type_name().ends_with("Outer"));
        assert_eq!(err.to_string(), "outer failure");
        assert_eq!(err.chain(), vec!["outer failure", "disk gone"]);
        assert!(err.downcast_ref::<Outer>().is_some());
        assert!(err.as_parameter_error().is_none());
    }

    #[test]
    fn test_parameter_error_recognised() {
        let err: HandlerError = ParameterError::Missing("id".into()).into();
        assert_eq!(err.as_parameter_error(), Some(&ParameterError::Missing("id".into())));
        assert_eq!(err.backtrace().status(), BacktraceStatus::Disabled);
    }

    #[test]
    fn test_server_errors_capture_backtrace() {
        let err = fails().unwrap_err();
        assert_ne!(err.backtrace().status(), BacktraceStatus::Disabled);
    }

    #[test]
    fn test_from_panic_payload() {
        let err = HandlerError::from_panic(Box::new("index out of bounds"));
        assert_eq!(err.type_name(), "panic");
        assert_eq!(err.to_string(), "index out of bounds");

        let err = HandlerError::from_panic(Box::new(String::from("boom")));
        assert_eq!(err.to_string(), "boom");

        let err = HandlerError::from_panic(Box::new(42u8));
        assert_eq!(err.to_string(), "handler panicked");
    }

    #[test]
    fn test_msg() {
        let err = HandlerError::msg("nope");
        assert_eq!(err.type_name(), "HandlerError");
        assert_eq!(format!("{:?}", err), "HandlerError: nope");
    }
}
