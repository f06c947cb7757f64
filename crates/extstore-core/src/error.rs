//! Error taxonomy shared by every storage backend.

use std::time::Duration;

use strum::{AsRefStr, IntoStaticStr};
use thiserror::Error;

/// Type alias for boxed dynamic errors that can be sent across threads.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync>;

/// Type alias for Results with our custom Error type.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Categories of errors surfaced by external storage operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Invalid storage configuration, detected before any network call.
    Configuration,
    /// Building a client session or resolving its region failed.
    Session,
    /// The requested object (or its bucket) does not exist.
    FileNotFound,
    /// Any other failure reported by the backend or the transport.
    Io,
    /// Malformed glob pattern, or a match outside the declared prefix.
    InvalidPattern,
    /// The operation exceeded its deadline.
    Timeout,
    /// The caller cancelled the operation.
    Cancelled,
}

/// A structured error for external storage operations.
///
/// The message describes the operation (and the object key where one is
/// involved); the source carries the underlying cause. Both end up in the
/// `Display` output.
#[derive(Debug, Error)]
#[error("{}", render(.kind, .message, .source))]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional error message.
    pub message: Option<String>,
    /// Optional source error.
    #[source]
    pub source: Option<BoxedError>,
    retryable: bool,
}

fn render(kind: &ErrorKind, message: &Option<String>, source: &Option<BoxedError>) -> String {
    let head = message.as_deref().unwrap_or_else(|| kind.as_ref());
    match source {
        Some(source) => format!("{head}: {source}"),
        None => head.to_owned(),
    }
}

impl Error {
    /// Creates a new error with the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
            retryable: false,
        }
    }

    /// Adds a message to this error.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a source error to this error.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Marks whether retrying the failed call may succeed.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Wraps this error under an operation message, keeping its kind and
    /// retryability.
    pub fn context(self, message: impl Into<String>) -> Self {
        let kind = self.kind;
        let retryable = self.retryable;
        Self::new(kind)
            .with_message(message)
            .with_retryable(retryable)
            .with_source(self)
    }

    /// Creates a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration).with_message(message)
    }

    /// Creates a new session construction error.
    pub fn session(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Session).with_message(message)
    }

    /// Creates a new file-not-found error.
    pub fn file_not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FileNotFound).with_message(message)
    }

    /// Creates a new generic I/O error.
    pub fn io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io).with_message(message)
    }

    /// Creates a new invalid pattern error.
    pub fn invalid_pattern(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidPattern).with_message(message)
    }

    /// Creates a timeout error for the named operation.
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::new(ErrorKind::Timeout)
            .with_message(format!("{operation} timed out after {after:?}"))
            .with_retryable(true)
    }

    /// Creates a cancellation error for the named operation.
    pub fn cancelled(operation: &str) -> Self {
        Self::new(ErrorKind::Cancelled).with_message(format!("{operation} cancelled"))
    }

    /// Returns the kind of this error.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Whether the caller should retry this operation.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// Whether this error reports a missing object or bucket.
    #[inline]
    pub fn is_file_not_found(&self) -> bool {
        self.kind == ErrorKind::FileNotFound
    }
}

/// Walks the source chain of `err` looking for a [`ErrorKind::FileNotFound`].
///
/// Works through foreign wrappers as long as they expose their cause via
/// [`std::error::Error::source`].
pub fn is_file_not_found(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(err) = err.downcast_ref::<Error>()
            && err.is_file_not_found()
        {
            return true;
        }
        current = err.source();
    }
    false
}
