//! Errors reported by an [`ObjectApi`](super::ObjectApi) backend.

use extstore_core::BoxedError;

/// A failed backend call: the service error code and HTTP status when the
/// service answered, plus whether the failure is transient.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    code: Option<String>,
    status: Option<u16>,
    message: String,
    retryable: bool,
    #[source]
    source: Option<BoxedError>,
}

impl BackendError {
    /// Creates a non-retryable error with no code or status.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            status: None,
            message: message.into(),
            retryable: false,
            source: None,
        }
    }

    /// Creates a service error carrying `code`, as S3 reports for a missing
    /// bucket or key.
    pub fn service(code: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        let code = code.into();
        let retryable = is_transient(Some(&code), Some(status));
        Self::new(message)
            .with_code(code)
            .with_status(status)
            .with_retryable(retryable)
    }

    /// Sets the service error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Marks whether retrying the call may succeed.
    #[must_use]
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Attaches the underlying error.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The service error code, e.g. `NoSuchKey`.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// The HTTP status of the response.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// Whether retrying the call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }
}

/// Server-side failures and throttling are transient; everything else the
/// service answered with is not.
pub(crate) fn is_transient(code: Option<&str>, status: Option<u16>) -> bool {
    let throttled = matches!(
        code,
        Some("SlowDown" | "Throttling" | "ThrottlingException" | "RequestTimeout")
    );
    throttled || status.is_some_and(|status| status >= 500 || status == 429)
}
