//! Translation of backend failures into storage errors.

use extstore_core::{Error, ErrorKind};

use crate::BackendError;

/// Service error codes that mean the object is not there.
///
/// Only consulted for reads: a missing bucket on upload or listing is a plain
/// I/O failure.
const READ_ERROR_KINDS: &[(&str, ErrorKind)] = &[
    ("NoSuchBucket", ErrorKind::FileNotFound),
    ("NoSuchKey", ErrorKind::FileNotFound),
];

/// The storage operations, for error messages and code translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Put,
    Get,
    Head,
    Delete,
    List,
}

impl Operation {
    /// Short name used for deadline and cancellation errors.
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::Put => "put s3 object",
            Self::Get => "get s3 object",
            Self::Head => "head s3 object",
            Self::Delete => "delete s3 object",
            Self::List => "list s3 bucket",
        }
    }

    /// Message of a failure of this operation on `target` (a key, or the
    /// bucket for listings).
    pub(crate) fn describe(self, target: &str) -> String {
        let failure = match self {
            Self::Put => "failed to put s3 object",
            Self::Get => "failed to get s3 object",
            Self::Head => "failed to get s3 object headers",
            Self::Delete => "failed to delete s3 object",
            Self::List => "failed to list s3 bucket",
        };
        format!("{failure} '{target}'")
    }

    fn classify(self, code: &str) -> Option<ErrorKind> {
        let table: &[(&str, ErrorKind)] = match self {
            Self::Get => READ_ERROR_KINDS,
            _ => &[],
        };
        table
            .iter()
            .find_map(|(known, kind)| (*known == code).then_some(*kind))
    }
}

/// Converts a backend failure of `op` on `target`.
pub(crate) fn translate(op: Operation, target: &str, err: BackendError) -> Error {
    let kind = err
        .code()
        .and_then(|code| op.classify(code))
        .unwrap_or(ErrorKind::Io);
    let message = match kind {
        ErrorKind::FileNotFound => format!("s3 object does not exist: {target}"),
        _ => op.describe(target),
    };
    Error::new(kind)
        .with_message(message)
        .with_retryable(err.is_retryable())
        .with_source(err)
}
