#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for client construction and request logging.
///
/// Verbose request logging is switched on when this target is enabled at
/// `DEBUG`.
pub const TRACING_TARGET_CLIENT: &str = "extstore_s3::client";

/// Tracing target for session cache hits and rebuilds.
pub const TRACING_TARGET_CACHE: &str = "extstore_s3::cache";

/// Tracing target for storage operations.
pub const TRACING_TARGET_STORAGE: &str = "extstore_s3::storage";

mod cache;
pub mod client;
mod config;
mod listing;
#[cfg(any(test, feature = "test-utils"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-utils")))]
pub mod memory;
mod storage;
mod translate;

#[doc(hidden)]
pub mod prelude;

pub use cache::SessionCache;
pub use client::{
    AwsClientFactory, BackendError, BuiltClient, ClientFactory, ListObjectsRequest, ListPage,
    ObjectApi, ObjectHead, PutObjectRequest, S3Client,
};
pub use config::{AES256_MODE, AuthMode, ClientConfig, KMS_MODE, ServerSideEncryption};
pub use listing::ListPages;
pub use storage::S3Storage;
