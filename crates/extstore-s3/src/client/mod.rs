//! Object API seam between the storage adapter and the S3 SDK.
//!
//! [`S3Client`] is a thin, cloneable wrapper around `Arc<dyn ObjectApi>`.
//! [`AwsClientFactory`] backs it with the AWS SDK; tests back it with the
//! in-memory implementation behind the `test-utils` feature.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use derive_more::Deref;
use extstore_core::ObjectReader;

use crate::ServerSideEncryption;

mod aws;
mod error;
mod factory;
mod interceptor;

pub use aws::{
    AwsClientFactory, AwsObjectApi, DEFAULT_ENDPOINT_REGION, MAX_RETRIES, REGION_LOOKUP_REGION,
};
pub use error::BackendError;
pub use factory::{BuiltClient, ClientFactory};

/// The object operations the adapter issues against a bucket.
#[async_trait::async_trait]
pub trait ObjectApi: Send + Sync + 'static {
    /// Uploads an object.
    async fn put_object(&self, request: PutObjectRequest) -> Result<(), BackendError>;

    /// Opens an object body for streaming.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, BackendError>;

    /// Fetches object metadata.
    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, BackendError>;

    /// Deletes an object. Deleting a missing key succeeds.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BackendError>;

    /// Fetches one page of a listing.
    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListPage, BackendError>;
}

/// An upload of a single object.
#[derive(Debug, Clone)]
pub struct PutObjectRequest {
    /// Target bucket.
    pub bucket: String,
    /// Full object key.
    pub key: String,
    /// Object content, re-readable across SDK retries.
    pub body: Bytes,
    /// Server-side encryption to request.
    pub encryption: Option<ServerSideEncryption>,
}

/// Object metadata returned by [`ObjectApi::head_object`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHead {
    /// Size in bytes.
    pub content_length: i64,
}

/// Parameters of one `ListObjectsV2` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListObjectsRequest {
    /// Bucket to list.
    pub bucket: String,
    /// Only keys starting with this prefix are returned.
    pub prefix: String,
    /// Groups keys sharing a prefix up to this delimiter.
    pub delimiter: Option<String>,
    /// Continuation token of the previous page.
    pub continuation_token: Option<String>,
}

impl ListObjectsRequest {
    /// Lists `bucket` under `prefix`, starting from the first page.
    pub fn new(bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            prefix: prefix.into(),
            ..Default::default()
        }
    }

    /// Sets the delimiter; an empty one is ignored.
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        let delimiter = delimiter.into();
        self.delimiter = (!delimiter.is_empty()).then_some(delimiter);
        self
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    /// Object keys, in key order.
    pub keys: Vec<String>,
    /// Grouped prefixes when a delimiter was given.
    pub common_prefixes: Vec<String>,
    /// Token of the next page; `None` on the last page.
    pub next_continuation_token: Option<String>,
}

/// Cloneable handle to any [`ObjectApi`] backend.
#[derive(Clone, Deref)]
pub struct S3Client(Arc<dyn ObjectApi>);

impl S3Client {
    /// Wraps a concrete [`ObjectApi`] implementation.
    pub fn new(api: impl ObjectApi) -> Self {
        Self(Arc::new(api))
    }

    /// Wraps an already shared implementation.
    pub fn from_shared(api: Arc<dyn ObjectApi>) -> Self {
        Self(api)
    }

    /// Returns `true` when both handles point at the same client.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for S3Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("S3Client")
            .field(&Arc::as_ptr(&self.0).cast::<()>())
            .finish()
    }
}
