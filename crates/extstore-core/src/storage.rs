//! The capability contract every storage backend implements.

use std::pin::Pin;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::{ClusterSettings, Context, ExternalIoConfig, ExternalStorageConf, Result};

/// Streaming body of an object returned by
/// [`ExternalStorage::read_file`]. Dropping it releases the connection.
pub type ObjectReader = Pin<Box<dyn AsyncRead + Send>>;

/// Visitor invoked by [`ExternalStorage::list`] for each listed name.
///
/// Returning an error stops the listing and surfaces that error unchanged.
pub type ListingFn<'a> = dyn FnMut(&str) -> Result<()> + Send + 'a;

/// Read/write access to one external storage location.
///
/// Object names passed to these methods are relative to the location's
/// prefix. Implementations must be safe to share between tasks.
#[async_trait::async_trait]
pub trait ExternalStorage: Send + Sync {
    /// Returns the payload from which an equivalent adapter can be rebuilt.
    fn conf(&self) -> ExternalStorageConf;

    /// Returns the IO policy this adapter was built under.
    fn external_io_conf(&self) -> &ExternalIoConfig;

    /// Returns the settings handle used for dynamic lookups.
    fn settings(&self) -> &ClusterSettings;

    /// Uploads `content` as `name`.
    async fn write_file(&self, ctx: &Context, name: &str, content: Bytes) -> Result<()>;

    /// Opens `name` for reading.
    ///
    /// Fails with [`ErrorKind::FileNotFound`](crate::ErrorKind::FileNotFound)
    /// when the object or its bucket does not exist.
    async fn read_file(&self, ctx: &Context, name: &str) -> Result<ObjectReader>;

    /// Returns the objects matching the location's prefix, optionally
    /// extended by the glob `pattern_suffix`.
    ///
    /// With a suffix the results are paths relative to the prefix; without
    /// one they are fully qualified location URLs.
    async fn list_files(&self, ctx: &Context, pattern_suffix: &str) -> Result<Vec<String>>;

    /// Visits every name under `prefix` (relative to the location's prefix).
    ///
    /// With a non-empty `delimiter` only one level of hierarchy is listed and
    /// the grouped sub-prefixes are visited as well.
    async fn list(
        &self,
        ctx: &Context,
        prefix: &str,
        delimiter: &str,
        visit: &mut ListingFn<'_>,
    ) -> Result<()>;

    /// Deletes `name`.
    async fn delete(&self, ctx: &Context, name: &str) -> Result<()>;

    /// Returns the size of `name` in bytes.
    async fn size(&self, ctx: &Context, name: &str) -> Result<i64>;

    /// Releases resources held by this adapter.
    async fn close(&self) -> Result<()>;
}
