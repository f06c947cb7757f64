//! Convenience re-exports.

pub use crate::conf::{ExternalStorageConf, S3Config};
pub use crate::{
    ClusterSettings, Context, Error, ErrorKind, ExternalIoConfig, ExternalStorage, ListingFn,
    ObjectReader, Result, RetryPolicy, SettingsConfig,
};
