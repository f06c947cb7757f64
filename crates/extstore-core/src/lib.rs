#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

/// Tracing target for retry decisions.
///
/// Use this target for logging backoff and give-up decisions of [`RetryPolicy`].
pub const TRACING_TARGET_RETRY: &str = "extstore_core::retry";

pub mod conf;
mod context;
mod error;
pub mod glob;
mod io_config;
pub mod path;
mod retry;
mod settings;
mod storage;

#[doc(hidden)]
pub mod prelude;

pub use conf::{ExternalStorageConf, S3Config};
pub use context::Context;
pub use error::{BoxedError, Error, ErrorKind, Result, is_file_not_found};
pub use io_config::ExternalIoConfig;
pub use retry::RetryPolicy;
pub use settings::{ClusterSettings, SESSION_REUSE_SETTING, SettingsConfig, TIMEOUT_SETTING};
pub use storage::{ExternalStorage, ListingFn, ObjectReader};
