//! Provider configuration payloads.

mod s3;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::Result;

pub use self::s3::{
    AUTH_PARAM, AUTH_PARAM_IMPLICIT, AUTH_PARAM_SPECIFIED, AWS_ACCESS_KEY_PARAM,
    AWS_ENDPOINT_PARAM, AWS_SECRET_PARAM, AWS_SERVER_SIDE_ENCRYPTION_KMS_ID,
    AWS_SERVER_SIDE_ENCRYPTION_MODE, AWS_TEMP_TOKEN_PARAM, S3_REGION_PARAM, S3_SCHEME, S3Config,
};

/// Serializable description of an external storage location.
///
/// Returned by [`ExternalStorage::conf`](crate::ExternalStorage::conf) so the
/// caller can persist it and rebuild an equivalent adapter later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
#[non_exhaustive]
pub enum ExternalStorageConf {
    /// Amazon S3 or an S3-compatible service.
    S3(S3Config),
}

impl ExternalStorageConf {
    /// Returns the provider name as a static string.
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::S3(_) => "s3",
        }
    }

    /// Returns the location URL for this payload.
    pub fn to_location(&self) -> Result<Url> {
        match self {
            Self::S3(conf) => conf.to_location(),
        }
    }
}

impl From<S3Config> for ExternalStorageConf {
    fn from(conf: S3Config) -> Self {
        Self::S3(conf)
    }
}
