//! S3 provider payload and its location URL encoding.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;
use url::form_urlencoded;

use crate::{Error, Result};

/// URL scheme of S3 locations.
pub const S3_SCHEME: &str = "s3";

/// Query parameter carrying the access key id.
pub const AWS_ACCESS_KEY_PARAM: &str = "AWS_ACCESS_KEY_ID";
/// Query parameter carrying the secret access key.
pub const AWS_SECRET_PARAM: &str = "AWS_SECRET_ACCESS_KEY";
/// Query parameter carrying the temporary session token.
pub const AWS_TEMP_TOKEN_PARAM: &str = "AWS_SESSION_TOKEN";
/// Query parameter carrying a custom endpoint.
pub const AWS_ENDPOINT_PARAM: &str = "AWS_ENDPOINT";
/// Query parameter carrying the bucket region.
pub const S3_REGION_PARAM: &str = "AWS_REGION";
/// Query parameter selecting how credentials are obtained.
pub const AUTH_PARAM: &str = "AUTH";
/// Query parameter selecting server-side encryption.
pub const AWS_SERVER_SIDE_ENCRYPTION_MODE: &str = "AWS_SERVER_ENC_MODE";
/// Query parameter carrying the KMS key id for `aws:kms` encryption.
pub const AWS_SERVER_SIDE_ENCRYPTION_KMS_ID: &str = "AWS_SERVER_KMS_ID";

/// `AUTH` value: use the credentials given in the location.
pub const AUTH_PARAM_SPECIFIED: &str = "specified";
/// `AUTH` value: use the ambient provider chain of the node.
pub const AUTH_PARAM_IMPLICIT: &str = "implicit";

/// Configuration payload of an S3 location.
///
/// Values are kept exactly as given (strings, empty meaning unset) so that a
/// payload survives a trip through a location URL unchanged. Validation
/// happens when an adapter is built from it.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Bucket name.
    pub bucket: String,
    /// Key prefix joined in front of every object name.
    pub prefix: String,
    /// Custom endpoint URL (for S3-compatible storage like MinIO).
    pub endpoint: String,
    /// Bucket region; resolved from the bucket when empty.
    pub region: String,
    /// Access key id.
    pub access_key: String,
    /// Secret access key.
    pub secret: String,
    /// Temporary session token.
    pub temp_token: String,
    /// Auth mode: `""`, `specified` or `implicit`.
    pub auth: String,
    /// Server-side encryption mode: `""`, `AES256` or `aws:kms`.
    pub server_enc_mode: String,
    /// KMS key id used with `aws:kms`.
    pub server_kms_id: String,
}

impl S3Config {
    /// Creates a payload for `bucket` with everything else unset.
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Default::default()
        }
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Sets a custom endpoint.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Sets the region.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Sets static credentials and selects the `specified` auth mode.
    #[must_use]
    pub fn with_credentials(
        mut self,
        access_key: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        self.access_key = access_key.into();
        self.secret = secret.into();
        self.auth = AUTH_PARAM_SPECIFIED.to_owned();
        self
    }

    /// Sets the temporary session token.
    #[must_use]
    pub fn with_temp_token(mut self, token: impl Into<String>) -> Self {
        self.temp_token = token.into();
        self
    }

    /// Sets the raw auth mode string.
    #[must_use]
    pub fn with_auth(mut self, auth: impl Into<String>) -> Self {
        self.auth = auth.into();
        self
    }

    /// Sets the server-side encryption mode and key id.
    #[must_use]
    pub fn with_encryption(mut self, mode: impl Into<String>, kms_id: impl Into<String>) -> Self {
        self.server_enc_mode = mode.into();
        self.server_kms_id = kms_id.into();
        self
    }

    /// Encodes the non-empty connection parameters as a query string, keys
    /// sorted.
    pub fn query_params(&self) -> String {
        let mut params = [
            (AWS_ACCESS_KEY_PARAM, &self.access_key),
            (AWS_SECRET_PARAM, &self.secret),
            (AWS_TEMP_TOKEN_PARAM, &self.temp_token),
            (AWS_ENDPOINT_PARAM, &self.endpoint),
            (S3_REGION_PARAM, &self.region),
            (AUTH_PARAM, &self.auth),
            (AWS_SERVER_SIDE_ENCRYPTION_MODE, &self.server_enc_mode),
            (AWS_SERVER_SIDE_ENCRYPTION_KMS_ID, &self.server_kms_id),
        ];
        params.sort_by_key(|(name, _)| *name);

        let mut query = form_urlencoded::Serializer::new(String::new());
        for (name, value) in params {
            if !value.is_empty() {
                query.append_pair(name, value);
            }
        }
        query.finish()
    }

    /// Returns the fully qualified location of `key` in this bucket, carrying
    /// this payload's connection parameters.
    pub fn location_for(&self, key: &str) -> Result<Url> {
        let mut url = Url::parse(&format!("{S3_SCHEME}://{}/", self.bucket)).map_err(|err| {
            Error::configuration(format!("invalid s3 bucket name {:?}", self.bucket))
                .with_source(err)
        })?;
        url.path_segments_mut()
            .map_err(|()| {
                Error::configuration(format!("invalid s3 bucket name {:?}", self.bucket))
            })?
            .clear()
            .extend(key.split('/'));

        let query = self.query_params();
        if !query.is_empty() {
            url.set_query(Some(&query));
        }
        Ok(url)
    }

    /// Returns the location URL of this payload itself.
    pub fn to_location(&self) -> Result<Url> {
        self.location_for(&self.prefix)
    }

    /// Parses an `s3://bucket/prefix?params` location.
    ///
    /// Unknown parameters are rejected so that a mistyped parameter name does
    /// not silently fall back to a default.
    pub fn from_location(location: &str) -> Result<Self> {
        let url = Url::parse(location).map_err(|err| {
            Error::configuration("failed to parse s3 location").with_source(err)
        })?;
        if url.scheme() != S3_SCHEME {
            return Err(Error::configuration(format!(
                "unsupported scheme {:?} for an s3 location",
                url.scheme()
            )));
        }

        let bucket = url.host_str().unwrap_or_default();
        if bucket.is_empty() {
            return Err(Error::configuration("s3 location must name a bucket"));
        }

        let path = url.path().strip_prefix('/').unwrap_or(url.path());
        let prefix = urlencoding::decode(path).map_err(|err| {
            Error::configuration("s3 location path is not valid utf-8").with_source(err)
        })?;

        let mut conf = Self::new(bucket).with_prefix(prefix.into_owned());
        for (name, value) in url.query_pairs() {
            let field = match name.as_ref() {
                AWS_ACCESS_KEY_PARAM => &mut conf.access_key,
                AWS_SECRET_PARAM => &mut conf.secret,
                AWS_TEMP_TOKEN_PARAM => &mut conf.temp_token,
                AWS_ENDPOINT_PARAM => &mut conf.endpoint,
                S3_REGION_PARAM => &mut conf.region,
                AUTH_PARAM => &mut conf.auth,
                AWS_SERVER_SIDE_ENCRYPTION_MODE => &mut conf.server_enc_mode,
                AWS_SERVER_SIDE_ENCRYPTION_KMS_ID => &mut conf.server_kms_id,
                other => {
                    return Err(Error::configuration(format!(
                        "unknown s3 location parameter {other:?}"
                    )));
                }
            };
            *field = value.into_owned();
        }
        Ok(conf)
    }
}

fn mask(value: &str) -> &'static str {
    if value.is_empty() { "" } else { "<redacted>" }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret", &mask(&self.secret))
            .field("temp_token", &mask(&self.temp_token))
            .field("auth", &self.auth)
            .field("server_enc_mode", &self.server_enc_mode)
            .field("server_kms_id", &self.server_kms_id)
            .finish()
    }
}
