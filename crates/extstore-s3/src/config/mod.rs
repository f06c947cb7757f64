//! Client configuration and construction-time validation.

mod encryption;

use std::fmt;

use extstore_core::conf::{
    AUTH_PARAM, AUTH_PARAM_IMPLICIT, AUTH_PARAM_SPECIFIED, AWS_ACCESS_KEY_PARAM, AWS_SECRET_PARAM,
};
use extstore_core::{Error, ExternalIoConfig, Result, S3Config};

pub use self::encryption::{AES256_MODE, KMS_MODE, ServerSideEncryption};
use crate::TRACING_TARGET_CLIENT;

/// How the client obtains credentials.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum AuthMode {
    /// No `AUTH` parameter: behaves like [`Specified`](Self::Specified).
    #[default]
    Unset,
    /// Static credentials taken from the location.
    Specified,
    /// The ambient provider chain of the node.
    Implicit,
}

impl AuthMode {
    /// Parses the `AUTH` parameter.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "" => Ok(Self::Unset),
            AUTH_PARAM_SPECIFIED => Ok(Self::Specified),
            AUTH_PARAM_IMPLICIT => Ok(Self::Implicit),
            other => Err(Error::configuration(format!(
                "unsupported value {other} for {AUTH_PARAM}"
            ))),
        }
    }

    /// Returns the parameter value, empty for [`Unset`](Self::Unset).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "",
            Self::Specified => AUTH_PARAM_SPECIFIED,
            Self::Implicit => AUTH_PARAM_IMPLICIT,
        }
    }
}

/// Everything that determines how a client is built.
///
/// Two adapters with equal `ClientConfig`s can share one client; the prefix
/// and encryption settings of a location are not part of it.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ClientConfig {
    /// Custom endpoint, empty for AWS.
    pub endpoint: String,
    /// Region, empty when it has to be looked up.
    pub region: String,
    /// Bucket the client is used for.
    pub bucket: String,
    /// Static access key id.
    pub access_key: String,
    /// Static secret access key.
    pub secret: String,
    /// Temporary session token.
    pub temp_token: String,
    /// Credential source.
    pub auth: AuthMode,
    /// Whether requests are logged.
    pub verbose: bool,
}

impl ClientConfig {
    /// Derives the client configuration of an S3 payload.
    ///
    /// Verbose logging follows the `DEBUG` level of the client tracing
    /// target at the time of the call.
    pub fn new(conf: &S3Config, auth: AuthMode) -> Self {
        Self {
            endpoint: conf.endpoint.clone(),
            region: conf.region.clone(),
            bucket: conf.bucket.clone(),
            access_key: conf.access_key.clone(),
            secret: conf.secret.clone(),
            temp_token: conf.temp_token.clone(),
            auth,
            verbose: tracing::enabled!(target: TRACING_TARGET_CLIENT, tracing::Level::DEBUG),
        }
    }

    /// Sets the verbose flag.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Validates `conf` under `io_conf` and derives its client configuration.
    ///
    /// Runs entirely offline; nothing is built.
    pub fn validated(conf: &S3Config, io_conf: &ExternalIoConfig) -> Result<Self> {
        if !conf.endpoint.is_empty() && io_conf.disable_http {
            return Err(Error::configuration(
                "custom endpoints disallowed for s3 due to --external-io-disable-http flag",
            ));
        }

        let auth = AuthMode::parse(&conf.auth)?;
        match auth {
            AuthMode::Unset | AuthMode::Specified => {
                if conf.access_key.is_empty() {
                    return Err(missing_param(&conf.auth, AWS_ACCESS_KEY_PARAM));
                }
                if conf.secret.is_empty() {
                    return Err(missing_param(&conf.auth, AWS_SECRET_PARAM));
                }
            }
            AuthMode::Implicit if io_conf.disable_implicit_credentials => {
                return Err(Error::configuration(
                    "implicit credentials disallowed for s3 due to --external-io-implicit-credentials flag",
                ));
            }
            AuthMode::Implicit => {}
        }

        ServerSideEncryption::from_conf(conf)?;
        Ok(Self::new(conf, auth))
    }
}

fn missing_param(auth: &str, param: &str) -> Error {
    Error::configuration(format!(
        "{AUTH_PARAM} is set to '{auth}', but {param} is not set"
    ))
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("region", &self.region)
            .field("bucket", &self.bucket)
            .field("access_key", &self.access_key)
            .field("secret", &(!self.secret.is_empty()).then_some("<redacted>"))
            .field("temp_token", &(!self.temp_token.is_empty()).then_some("<redacted>"))
            .field("auth", &self.auth)
            .field("verbose", &self.verbose)
            .finish()
    }
}
