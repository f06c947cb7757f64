//! Operator policy restricting what external storage locations may do.

#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};

/// External IO directory policy.
///
/// Set by the operator at node startup and passed to every adapter so it can
/// reject locations the cluster is not allowed to reach.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
pub struct ExternalIoConfig {
    /// Disallow custom HTTP endpoints for cloud storage
    #[cfg_attr(
        feature = "config",
        arg(long = "external-io-disable-http", env = "EXTERNAL_IO_DISABLE_HTTP")
    )]
    #[serde(default)]
    pub disable_http: bool,

    /// Disallow ambient (implicit) credentials for cloud storage
    #[cfg_attr(
        feature = "config",
        arg(
            long = "external-io-disable-implicit-credentials",
            env = "EXTERNAL_IO_DISABLE_IMPLICIT_CREDENTIALS"
        )
    )]
    #[serde(default)]
    pub disable_implicit_credentials: bool,
}

impl ExternalIoConfig {
    /// Disallow custom endpoints.
    #[must_use]
    pub fn with_disable_http(mut self, disable: bool) -> Self {
        self.disable_http = disable;
        self
    }

    /// Disallow implicit credentials.
    #[must_use]
    pub fn with_disable_implicit_credentials(mut self, disable: bool) -> Self {
        self.disable_implicit_credentials = disable;
        self
    }
}
