//! Client construction seam.

use extstore_core::{Context, Result};

use super::S3Client;
use crate::ClientConfig;

/// A freshly built client together with the region it was built for.
#[derive(Debug, Clone)]
pub struct BuiltClient {
    /// The client handle.
    pub client: S3Client,
    /// The effective region, resolved when the config left it empty.
    pub region: String,
}

/// Builds clients from a [`ClientConfig`].
///
/// Implementations may perform network calls (credential loading, region
/// lookup) and must honour the cancellation of `ctx`.
#[async_trait::async_trait]
pub trait ClientFactory: Send + Sync + 'static {
    /// Builds a new client for `config`.
    async fn build(&self, ctx: &Context, config: &ClientConfig) -> Result<BuiltClient>;
}
