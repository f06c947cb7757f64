//! Process-wide reuse of the most recently built client.

use std::fmt;
use std::sync::Arc;

use extstore_core::{Context, Result};
use tokio::sync::Mutex;

use crate::{
    AwsClientFactory, BuiltClient, ClientConfig, ClientFactory, S3Client, TRACING_TARGET_CACHE,
};

struct CachedSession {
    config: ClientConfig,
    client: S3Client,
}

/// Holds at most one client together with the [`ClientConfig`] it was built
/// from.
///
/// A request with an equal config gets the cached client; any other config
/// builds a new client that replaces the cached one. Builds happen under the
/// cache lock, so concurrent requests for the same config build once.
pub struct SessionCache {
    factory: Arc<dyn ClientFactory>,
    slot: Mutex<Option<CachedSession>>,
}

impl SessionCache {
    /// Creates an empty cache building clients with `factory`.
    pub fn new(factory: impl ClientFactory) -> Self {
        Self::with_factory(Arc::new(factory))
    }

    /// Creates an empty cache over a shared factory.
    pub fn with_factory(factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            factory,
            slot: Mutex::new(None),
        }
    }

    /// Creates an empty cache building AWS SDK clients.
    pub fn aws() -> Self {
        Self::new(AwsClientFactory::default())
    }

    /// Returns the cached client when its config equals `config`, otherwise
    /// builds one and caches it.
    ///
    /// A failed build leaves the previous entry in place.
    pub async fn get_or_create(&self, ctx: &Context, config: &ClientConfig) -> Result<S3Client> {
        let mut slot = ctx
            .run("acquire s3 session cache", async { Ok(self.slot.lock().await) })
            .await?;

        if let Some(cached) = slot.as_ref()
            && cached.config == *config
        {
            tracing::trace!(target: TRACING_TARGET_CACHE, bucket = %config.bucket, "reusing s3 client");
            return Ok(cached.client.clone());
        }

        tracing::debug!(
            target: TRACING_TARGET_CACHE,
            bucket = %config.bucket,
            replaced = slot.is_some(),
            "building s3 client"
        );
        let built = self.factory.build(ctx, config).await?;
        *slot = Some(CachedSession {
            config: config.clone(),
            client: built.client.clone(),
        });
        Ok(built.client)
    }

    /// Builds a client without consulting or updating the cache.
    pub async fn build_uncached(&self, ctx: &Context, config: &ClientConfig) -> Result<BuiltClient> {
        self.factory.build(ctx, config).await
    }

    /// Returns the config of the cached client, if any.
    pub async fn cached_config(&self) -> Option<ClientConfig> {
        self.slot.lock().await.as_ref().map(|cached| cached.config.clone())
    }

    /// Drops the cached client.
    pub async fn clear(&self) {
        self.slot.lock().await.take();
    }
}

impl Default for SessionCache {
    fn default() -> Self {
        Self::aws()
    }
}

impl fmt::Debug for SessionCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCache").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use extstore_core::{ErrorKind, S3Config};

    use super::*;
    use crate::AuthMode;
    use crate::memory::{MemoryClientFactory, MemoryObjectApi};

    fn config(region: &str) -> ClientConfig {
        let conf = S3Config::new("bucket")
            .with_region(region)
            .with_credentials("AKID", "secret");
        ClientConfig::new(&conf, AuthMode::Specified)
    }

    #[tokio::test]
    async fn equal_configs_share_one_client() {
        let factory = MemoryClientFactory::new(MemoryObjectApi::new());
        let cache = SessionCache::new(factory.clone());
        let ctx = Context::new();

        let a = cache.get_or_create(&ctx, &config("us-west-2")).await.unwrap();
        let b = cache.get_or_create(&ctx, &config("us-west-2")).await.unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(factory.builds(), 1);
    }

    #[tokio::test]
    async fn different_config_replaces_the_entry() {
        let factory = MemoryClientFactory::new(MemoryObjectApi::new());
        let cache = SessionCache::new(factory.clone());
        let ctx = Context::new();

        cache.get_or_create(&ctx, &config("us-west-2")).await.unwrap();
        cache.get_or_create(&ctx, &config("eu-west-1")).await.unwrap();
        assert_eq!(cache.cached_config().await, Some(config("eu-west-1")));

        cache.get_or_create(&ctx, &config("us-west-2")).await.unwrap();
        assert_eq!(factory.builds(), 3);
    }

    #[tokio::test]
    async fn failed_build_keeps_previous_entry() {
        let factory = MemoryClientFactory::new(MemoryObjectApi::new());
        let cache = SessionCache::new(factory.clone());
        let ctx = Context::new();

        cache.get_or_create(&ctx, &config("us-west-2")).await.unwrap();
        factory.fail_builds(true);
        let err = cache.get_or_create(&ctx, &config("eu-west-1")).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Session);
        assert_eq!(cache.cached_config().await, Some(config("us-west-2")));

        cache.clear().await;
        assert_eq!(cache.cached_config().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_build_once() {
        let factory = MemoryClientFactory::new(MemoryObjectApi::new())
            .with_build_delay(Duration::from_millis(50));
        let cache = Arc::new(SessionCache::new(factory.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move {
                    cache
                        .get_or_create(&Context::new(), &config("us-west-2"))
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(factory.builds(), 1);
    }
}
