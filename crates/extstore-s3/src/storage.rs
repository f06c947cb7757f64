//! The S3 implementation of [`ExternalStorage`].

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use bytes::Bytes;
use extstore_core::{
    ClusterSettings, Context, Error, ExternalIoConfig, ExternalStorage, ExternalStorageConf,
    ListingFn, ObjectReader, Result, S3Config, path,
};

use crate::listing::{self, ListPages, MatchForm};
use crate::translate::{Operation, translate};
use crate::{
    BackendError, ClientConfig, ListObjectsRequest, PutObjectRequest, S3Client,
    ServerSideEncryption, SessionCache, TRACING_TARGET_STORAGE,
};

/// An S3 location opened for reading and writing.
///
/// With session reuse enabled the client is taken from the [`SessionCache`]
/// when the adapter is created; otherwise a client is built for every
/// operation and only the resolved region is remembered.
#[derive(Debug)]
pub struct S3Storage {
    conf: S3Config,
    io_conf: ExternalIoConfig,
    settings: ClusterSettings,
    client_config: ClientConfig,
    cache: Arc<SessionCache>,
    cached: Option<S3Client>,
    resolved_region: OnceLock<String>,
}

impl S3Storage {
    /// Validates `conf` and opens the location.
    ///
    /// Configuration errors are reported before any client is built.
    #[tracing::instrument(
        name = "s3.open",
        skip_all,
        fields(bucket = %conf.bucket, prefix = %conf.prefix)
    )]
    pub async fn new(
        ctx: &Context,
        conf: S3Config,
        io_conf: ExternalIoConfig,
        settings: ClusterSettings,
        cache: Arc<SessionCache>,
    ) -> Result<Self> {
        let client_config = ClientConfig::validated(&conf, &io_conf)?;

        let cached = if settings.session_reuse_enabled() {
            Some(cache.get_or_create(ctx, &client_config).await?)
        } else {
            None
        };

        tracing::debug!(
            target: TRACING_TARGET_STORAGE,
            session_reuse = cached.is_some(),
            "opened s3 storage"
        );
        Ok(Self {
            conf,
            io_conf,
            settings,
            client_config,
            cache,
            cached,
            resolved_region: OnceLock::new(),
        })
    }

    /// Opens an `s3://bucket/prefix?params` location.
    pub async fn from_location(
        ctx: &Context,
        location: &str,
        io_conf: ExternalIoConfig,
        settings: ClusterSettings,
        cache: Arc<SessionCache>,
    ) -> Result<Self> {
        let conf = S3Config::from_location(location)?;
        Self::new(ctx, conf, io_conf, settings, cache).await
    }

    /// The bucket of this location.
    pub fn bucket(&self) -> &str {
        &self.conf.bucket
    }

    /// The key prefix of this location.
    pub fn prefix(&self) -> &str {
        &self.conf.prefix
    }

    /// The configuration clients are built from.
    pub fn client_config(&self) -> &ClientConfig {
        &self.client_config
    }

    async fn client(&self, ctx: &Context) -> Result<S3Client> {
        if let Some(client) = &self.cached {
            return Ok(client.clone());
        }

        let mut config = self.client_config.clone();
        if let Some(region) = self.resolved_region.get() {
            config.region = region.clone();
        }
        let built = self.cache.build_uncached(ctx, &config).await?;
        if config.region.is_empty() {
            // Another task may have resolved it first; either value is fine.
            let _ = self.resolved_region.set(built.region);
        }
        Ok(built.client)
    }

    fn key(&self, name: &str) -> String {
        path::join(&[self.conf.prefix.as_str(), name])
    }

    /// Runs `fut` under `ctx` and `timeout`, wrapping deadline and
    /// cancellation errors with the operation message.
    async fn bounded<T, F>(
        &self,
        ctx: &Context,
        op: Operation,
        target: &str,
        timeout: Duration,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match ctx
            .run_with_timeout(op.name(), timeout, async { Ok(fut.await) })
            .await
        {
            Ok(result) => result,
            Err(err) => Err(err.context(op.describe(target))),
        }
    }

    /// Runs one backend call under the per-operation timeout.
    async fn call<T, F>(&self, ctx: &Context, op: Operation, key: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let timeout = self.settings.operation_timeout();
        self.bounded(ctx, op, key, timeout, async {
            fut.await.map_err(|err| translate(op, key, err))
        })
        .await
    }
}

#[async_trait::async_trait]
impl ExternalStorage for S3Storage {
    fn conf(&self) -> ExternalStorageConf {
        ExternalStorageConf::S3(self.conf.clone())
    }

    fn external_io_conf(&self) -> &ExternalIoConfig {
        &self.io_conf
    }

    fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    #[tracing::instrument(
        name = "s3.write_file",
        skip(self, ctx, content),
        fields(bucket = %self.conf.bucket, size = content.len())
    )]
    async fn write_file(&self, ctx: &Context, name: &str, content: Bytes) -> Result<()> {
        let key = self.key(name);
        let encryption = ServerSideEncryption::from_conf(&self.conf)
            .map_err(|err| err.context(Operation::Put.describe(&key)))?;
        let client = self.client(ctx).await?;

        let request = PutObjectRequest {
            bucket: self.conf.bucket.clone(),
            key: key.clone(),
            body: content,
            encryption,
        };
        self.call(ctx, Operation::Put, &key, client.put_object(request))
            .await?;

        tracing::debug!(target: TRACING_TARGET_STORAGE, key = %key, "wrote s3 object");
        Ok(())
    }

    #[tracing::instrument(
        name = "s3.read_file",
        skip(self, ctx),
        fields(bucket = %self.conf.bucket)
    )]
    async fn read_file(&self, ctx: &Context, name: &str) -> Result<ObjectReader> {
        let key = self.key(name);
        let client = self.client(ctx).await?;
        self.call(
            ctx,
            Operation::Get,
            &key,
            client.get_object(&self.conf.bucket, &key),
        )
        .await
    }

    #[tracing::instrument(
        name = "s3.list_files",
        skip(self, ctx),
        fields(bucket = %self.conf.bucket)
    )]
    async fn list_files(&self, ctx: &Context, pattern_suffix: &str) -> Result<Vec<String>> {
        let prefix = &self.conf.prefix;
        let (pattern, form) = if pattern_suffix.is_empty() {
            (prefix.clone(), MatchForm::Location { conf: &self.conf })
        } else {
            if path::contains_glob(prefix) {
                return Err(Error::invalid_pattern(
                    "prefix cannot contain globs pattern when passing an explicit pattern",
                ));
            }
            (
                path::join(&[prefix.as_str(), pattern_suffix]),
                MatchForm::Relative { prefix },
            )
        };

        let client = self.client(ctx).await?;
        let request = ListObjectsRequest::new(&self.conf.bucket, path::prefix_before_wildcard(prefix));
        let listing = ListPages::new(client, request);

        let matches = self
            .bounded(
                ctx,
                Operation::List,
                &self.conf.bucket,
                Duration::ZERO,
                listing::collect_matches(&listing, &pattern, form),
            )
            .await?;

        tracing::debug!(
            target: TRACING_TARGET_STORAGE,
            pattern = %pattern,
            matches = matches.len(),
            "listed s3 objects"
        );
        Ok(matches)
    }

    #[tracing::instrument(
        name = "s3.list",
        skip(self, ctx, visit),
        fields(bucket = %self.conf.bucket)
    )]
    async fn list(
        &self,
        ctx: &Context,
        prefix: &str,
        delimiter: &str,
        visit: &mut ListingFn<'_>,
    ) -> Result<()> {
        let dest = path::join_preserving_trailing_slash(&self.conf.prefix, prefix);
        let client = self.client(ctx).await?;
        let request = ListObjectsRequest::new(&self.conf.bucket, &dest).with_delimiter(delimiter);
        let listing = ListPages::new(client, request);

        self.bounded(
            ctx,
            Operation::List,
            &self.conf.bucket,
            Duration::ZERO,
            listing::visit_entries(&listing, &dest, visit),
        )
        .await
    }

    #[tracing::instrument(
        name = "s3.delete",
        skip(self, ctx),
        fields(bucket = %self.conf.bucket)
    )]
    async fn delete(&self, ctx: &Context, name: &str) -> Result<()> {
        let key = self.key(name);
        let client = self.client(ctx).await?;
        self.call(
            ctx,
            Operation::Delete,
            &key,
            client.delete_object(&self.conf.bucket, &key),
        )
        .await
    }

    #[tracing::instrument(
        name = "s3.size",
        skip(self, ctx),
        fields(bucket = %self.conf.bucket)
    )]
    async fn size(&self, ctx: &Context, name: &str) -> Result<i64> {
        let key = self.key(name);
        let client = self.client(ctx).await?;
        let head = self
            .call(
                ctx,
                Operation::Head,
                &key,
                client.head_object(&self.conf.bucket, &key),
            )
            .await?;
        Ok(head.content_length)
    }

    async fn close(&self) -> Result<()> {
        tracing::debug!(target: TRACING_TARGET_STORAGE, bucket = %self.conf.bucket, "closed s3 storage");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use extstore_core::ErrorKind;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::memory::{MemoryClientFactory, MemoryObjectApi};

    fn conf(prefix: &str) -> S3Config {
        S3Config::new("bkt")
            .with_prefix(prefix)
            .with_region("us-east-1")
            .with_credentials("AKID", "secret")
    }

    async fn open_with(
        factory: &MemoryClientFactory,
        conf: S3Config,
        settings: ClusterSettings,
    ) -> Result<S3Storage> {
        let cache = Arc::new(SessionCache::new(factory.clone()));
        S3Storage::new(
            &Context::new(),
            conf,
            ExternalIoConfig::default(),
            settings,
            cache,
        )
        .await
    }

    async fn seeded() -> MemoryClientFactory {
        let api = MemoryObjectApi::new().with_bucket("bkt");
        for key in ["data/a.csv", "data/b.txt", "data/sub/c.csv", "other/d.csv"] {
            api.insert("bkt", key, "x").await;
        }
        MemoryClientFactory::new(api)
    }

    async fn read_all(mut reader: ObjectReader) -> Vec<u8> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn write_then_read() {
        let factory = seeded().await;
        let storage = open_with(&factory, conf("backup"), ClusterSettings::default())
            .await
            .unwrap();
        let ctx = Context::new();

        storage
            .write_file(&ctx, "manifest.json", Bytes::from_static(b"{\"v\":1}"))
            .await
            .unwrap();
        let body = read_all(storage.read_file(&ctx, "manifest.json").await.unwrap()).await;
        assert_eq!(body, b"{\"v\":1}");
        assert_eq!(storage.size(&ctx, "manifest.json").await.unwrap(), 7);

        storage.delete(&ctx, "manifest.json").await.unwrap();
        let err = storage.read_file(&ctx, "manifest.json").await.err().unwrap();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
        assert!(err.to_string().contains("s3 object does not exist: backup/manifest.json"));
    }

    #[tokio::test]
    async fn missing_bucket_on_read_is_not_found() {
        let factory = MemoryClientFactory::new(MemoryObjectApi::new());
        let storage = open_with(&factory, conf(""), ClusterSettings::default())
            .await
            .unwrap();
        let err = storage.read_file(&Context::new(), "x").await.err().unwrap();
        assert!(err.is_file_not_found());
        assert!(extstore_core::is_file_not_found(&err));

        let err = storage
            .write_file(&Context::new(), "x", Bytes::new())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().starts_with("failed to put s3 object 'x'"));
    }

    #[tokio::test]
    async fn encryption_is_requested_on_upload() {
        let factory = seeded().await;
        let storage = open_with(
            &factory,
            conf("").with_encryption("aws:kms", "key-1"),
            ClusterSettings::default(),
        )
        .await
        .unwrap();
        storage
            .write_file(&Context::new(), "enc", Bytes::from_static(b"x"))
            .await
            .unwrap();

        let stored = factory.api().object("bkt", "enc").await.unwrap();
        assert_eq!(
            stored.encryption,
            Some(ServerSideEncryption::Kms {
                key_id: "key-1".into()
            })
        );
    }

    #[tokio::test]
    async fn invalid_config_fails_without_building() {
        let factory = seeded().await;

        let err = open_with(&factory, S3Config::new("bkt"), ClusterSettings::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = open_with(
            &factory,
            conf("").with_encryption("aws:kms", ""),
            ClusterSettings::default(),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("AWS_SERVER_KMS_ID"));
        assert_eq!(factory.builds(), 0);
    }

    #[tokio::test]
    async fn list_files_with_suffix_is_relative() {
        let factory = seeded().await;
        let storage = open_with(&factory, conf("data"), ClusterSettings::default())
            .await
            .unwrap();
        let found = storage.list_files(&Context::new(), "*.csv").await.unwrap();
        assert_eq!(found, ["a.csv"]);
    }

    #[tokio::test]
    async fn list_files_page_size_does_not_change_results() {
        for page_size in [1, 1000] {
            let api = MemoryObjectApi::new().with_page_size(page_size);
            for key in ["a.csv", "b.txt", "sub/c.csv"] {
                api.insert("bkt", key, "x").await;
            }
            let factory = MemoryClientFactory::new(api);
            let storage = open_with(&factory, conf(""), ClusterSettings::default())
                .await
                .unwrap();
            let found = storage.list_files(&Context::new(), "*.csv").await.unwrap();
            assert_eq!(found, ["a.csv"]);
            assert_eq!(factory.api().list_calls(), if page_size == 1 { 3 } else { 1 });
        }
    }

    #[tokio::test]
    async fn list_files_without_suffix_returns_locations() {
        let factory = seeded().await;
        let storage = open_with(&factory, conf("data/*.csv"), ClusterSettings::default())
            .await
            .unwrap();
        let found = storage.list_files(&Context::new(), "").await.unwrap();
        assert_eq!(found.len(), 1);

        let parsed = S3Config::from_location(&found[0]).unwrap();
        assert_eq!(parsed.bucket, "bkt");
        assert_eq!(parsed.prefix, "data/a.csv");
        assert_eq!(parsed.access_key, "AKID");
    }

    #[tokio::test]
    async fn locations_preserve_percent_in_keys() {
        let api = MemoryObjectApi::new().with_bucket("bkt");
        for key in ["dir/a%41.csv", "dir/a%2Fb.csv"] {
            api.insert("bkt", key, "x").await;
        }
        let factory = MemoryClientFactory::new(api);
        let storage = open_with(&factory, conf("dir/*"), ClusterSettings::default())
            .await
            .unwrap();

        let found = storage.list_files(&Context::new(), "").await.unwrap();
        let mut keys: Vec<_> = found
            .iter()
            .map(|location| S3Config::from_location(location).unwrap().prefix)
            .collect();
        keys.sort();
        assert_eq!(keys, ["dir/a%2Fb.csv", "dir/a%41.csv"]);
    }

    #[tokio::test]
    async fn glob_prefix_rejects_explicit_pattern() {
        let factory = seeded().await;
        let storage = open_with(&factory, conf("data/*"), ClusterSettings::default())
            .await
            .unwrap();
        let err = storage
            .list_files(&Context::new(), "*.csv")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPattern);
        assert_eq!(factory.api().list_calls(), 0);
    }

    #[tokio::test]
    async fn malformed_pattern_is_reported() {
        let factory = seeded().await;
        let storage = open_with(&factory, conf("data"), ClusterSettings::default())
            .await
            .unwrap();
        let err = storage.list_files(&Context::new(), "[").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPattern);
    }

    #[tokio::test]
    async fn list_with_delimiter_visits_one_level() {
        let api = MemoryObjectApi::new();
        for key in ["a/b/1", "a/b/2", "a/x", "a/y"] {
            api.insert("bkt", key, "x").await;
        }
        let factory = MemoryClientFactory::new(api);
        let storage = open_with(&factory, conf(""), ClusterSettings::default())
            .await
            .unwrap();

        let mut seen = Vec::new();
        storage
            .list(&Context::new(), "a/", "/", &mut |name: &str| {
                seen.push(name.to_owned());
                Ok::<(), Error>(())
            })
            .await
            .unwrap();
        assert_eq!(seen, ["b/", "x", "y"]);
    }

    #[tokio::test]
    async fn list_stops_on_visitor_error() {
        let factory = seeded().await;
        let storage = open_with(&factory, conf(""), ClusterSettings::default())
            .await
            .unwrap();

        let mut calls = 0;
        let err = storage
            .list(&Context::new(), "", "", &mut |_: &str| {
                calls += 1;
                Err::<(), _>(Error::io("visitor gave up"))
            })
            .await
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_eq!(err.to_string(), "visitor gave up");
    }

    #[tokio::test]
    async fn storages_with_equal_client_config_share_a_client() {
        let factory = seeded().await;
        let cache = Arc::new(SessionCache::new(factory.clone()));
        let ctx = Context::new();
        let settings = ClusterSettings::default();

        for prefix in ["one", "two", "three"] {
            S3Storage::new(
                &ctx,
                conf(prefix),
                ExternalIoConfig::default(),
                settings.clone(),
                cache.clone(),
            )
            .await
            .unwrap();
        }
        assert_eq!(factory.builds(), 1);
    }

    #[tokio::test]
    async fn disabled_reuse_builds_per_operation_and_remembers_region() {
        let factory = seeded().await.with_region("eu-central-1");
        let settings = ClusterSettings::default();
        settings.set_session_reuse(false);

        let storage = open_with(&factory, conf("").with_region(""), settings)
            .await
            .unwrap();
        assert_eq!(factory.builds(), 0);

        let ctx = Context::new();
        storage.size(&ctx, "data/a.csv").await.unwrap();
        storage.size(&ctx, "data/a.csv").await.unwrap();
        assert_eq!(factory.builds(), 2);
        assert_eq!(storage.resolved_region.get().map(String::as_str), Some("eu-central-1"));
    }

    #[tokio::test]
    async fn conf_round_trips_through_location() {
        let factory = seeded().await;
        let storage = open_with(&factory, conf("backup/2024"), ClusterSettings::default())
            .await
            .unwrap();
        let location = storage.conf().to_location().unwrap();
        let reopened = S3Storage::from_location(
            &Context::new(),
            location.as_str(),
            ExternalIoConfig::default(),
            ClusterSettings::default(),
            Arc::new(SessionCache::new(factory.clone())),
        )
        .await
        .unwrap();
        assert_eq!(reopened.conf(), storage.conf());
    }

    #[tokio::test(start_paused = true)]
    async fn operation_timeout_bounds_slow_calls() {
        let api = MemoryObjectApi::new()
            .with_bucket("bkt")
            .with_latency(Duration::from_secs(30));
        let factory = MemoryClientFactory::new(api);
        let settings = ClusterSettings::default();
        settings.set_operation_timeout(Duration::from_secs(5));

        let storage = open_with(&factory, conf(""), settings).await.unwrap();
        let err = storage.size(&Context::new(), "x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(err.to_string().starts_with("failed to get s3 object headers 'x'"));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_listing() {
        let api = MemoryObjectApi::new()
            .with_page_size(1)
            .with_latency(Duration::from_secs(60));
        for key in ["a", "b", "c"] {
            api.insert("bkt", key, "x").await;
        }
        let factory = MemoryClientFactory::new(api);
        let storage = open_with(&factory, conf(""), ClusterSettings::default())
            .await
            .unwrap();

        let ctx = Context::new();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = storage
            .list(&ctx, "", "", &mut |_: &str| Ok::<(), Error>(()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(60));
        assert!(err.to_string().starts_with("failed to list s3 bucket 'bkt'"));
    }
}
