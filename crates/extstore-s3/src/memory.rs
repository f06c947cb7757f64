//! In-memory object backend for tests.
//!
//! [`MemoryObjectApi`] emulates the S3 behaviours the adapter relies on:
//! `NoSuchBucket`/`NoSuchKey` codes, delimiter grouping and paged listings
//! with continuation tokens. [`MemoryClientFactory`] hands out clients over
//! one shared backend and counts how often it was asked to build one.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use extstore_core::{Context, Error, ObjectReader, Result};
use tokio::sync::RwLock;

use crate::{
    BackendError, BuiltClient, ClientConfig, ClientFactory, ListObjectsRequest, ListPage,
    ObjectApi, ObjectHead, PutObjectRequest, S3Client, ServerSideEncryption,
};

const DEFAULT_PAGE_SIZE: usize = 1000;

/// An object as stored by [`MemoryObjectApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Object content.
    pub data: Bytes,
    /// Encryption requested at upload.
    pub encryption: Option<ServerSideEncryption>,
}

type Bucket = BTreeMap<String, StoredObject>;

/// Buckets and objects held in memory.
#[derive(Debug)]
pub struct MemoryObjectApi {
    buckets: RwLock<BTreeMap<String, Bucket>>,
    page_size: usize,
    latency: Option<Duration>,
    list_calls: AtomicUsize,
}

impl Default for MemoryObjectApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryObjectApi {
    /// Creates a backend without buckets.
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(BTreeMap::new()),
            page_size: DEFAULT_PAGE_SIZE,
            latency: None,
            list_calls: AtomicUsize::new(0),
        }
    }

    /// Creates an empty bucket.
    #[must_use]
    pub fn with_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.buckets.get_mut().entry(bucket.into()).or_default();
        self
    }

    /// Limits every listing page to `page_size` entries.
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Delays every call by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Stores `data` under `key`, creating the bucket if needed.
    pub async fn insert(&self, bucket: &str, key: &str, data: impl Into<Bytes>) {
        let object = StoredObject {
            data: data.into(),
            encryption: None,
        };
        self.buckets
            .write()
            .await
            .entry(bucket.to_owned())
            .or_default()
            .insert(key.to_owned(), object);
    }

    /// Returns the object stored under `key`.
    pub async fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.buckets.read().await.get(bucket)?.get(key).cloned()
    }

    /// Returns every key of `bucket`, in order.
    pub async fn keys(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .read()
            .await
            .get(bucket)
            .map(|objects| objects.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of listing pages served so far.
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::Relaxed)
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

fn no_such_bucket(bucket: &str) -> BackendError {
    BackendError::service(
        "NoSuchBucket",
        404,
        format!("NoSuchBucket: The specified bucket does not exist: {bucket}"),
    )
}

fn no_such_key(key: &str) -> BackendError {
    BackendError::service(
        "NoSuchKey",
        404,
        format!("NoSuchKey: The specified key does not exist: {key}"),
    )
}

enum Entry<'a> {
    Key(&'a str),
    Prefix(&'a str),
}

impl Entry<'_> {
    fn name(&self) -> &str {
        match self {
            Self::Key(name) | Self::Prefix(name) => name,
        }
    }
}

/// Groups the keys under `prefix` the way `ListObjectsV2` does.
fn entries<'a>(objects: &'a Bucket, prefix: &str, delimiter: Option<&str>) -> Vec<Entry<'a>> {
    let mut entries: Vec<Entry<'a>> = Vec::new();
    for key in objects.keys().filter(|key| key.starts_with(prefix)) {
        let grouped = delimiter.and_then(|delimiter| {
            let rest = &key[prefix.len()..];
            rest.find(delimiter)
                .map(|at| &key[..prefix.len() + at + delimiter.len()])
        });
        match grouped {
            // Keys sharing a prefix are adjacent in key order.
            Some(common) if matches!(entries.last(), Some(Entry::Prefix(last)) if *last == common) => {}
            Some(common) => entries.push(Entry::Prefix(common)),
            None => entries.push(Entry::Key(key)),
        }
    }
    entries
}

#[async_trait::async_trait]
impl ObjectApi for MemoryObjectApi {
    async fn put_object(&self, request: PutObjectRequest) -> Result<(), BackendError> {
        self.delay().await;
        let mut buckets = self.buckets.write().await;
        let objects = buckets
            .get_mut(&request.bucket)
            .ok_or_else(|| no_such_bucket(&request.bucket))?;
        objects.insert(
            request.key,
            StoredObject {
                data: request.body,
                encryption: request.encryption,
            },
        );
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, BackendError> {
        self.delay().await;
        let buckets = self.buckets.read().await;
        let objects = buckets.get(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        let object = objects.get(key).ok_or_else(|| no_such_key(key))?;
        Ok(Box::pin(std::io::Cursor::new(object.data.clone())))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, BackendError> {
        self.delay().await;
        let buckets = self.buckets.read().await;
        // HEAD responses carry no body, so S3 reports a bare `NotFound`.
        let object = buckets
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .ok_or_else(|| BackendError::service("NotFound", 404, "NotFound"))?;
        Ok(ObjectHead {
            content_length: object.data.len() as i64,
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
        self.delay().await;
        let mut buckets = self.buckets.write().await;
        let objects = buckets.get_mut(bucket).ok_or_else(|| no_such_bucket(bucket))?;
        objects.remove(key);
        Ok(())
    }

    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListPage, BackendError> {
        self.delay().await;
        self.list_calls.fetch_add(1, Ordering::Relaxed);

        let buckets = self.buckets.read().await;
        let objects = buckets
            .get(&request.bucket)
            .ok_or_else(|| no_such_bucket(&request.bucket))?;

        let mut remaining = entries(objects, &request.prefix, request.delimiter.as_deref())
            .into_iter()
            .filter(|entry| match &request.continuation_token {
                Some(token) => entry.name() > token.as_str(),
                None => true,
            })
            .peekable();

        let mut page = ListPage::default();
        let mut last = None;
        for entry in remaining.by_ref().take(self.page_size) {
            last = Some(entry.name().to_owned());
            match entry {
                Entry::Key(key) => page.keys.push(key.to_owned()),
                Entry::Prefix(prefix) => page.common_prefixes.push(prefix.to_owned()),
            }
        }
        if remaining.peek().is_some() {
            page.next_continuation_token = last;
        }
        Ok(page)
    }
}

/// Builds clients over one shared [`MemoryObjectApi`].
#[derive(Debug, Clone)]
pub struct MemoryClientFactory {
    api: Arc<MemoryObjectApi>,
    region: String,
    build_delay: Option<Duration>,
    builds: Arc<AtomicUsize>,
    fail: Arc<AtomicBool>,
}

impl MemoryClientFactory {
    /// Creates a factory over `api`.
    pub fn new(api: MemoryObjectApi) -> Self {
        Self::with_shared(Arc::new(api))
    }

    /// Creates a factory over an already shared backend.
    pub fn with_shared(api: Arc<MemoryObjectApi>) -> Self {
        Self {
            api,
            region: "us-east-1".to_owned(),
            build_delay: None,
            builds: Arc::new(AtomicUsize::new(0)),
            fail: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Region reported for configs that leave it empty.
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    /// Delays every build by `delay`.
    #[must_use]
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    /// Makes subsequent builds fail.
    pub fn fail_builds(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of builds started so far, failed ones included.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// The shared backend.
    pub fn api(&self) -> &Arc<MemoryObjectApi> {
        &self.api
    }
}

#[async_trait::async_trait]
impl ClientFactory for MemoryClientFactory {
    async fn build(&self, ctx: &Context, config: &ClientConfig) -> Result<BuiltClient> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.build_delay {
            ctx.run("build memory client", async {
                tokio::time::sleep(delay).await;
                Ok(())
            })
            .await?;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(Error::session("memory client build failed"));
        }

        let region = if config.region.is_empty() {
            self.region.clone()
        } else {
            config.region.clone()
        };
        let api: Arc<dyn ObjectApi> = self.api.clone();
        Ok(BuiltClient {
            client: S3Client::from_shared(api),
            region,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded(page_size: usize) -> MemoryObjectApi {
        let api = MemoryObjectApi::new().with_page_size(page_size);
        for key in ["a/b/1", "a/b/2", "a/x", "a/y", "c"] {
            api.insert("bkt", key, "data").await;
        }
        api
    }

    async fn list_all(api: &MemoryObjectApi, request: ListObjectsRequest) -> ListPage {
        let mut request = request;
        let mut all = ListPage::default();
        loop {
            let page = api.list_objects(&request).await.unwrap();
            all.keys.extend(page.keys);
            all.common_prefixes.extend(page.common_prefixes);
            match page.next_continuation_token {
                Some(token) => request.continuation_token = Some(token),
                None => return all,
            }
        }
    }

    #[tokio::test]
    async fn groups_by_delimiter() {
        let api = seeded(1000).await;
        let page = list_all(&api, ListObjectsRequest::new("bkt", "a/").with_delimiter("/")).await;
        assert_eq!(page.common_prefixes, ["a/b/"]);
        assert_eq!(page.keys, ["a/x", "a/y"]);
    }

    #[tokio::test]
    async fn pages_of_one_cover_everything_once() {
        let api = seeded(1).await;
        let page = list_all(&api, ListObjectsRequest::new("bkt", "")).await;
        assert_eq!(page.keys, ["a/b/1", "a/b/2", "a/x", "a/y", "c"]);
        assert_eq!(api.list_calls(), 5);

        let page = list_all(&api, ListObjectsRequest::new("bkt", "").with_delimiter("/")).await;
        assert_eq!(page.common_prefixes, ["a/"]);
        assert_eq!(page.keys, ["c"]);
    }

    #[tokio::test]
    async fn reports_missing_bucket_and_key() {
        let api = MemoryObjectApi::new().with_bucket("bkt");
        let err = api.get_object("other", "k").await.err().unwrap();
        assert_eq!(err.code(), Some("NoSuchBucket"));
        let err = api.get_object("bkt", "k").await.err().unwrap();
        assert_eq!(err.code(), Some("NoSuchKey"));
        api.delete_object("bkt", "k").await.unwrap();
    }
}
