//! AWS SDK backed [`ObjectApi`] and [`ClientFactory`].

use std::time::Duration;

use aws_sdk_s3::Client;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ServerSideEncryption as SdkServerSideEncryption;
use extstore_core::{Context, Error, ObjectReader, Result, RetryPolicy};

use super::error::is_transient;
use super::interceptor::VerboseLogging;
use super::{
    BackendError, BuiltClient, ClientFactory, ListObjectsRequest, ListPage, ObjectApi, ObjectHead,
    PutObjectRequest, S3Client,
};
use crate::{AuthMode, ClientConfig, ServerSideEncryption, TRACING_TARGET_CLIENT};

/// Region assumed for custom endpoints that do not name one.
pub const DEFAULT_ENDPOINT_REGION: &str = "default-region";

/// Region the bucket region lookup is issued against.
pub const REGION_LOOKUP_REGION: &str = "us-east-1";

/// SDK-level retries of every request.
pub const MAX_RETRIES: u32 = 10;

const BUCKET_REGION_HEADER: &str = "x-amz-bucket-region";
const CREDENTIALS_PROVIDER: &str = "extstore-s3";

const ENDPOINT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const ENDPOINT_READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Builds AWS SDK clients.
///
/// Custom endpoints get path-style addressing and their own transport
/// timeouts. An empty region is looked up from the bucket, retrying
/// transient failures under [`RetryPolicy`].
#[derive(Debug, Clone, Default)]
pub struct AwsClientFactory {
    region_lookup: RetryPolicy,
}

impl AwsClientFactory {
    /// Creates a factory with the default region lookup policy.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the retry policy of the bucket region lookup.
    #[must_use]
    pub fn with_region_lookup(mut self, policy: RetryPolicy) -> Self {
        self.region_lookup = policy;
        self
    }

    async fn base_builder(&self, ctx: &Context, config: &ClientConfig) -> Result<Builder> {
        match config.auth {
            AuthMode::Implicit => {
                let shared = ctx
                    .run("load aws shared config", async {
                        Ok(aws_config::defaults(BehaviorVersion::latest()).load().await)
                    })
                    .await?;
                Ok(Builder::from(&shared))
            }
            AuthMode::Unset | AuthMode::Specified => {
                let token = (!config.temp_token.is_empty()).then(|| config.temp_token.clone());
                let credentials = Credentials::new(
                    &config.access_key,
                    &config.secret,
                    token,
                    None,
                    CREDENTIALS_PROVIDER,
                );
                Ok(Builder::new()
                    .behavior_version(BehaviorVersion::latest())
                    .credentials_provider(credentials))
            }
        }
    }

    async fn resolve_region(&self, ctx: &Context, builder: Builder, bucket: &str) -> Result<String> {
        let probe = Client::from_conf(builder.region(Region::new(REGION_LOOKUP_REGION)).build());
        let region = self
            .region_lookup
            .retry(ctx, "resolve s3 bucket region", || {
                let probe = probe.clone();
                async move { bucket_region(&probe, bucket).await }
            })
            .await
            .map_err(|err| err.context(format!("could not find s3 bucket's region: {bucket}")))?;

        tracing::debug!(target: TRACING_TARGET_CLIENT, bucket, region = %region, "resolved s3 bucket region");
        Ok(region)
    }
}

#[async_trait::async_trait]
impl ClientFactory for AwsClientFactory {
    #[tracing::instrument(
        name = "s3.build_client",
        skip_all,
        fields(bucket = %config.bucket, endpoint = %config.endpoint, auth = config.auth.as_str())
    )]
    async fn build(&self, ctx: &Context, config: &ClientConfig) -> Result<BuiltClient> {
        let mut builder = self.base_builder(ctx, config).await?;
        let mut region = config.region.clone();

        if !config.endpoint.is_empty() {
            builder = builder
                .endpoint_url(&config.endpoint)
                .force_path_style(true)
                .timeout_config(
                    TimeoutConfig::builder()
                        .connect_timeout(ENDPOINT_CONNECT_TIMEOUT)
                        .read_timeout(ENDPOINT_READ_TIMEOUT)
                        .build(),
                );
            if region.is_empty() {
                region = DEFAULT_ENDPOINT_REGION.to_owned();
            }
        }

        builder = builder.retry_config(RetryConfig::standard().with_max_attempts(MAX_RETRIES + 1));
        if config.verbose {
            builder = builder.interceptor(VerboseLogging);
        }

        if region.is_empty() {
            region = self.resolve_region(ctx, builder.clone(), &config.bucket).await?;
        }

        let client = Client::from_conf(builder.region(Region::new(region.clone())).build());
        tracing::debug!(target: TRACING_TARGET_CLIENT, region = %region, "built s3 client");

        Ok(BuiltClient {
            client: S3Client::new(AwsObjectApi { client }),
            region,
        })
    }
}

async fn bucket_region(client: &Client, bucket: &str) -> Result<String> {
    match client.head_bucket().bucket(bucket).send().await {
        Ok(output) => Ok(output
            .bucket_region()
            .unwrap_or(REGION_LOOKUP_REGION)
            .to_owned()),
        Err(err) => {
            // Redirects for buckets in other regions still name the region.
            let redirected = err
                .raw_response()
                .and_then(|response| response.headers().get(BUCKET_REGION_HEADER))
                .map(str::to_owned);
            if let Some(region) = redirected {
                return Ok(region);
            }
            let err = backend_error(err);
            Err(Error::session("failed to look up s3 bucket region")
                .with_retryable(err.is_retryable())
                .with_source(err))
        }
    }
}

/// [`ObjectApi`] over an AWS SDK client.
#[derive(Debug, Clone)]
pub struct AwsObjectApi {
    client: Client,
}

impl AwsObjectApi {
    /// Wraps a configured SDK client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ObjectApi for AwsObjectApi {
    async fn put_object(&self, request: PutObjectRequest) -> Result<(), BackendError> {
        let mut call = self
            .client
            .put_object()
            .bucket(request.bucket)
            .key(request.key)
            .body(ByteStream::from(request.body));
        match request.encryption {
            Some(ServerSideEncryption::Aes256) => {
                call = call.server_side_encryption(SdkServerSideEncryption::Aes256);
            }
            Some(ServerSideEncryption::Kms { key_id }) => {
                call = call
                    .server_side_encryption(SdkServerSideEncryption::AwsKms)
                    .ssekms_key_id(key_id);
            }
            None => {}
        }
        call.send().await.map_err(backend_error)?;
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<ObjectReader, BackendError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(Box::pin(output.body.into_async_read()))
    }

    async fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectHead, BackendError> {
        let output = self
            .client
            .head_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(ObjectHead {
            content_length: output.content_length().unwrap_or_default(),
        })
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), BackendError> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(backend_error)?;
        Ok(())
    }

    async fn list_objects(&self, request: &ListObjectsRequest) -> Result<ListPage, BackendError> {
        let mut call = self
            .client
            .list_objects_v2()
            .bucket(&request.bucket)
            .prefix(&request.prefix);
        if let Some(delimiter) = &request.delimiter {
            call = call.delimiter(delimiter);
        }
        if let Some(token) = &request.continuation_token {
            call = call.continuation_token(token);
        }

        let output = call.send().await.map_err(backend_error)?;
        let next_continuation_token = match output.is_truncated() {
            Some(true) => output.next_continuation_token().map(str::to_owned),
            _ => None,
        };
        Ok(ListPage {
            keys: output
                .contents()
                .iter()
                .filter_map(|object| object.key())
                .map(str::to_owned)
                .collect(),
            common_prefixes: output
                .common_prefixes()
                .iter()
                .filter_map(|prefix| prefix.prefix())
                .map(str::to_owned)
                .collect(),
            next_continuation_token,
        })
    }
}

/// Converts an SDK failure, keeping the service code and HTTP status.
fn backend_error<E>(err: SdkError<E>) -> BackendError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    let status = err.raw_response().map(|response| response.status().as_u16());
    let code = err.code().map(str::to_owned);
    let retryable = match &err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            true
        }
        SdkError::ServiceError(_) => is_transient(code.as_deref(), status),
        _ => false,
    };
    let message = match (code.as_deref(), err.message()) {
        (Some(code), Some(message)) => format!("{code}: {message}"),
        (Some(code), None) => code.to_owned(),
        _ => DisplayErrorContext(&err).to_string(),
    };

    let mut backend = BackendError::new(message).with_retryable(retryable);
    if let Some(code) = code {
        backend = backend.with_code(code);
    }
    if let Some(status) = status {
        backend = backend.with_status(status);
    }
    backend.with_source(err)
}
