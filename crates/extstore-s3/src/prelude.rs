//! Convenience re-exports.

pub use crate::{
    AuthMode, AwsClientFactory, ClientConfig, ClientFactory, ObjectApi, S3Client, S3Storage,
    ServerSideEncryption, SessionCache,
};
