//! Server-side encryption modes.

use extstore_core::{Error, Result, S3Config};

/// `AWS_SERVER_ENC_MODE` value selecting S3-managed AES-256 keys.
pub const AES256_MODE: &str = "AES256";

/// `AWS_SERVER_ENC_MODE` value selecting KMS-managed keys.
pub const KMS_MODE: &str = "aws:kms";

/// Server-side encryption requested for uploaded objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerSideEncryption {
    /// S3-managed keys.
    Aes256,
    /// KMS-managed key with the given id.
    Kms {
        /// KMS key id or ARN.
        key_id: String,
    },
}

impl ServerSideEncryption {
    /// Parses a mode string and key id.
    ///
    /// An empty mode means no encryption. This is the single check for both
    /// adapter construction and every upload.
    pub fn parse(mode: &str, kms_id: &str) -> Result<Option<Self>> {
        match mode {
            "" => Ok(None),
            AES256_MODE => Ok(Some(Self::Aes256)),
            KMS_MODE if kms_id.is_empty() => Err(Error::configuration(
                "AWS_SERVER_KMS_ID param must be set when using aws:kms server side encryption mode.",
            )),
            KMS_MODE => Ok(Some(Self::Kms {
                key_id: kms_id.to_owned(),
            })),
            other => Err(Error::configuration(format!(
                "unsupported server encryption mode {other}. Supported values are `aws:kms` and `AES256`."
            ))),
        }
    }

    /// Parses the encryption settings of an S3 payload.
    pub fn from_conf(conf: &S3Config) -> Result<Option<Self>> {
        Self::parse(&conf.server_enc_mode, &conf.server_kms_id)
    }

    /// Returns the mode string sent in the request header.
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Aes256 => AES256_MODE,
            Self::Kms { .. } => KMS_MODE,
        }
    }
}
