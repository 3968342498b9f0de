//! AWS S3 asset publisher.
//!
//! Artifacts are uploaded under `{prefix}/{key}` with a public-read ACL and
//! the cache policy of the artifact kind.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;

use crate::error::{AppError, Result};
use crate::storage::{AssetPublisher, PublishedAsset, PutOptions};

/// S3-backed publisher.
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Create a new S3 storage instance.
    pub fn new(client: Client, bucket: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
            prefix: prefix.into(),
        }
    }

    /// Create S3 storage from environment configuration.
    pub async fn from_env() -> Result<Self> {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let client = Client::new(&config);

        let bucket = std::env::var("S3_BUCKET")
            .map_err(|_| AppError::config("S3_BUCKET is not set"))?;
        let prefix = std::env::var("S3_PREFIX").unwrap_or_default();

        Ok(Self::new(client, bucket, prefix))
    }

    fn object_key(&self, key: &str) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}/{key}")
        }
    }

    fn object_url(&self, object_key: &str) -> String {
        format!("https://{}.s3.amazonaws.com/{}", self.bucket, object_key)
    }
}

#[async_trait]
impl AssetPublisher for S3Storage {
    async fn put(&self, key: &str, bytes: Vec<u8>, options: &PutOptions) -> Result<PublishedAsset> {
        let object_key = self.object_key(key);
        let size = bytes.len();

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .body(ByteStream::from(bytes))
            .cache_control(&options.cache_control);
        if options.public {
            request = request.acl(ObjectCannedAcl::PublicRead);
        }
        if let Some(content_type) = &options.content_type {
            request = request.content_type(content_type);
        }

        request.send().await.map_err(|e| {
            AppError::storage(format!(
                "put s3://{}/{} failed: {}",
                self.bucket,
                object_key,
                e.into_service_error()
            ))
        })?;

        log::info!("Wrote {} bytes to s3://{}/{}", size, self.bucket, object_key);
        Ok(PublishedAsset {
            url: self.object_url(&object_key),
            key: object_key,
        })
    }
}
