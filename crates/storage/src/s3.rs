use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::{BehaviorVersion, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;

use crate::{expiry, BlobError, BlobGateway, BlobKind, SignedUrl, StorageConfig};

/// [`BlobGateway`] over an S3-compatible API (MinIO in development).
///
/// Uses path-style addressing. Download URLs are presigned against the
/// public endpoint when one is configured, since the internal endpoint is
/// usually not resolvable by clients.
#[derive(Clone)]
pub struct S3Gateway {
    client: Client,
    presign_client: Client,
    upload_bucket: String,
    converted_bucket: String,
}

impl S3Gateway {
    pub async fn connect(config: &StorageConfig) -> Self {
        let client = build_client(config, &config.endpoint).await;
        let presign_client = match &config.public_endpoint {
            Some(public) => build_client(config, public).await,
            None => client.clone(),
        };

        tracing::info!(
            endpoint = %config.endpoint,
            public_endpoint = ?config.public_endpoint,
            "S3 gateway configured",
        );

        Self {
            client,
            presign_client,
            upload_bucket: config.upload_bucket.clone(),
            converted_bucket: config.converted_bucket.clone(),
        }
    }

    fn bucket(&self, kind: BlobKind) -> &str {
        match kind {
            BlobKind::Upload => &self.upload_bucket,
            BlobKind::Converted => &self.converted_bucket,
        }
    }
}

async fn build_client(config: &StorageConfig, endpoint: &str) -> Client {
    let credentials = Credentials::new(
        &config.access_key,
        &config.secret_key,
        None,
        None,
        "pixelforge-static",
    );
    let shared = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(config.region.clone()))
        .endpoint_url(endpoint)
        .credentials_provider(credentials)
        .load()
        .await;
    let s3_config = aws_sdk_s3::config::Builder::from(&shared)
        .force_path_style(true)
        .build();
    Client::from_conf(s3_config)
}

fn unavailable<E: std::error::Error>(err: E) -> BlobError {
    BlobError::Unavailable(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl BlobGateway for S3Gateway {
    async fn put(
        &self,
        kind: BlobKind,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), BlobError> {
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(self.bucket(kind))
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(unavailable)?;
        tracing::debug!(bucket = self.bucket(kind), key, size, "Object stored");
        Ok(())
    }

    async fn get(&self, kind: BlobKind, key: &str) -> Result<Bytes, BlobError> {
        let output = match self
            .client
            .get_object()
            .bucket(self.bucket(kind))
            .key(key)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_key());
                return Err(if missing {
                    BlobError::NotFound {
                        kind,
                        key: key.to_string(),
                    }
                } else {
                    unavailable(err)
                });
            }
        };

        let data = output.body.collect().await.map_err(unavailable)?;
        Ok(data.into_bytes())
    }

    async fn sign(
        &self,
        kind: BlobKind,
        key: &str,
        ttl: Duration,
    ) -> Result<SignedUrl, BlobError> {
        let presigning =
            PresigningConfig::expires_in(ttl).map_err(|e| BlobError::Signing(e.to_string()))?;
        let request = self
            .presign_client
            .get_object()
            .bucket(self.bucket(kind))
            .key(key)
            .presigned(presigning)
            .await
            .map_err(|e| BlobError::Signing(DisplayErrorContext(e).to_string()))?;

        Ok(SignedUrl {
            url: request.uri().to_string(),
            expires_at: expiry(ttl),
        })
    }

    async fn ensure_buckets(&self) -> Result<(), BlobError> {
        for bucket in [&self.upload_bucket, &self.converted_bucket] {
            if self.client.head_bucket().bucket(bucket).send().await.is_ok() {
                continue;
            }
            match self.client.create_bucket().bucket(bucket).send().await {
                Ok(_) => tracing::info!(bucket = %bucket, "Bucket created"),
                Err(err) => {
                    let exists = err.as_service_error().is_some_and(|e| {
                        e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists()
                    });
                    if !exists {
                        return Err(unavailable(err));
                    }
                }
            }
        }
        Ok(())
    }
}
