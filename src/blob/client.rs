use super::{Blob, BlobEntry, BlobStore, PutOutcome};
use crate::id::ImageId;
use crate::{Error, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::http::HttpResponse;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, Client as S3Client};
use chrono::DateTime;
use tracing::debug;

pub struct S3BlobClient {
    client: S3Client,
    bucket: String,
    key_prefix: String,
}

fn http_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

impl S3BlobClient {
    pub async fn new(
        access_key_id: String,
        secret_access_key: String,
        endpoint: String,
        region: String,
        bucket: String,
        key_prefix: String,
    ) -> Result<Self> {
        let credentials = aws_sdk_s3::config::Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            "expiring-image-host",
        );

        let shared = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(region))
            .endpoint_url(endpoint)
            .load()
            .await;

        // Self-hosted S3 implementations rarely support virtual-host buckets
        let config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: S3Client::from_conf(config),
            bucket,
            key_prefix,
        })
    }

    fn object_key(&self, id: &ImageId) -> String {
        format!("{}{}", self.key_prefix, id)
    }
}

#[async_trait]
impl BlobStore for S3BlobClient {
    async fn put(&self, id: &ImageId, data: &[u8], content_type: &str) -> Result<PutOutcome> {
        let key = self.object_key(id);
        let body = ByteStream::from(data.to_vec());

        let result = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .content_type(content_type)
            .if_none_match("*")
            .send()
            .await;

        match result {
            Ok(_) => Ok(PutOutcome::Stored),
            // 409 is what some S3 implementations send for a racing conditional write
            Err(e) if matches!(http_status(&e), Some(412) | Some(409)) => {
                debug!("Blob key {} already taken", key);
                Ok(PutOutcome::AlreadyExists)
            }
            Err(e) => Err(Error::StorageUnavailable(format!(
                "Failed to upload {}: {}",
                key, e
            ))),
        }
    }

    async fn get(&self, id: &ImageId) -> Result<Option<Blob>> {
        let key = self.object_key(id);

        let response = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if http_status(&e) == Some(404) => return Ok(None),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(Error::StorageUnavailable(format!(
                    "Failed to read {}: {}",
                    key, service_err
                )));
            }
        };

        let content_type = response
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|e| Error::StorageUnavailable(format!("Failed to read body: {}", e)))?;

        Ok(Some(Blob {
            bytes: bytes.to_vec(),
            content_type,
        }))
    }

    async fn delete(&self, id: &ImageId) -> Result<()> {
        let key = self.object_key(id);

        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if http_status(&e) == Some(404) => Ok(()),
            Err(e) => Err(Error::StorageUnavailable(format!(
                "Failed to delete {}: {}",
                key, e
            ))),
        }
    }

    async fn list(&self) -> Result<Vec<BlobEntry>> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(&self.key_prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| Error::StorageUnavailable(format!("Failed to list blobs: {}", e)))?;

            for object in page.contents() {
                let Some(key) = object.key() else { continue };
                let Some(raw_id) = key.strip_prefix(&self.key_prefix) else {
                    continue;
                };
                let Ok(id) = ImageId::parse(raw_id) else {
                    debug!("Skipping foreign blob key {}", key);
                    continue;
                };
                let Some(last_modified) = object
                    .last_modified()
                    .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos()))
                else {
                    continue;
                };
                entries.push(BlobEntry { id, last_modified });
            }

            match page.next_continuation_token() {
                Some(token) if page.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(entries)
    }
}
