/// S3 (and S3-compatible) blob store
///
/// Objects are written under `{prefix}/` in a single bucket. Public access is
/// granted per object with the `public-read` canned ACL, so the bucket must
/// allow object ACLs for `make_public` to succeed.
use super::{ensure_within_limit, object_key, BlobError, BlobStore, PublicUrlTemplate, StoredBlob};
use crate::config::BlobConfig;
use crate::models::BlobRef;
use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client;
use bytes::Bytes;
use std::sync::Arc;

#[derive(Clone)]
pub struct S3BlobStore {
    client: Arc<Client>,
    bucket: String,
    prefix: String,
    url_template: PublicUrlTemplate,
    max_bytes: usize,
}

impl S3BlobStore {
    pub fn new(
        client: Client,
        bucket: impl Into<String>,
        prefix: impl Into<String>,
        url_template: PublicUrlTemplate,
        max_bytes: usize,
    ) -> Self {
        Self {
            client: Arc::new(client),
            bucket: bucket.into(),
            prefix: prefix.into(),
            url_template,
            max_bytes,
        }
    }

    /// Build a client from configuration, falling back to the default AWS
    /// credential chain when no static keys are set.
    pub async fn connect(config: &BlobConfig, max_bytes: usize) -> anyhow::Result<Self> {
        use aws_sdk_s3::config::{Credentials, Region};

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key_id), Some(secret_access_key)) =
            (&config.access_key_id, &config.secret_access_key)
        {
            let credentials = Credentials::new(
                access_key_id,
                secret_access_key,
                None,
                None,
                "guestboard_service_s3",
            );
            loader = loader.credentials_provider(credentials);
        }

        // S3-compatible stores such as MinIO
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(config.endpoint.is_some())
            .build();

        let url_template = PublicUrlTemplate::new(config.public_url_template.clone())
            .map_err(anyhow::Error::msg)
            .context("invalid blob public URL template")?;

        tracing::info!(bucket = %config.bucket, prefix = %config.prefix, "S3 blob store initialized");

        Ok(Self::new(
            Client::from_conf(s3_config),
            config.bucket.clone(),
            config.prefix.clone(),
            url_template,
            max_bytes,
        ))
    }

    fn list_prefix(&self) -> Option<String> {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            None
        } else {
            Some(format!("{}/", prefix))
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        name: &str,
        mime_type: &str,
        content: Bytes,
    ) -> Result<BlobRef, BlobError> {
        ensure_within_limit(content.len(), self.max_bytes)?;

        let key = object_key(&self.prefix, name);
        let size = content.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type(mime_type)
            .content_length(size as i64)
            .body(ByteStream::from(content))
            .send()
            .await
            .map_err(|e| BlobError::Upload(e.to_string()))?;

        tracing::debug!(blob_id = %key, size, "Uploaded blob");

        Ok(BlobRef {
            url: self.url_template.render(&key),
            id: key,
            name: name.to_string(),
        })
    }

    async fn make_public(&self, id: &str) -> Result<(), BlobError> {
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(id)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| BlobError::PermissionGrant(e.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), BlobError> {
        match self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(id)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let not_found = err.code() == Some("NoSuchKey")
                    || err.raw_response().map(|r| r.status().as_u16()) == Some(404);
                if not_found {
                    tracing::debug!(blob_id = %id, "Blob already gone");
                    Ok(())
                } else {
                    Err(BlobError::Delete(err.to_string()))
                }
            }
        }
    }

    async fn list(&self) -> Result<Vec<StoredBlob>, BlobError> {
        let mut blobs = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_prefix(self.list_prefix())
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| BlobError::List(e.to_string()))?;

            blobs.extend(response.contents().iter().filter_map(|obj| {
                obj.key().map(|key| StoredBlob {
                    id: key.to_string(),
                    last_modified_ms: obj
                        .last_modified()
                        .and_then(|t| t.to_millis().ok())
                        // unknown age: never old enough to reclaim
                        .unwrap_or(i64::MAX),
                })
            }));

            if !response.is_truncated().unwrap_or(false) {
                break;
            }
            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }

        Ok(blobs)
    }

    async fn health_check(&self) -> Result<(), BlobError> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map(|_| ())
            .map_err(|e| BlobError::List(e.to_string()))
    }
}
