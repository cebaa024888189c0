//! Blob store client
//!
//! Uploads attachment bytes as named objects under a configured prefix, grants
//! public read access, deletes by id and lists stored objects for the orphan
//! reconciler. The id of a blob is its object key; its public URL is rendered
//! from the id through a [`PublicUrlTemplate`].

use crate::models::BlobRef;
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

pub mod memory;
pub mod s3;

pub use memory::InMemoryBlobStore;
pub use s3::S3BlobStore;

/// Placeholder substituted with the blob id in URL templates.
pub const ID_PLACEHOLDER: &str = "{id}";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BlobError {
    #[error("payload of {size} bytes exceeds limit of {max} bytes")]
    TooLarge { size: usize, max: usize },
    #[error("upload failed: {0}")]
    Upload(String),
    #[error("public-read grant failed: {0}")]
    PermissionGrant(String),
    #[error("delete failed: {0}")]
    Delete(String),
    #[error("list failed: {0}")]
    List(String),
}

/// An object currently held by the blob store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub id: String,
    pub last_modified_ms: i64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `content` as a new object and return its reference.
    async fn upload(&self, name: &str, mime_type: &str, content: Bytes)
        -> Result<BlobRef, BlobError>;

    /// Grant anyone-with-link read access.
    async fn make_public(&self, id: &str) -> Result<(), BlobError>;

    /// Delete an object. Deleting an unknown id succeeds.
    async fn delete(&self, id: &str) -> Result<(), BlobError>;

    /// Every object under the configured prefix.
    async fn list(&self) -> Result<Vec<StoredBlob>, BlobError>;

    async fn health_check(&self) -> Result<(), BlobError>;
}

/// URL template such as `https://cdn.example.com/{id}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicUrlTemplate(String);

impl PublicUrlTemplate {
    pub fn new(template: impl Into<String>) -> Result<Self, String> {
        let template = template.into();
        if !template.contains(ID_PLACEHOLDER) {
            return Err(format!(
                "public URL template '{}' must contain {}",
                template, ID_PLACEHOLDER
            ));
        }
        Ok(Self(template))
    }

    pub fn render(&self, id: &str) -> String {
        self.0.replace(ID_PLACEHOLDER, id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reject payloads over the configured maximum before any remote call.
pub fn ensure_within_limit(size: usize, max: usize) -> Result<(), BlobError> {
    if size > max {
        return Err(BlobError::TooLarge { size, max });
    }
    Ok(())
}

/// Build a fresh object key `{prefix}/{uuid}-{name}`.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    let name = sanitize_name(name);
    if prefix.is_empty() {
        format!("{}-{}", Uuid::new_v4(), name)
    } else {
        format!("{}/{}-{}", prefix, Uuid::new_v4(), name)
    }
}

fn sanitize_name(name: &str) -> String {
    const MAX_NAME_CHARS: usize = 100;

    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_CHARS)
        .collect();

    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}
