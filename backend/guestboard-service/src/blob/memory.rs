/// In-process blob store for local development and tests
use super::{ensure_within_limit, object_key, BlobError, BlobStore, PublicUrlTemplate, StoredBlob};
use crate::clock::{Clock, SystemClock};
use crate::models::BlobRef;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct MemoryBlob {
    mime_type: String,
    content: Bytes,
    public: bool,
    last_modified_ms: i64,
}

pub struct InMemoryBlobStore {
    blobs: DashMap<String, MemoryBlob>,
    prefix: String,
    url_template: PublicUrlTemplate,
    max_bytes: usize,
    clock: Arc<dyn Clock>,
}

impl InMemoryBlobStore {
    pub fn new(prefix: impl Into<String>, url_template: PublicUrlTemplate, max_bytes: usize) -> Self {
        Self {
            blobs: DashMap::new(),
            prefix: prefix.into(),
            url_template,
            max_bytes,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn contains(&self, id: &str) -> bool {
        self.blobs.contains_key(id)
    }

    pub fn is_public(&self, id: &str) -> bool {
        self.blobs.get(id).map(|b| b.public).unwrap_or(false)
    }

    pub fn content(&self, id: &str) -> Option<Bytes> {
        self.blobs.get(id).map(|b| b.content.clone())
    }

    pub fn mime_type(&self, id: &str) -> Option<String> {
        self.blobs.get(id).map(|b| b.mime_type.clone())
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Place an object directly, bypassing `upload`.
    pub fn insert_raw(&self, id: impl Into<String>, content: Bytes, last_modified_ms: i64) {
        self.blobs.insert(
            id.into(),
            MemoryBlob {
                mime_type: "application/octet-stream".to_string(),
                content,
                public: false,
                last_modified_ms,
            },
        );
    }
}

#[async_trait]
impl BlobStore for InMemoryBlobStore {
    async fn upload(
        &self,
        name: &str,
        mime_type: &str,
        content: Bytes,
    ) -> Result<BlobRef, BlobError> {
        ensure_within_limit(content.len(), self.max_bytes)?;

        let id = object_key(&self.prefix, name);
        self.blobs.insert(
            id.clone(),
            MemoryBlob {
                mime_type: mime_type.to_string(),
                content,
                public: false,
                last_modified_ms: self.clock.now_millis(),
            },
        );

        Ok(BlobRef {
            url: self.url_template.render(&id),
            id,
            name: name.to_string(),
        })
    }

    async fn make_public(&self, id: &str) -> Result<(), BlobError> {
        match self.blobs.get_mut(id) {
            Some(mut blob) => {
                blob.public = true;
                Ok(())
            }
            None => Err(BlobError::PermissionGrant(format!("no such blob {}", id))),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), BlobError> {
        self.blobs.remove(id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<StoredBlob>, BlobError> {
        Ok(self
            .blobs
            .iter()
            .map(|entry| StoredBlob {
                id: entry.key().clone(),
                last_modified_ms: entry.value().last_modified_ms,
            })
            .collect())
    }

    async fn health_check(&self) -> Result<(), BlobError> {
        Ok(())
    }
}
