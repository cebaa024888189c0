//! Shared fixtures for integration tests
//!
//! Stores are the in-memory backends wrapped in switches that make selected
//! calls fail, so failure handling can be exercised without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use guestboard_service::blob::{BlobError, BlobStore, InMemoryBlobStore, PublicUrlTemplate, StoredBlob};
use guestboard_service::clock::{Clock, ManualClock};
use guestboard_service::config::LifecycleConfig;
use guestboard_service::db::{InMemoryMetadataStore, MetadataStore, PostStream, StoreError};
use guestboard_service::models::{AttachmentUpload, BlobRef, Guest, GuestFields, NewPost, Post};
use guestboard_service::services::{GuestRegistry, PostLifecycleManager};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const T0: i64 = 1_700_000_000_000;
pub const URL_TEMPLATE: &str = "https://cdn.guestboard.test/{id}";

/// How long a stalled call sleeps; far past any timeout the tests configure.
const STALL: Duration = Duration::from_secs(5);

#[derive(Default)]
pub struct Switch(AtomicBool);

impl Switch {
    pub fn on(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn off(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    fn is_on(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct FlakyBlobStore {
    pub inner: InMemoryBlobStore,
    pub fail_upload: Switch,
    pub fail_make_public: Switch,
    pub fail_delete: Switch,
    pub stall_upload: Switch,
    pub stall_make_public: Switch,
}

#[async_trait]
impl BlobStore for FlakyBlobStore {
    async fn upload(&self, name: &str, mime_type: &str, content: Bytes) -> Result<BlobRef, BlobError> {
        if self.stall_upload.is_on() {
            tokio::time::sleep(STALL).await;
        }
        if self.fail_upload.is_on() {
            return Err(BlobError::Upload("injected".into()));
        }
        self.inner.upload(name, mime_type, content).await
    }

    async fn make_public(&self, id: &str) -> Result<(), BlobError> {
        if self.stall_make_public.is_on() {
            tokio::time::sleep(STALL).await;
        }
        if self.fail_make_public.is_on() {
            return Err(BlobError::PermissionGrant("injected".into()));
        }
        self.inner.make_public(id).await
    }

    async fn delete(&self, id: &str) -> Result<(), BlobError> {
        if self.fail_delete.is_on() {
            return Err(BlobError::Delete("injected".into()));
        }
        self.inner.delete(id).await
    }

    async fn list(&self) -> Result<Vec<StoredBlob>, BlobError> {
        self.inner.list().await
    }

    async fn health_check(&self) -> Result<(), BlobError> {
        self.inner.health_check().await
    }
}

pub struct FlakyMetadataStore {
    pub inner: InMemoryMetadataStore,
    pub fail_create: Switch,
    pub fail_list: Switch,
    pub fail_delete: Switch,
}

#[async_trait]
impl MetadataStore for FlakyMetadataStore {
    async fn upsert_guest(
        &self,
        guest_id: &str,
        fields: GuestFields,
        merge: bool,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        self.inner.upsert_guest(guest_id, fields, merge, updated_at).await
    }

    async fn get_guest(&self, guest_id: &str) -> Result<Option<Guest>, StoreError> {
        self.inner.get_guest(guest_id).await
    }

    async fn search_guests(&self, query: &str, limit: usize) -> Result<Vec<Guest>, StoreError> {
        if self.fail_list.is_on() {
            return Err(StoreError::Database("injected".into()));
        }
        self.inner.search_guests(query, limit).await
    }

    async fn create_post(&self, post: NewPost) -> Result<String, StoreError> {
        if self.fail_create.is_on() {
            return Err(StoreError::Database("injected".into()));
        }
        self.inner.create_post(post).await
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        self.inner.get_post(id).await
    }

    async fn list_recent_posts(&self, limit: usize, now: i64) -> Result<PostStream, StoreError> {
        if self.fail_list.is_on() {
            return Err(StoreError::Database("injected".into()));
        }
        self.inner.list_recent_posts(limit, now).await
    }

    async fn find_expired(&self, now: i64) -> Result<Vec<Post>, StoreError> {
        self.inner.find_expired(now).await
    }

    async fn delete_post(&self, id: &str) -> Result<(), StoreError> {
        if self.fail_delete.is_on() {
            return Err(StoreError::Database("injected".into()));
        }
        self.inner.delete_post(id).await
    }

    async fn referenced_blob_ids(&self) -> Result<HashSet<String>, StoreError> {
        self.inner.referenced_blob_ids().await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.inner.health_check().await
    }
}

pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub blobs: Arc<FlakyBlobStore>,
    pub meta: Arc<FlakyMetadataStore>,
    pub manager: Arc<PostLifecycleManager>,
    pub registry: Arc<GuestRegistry>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(LifecycleConfig::default())
    }

    pub fn with_config(config: LifecycleConfig) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let dyn_clock: Arc<dyn Clock> = clock.clone();

        let template = PublicUrlTemplate::new(URL_TEMPLATE).expect("valid template");
        let blobs = Arc::new(FlakyBlobStore {
            inner: InMemoryBlobStore::new("attachments", template, config.max_attachment_bytes)
                .with_clock(dyn_clock.clone()),
            fail_upload: Switch::default(),
            fail_make_public: Switch::default(),
            fail_delete: Switch::default(),
            stall_upload: Switch::default(),
            stall_make_public: Switch::default(),
        });
        let meta = Arc::new(FlakyMetadataStore {
            inner: InMemoryMetadataStore::new(),
            fail_create: Switch::default(),
            fail_list: Switch::default(),
            fail_delete: Switch::default(),
        });

        let manager = Arc::new(PostLifecycleManager::new(
            &config,
            blobs.clone(),
            meta.clone(),
            dyn_clock.clone(),
        ));
        let registry = Arc::new(GuestRegistry::new(
            meta.clone(),
            dyn_clock,
            config.call_timeout(),
        ));

        Self {
            clock,
            blobs,
            meta,
            manager,
            registry,
        }
    }
}

pub fn attachment(name: &str, mime_type: &str, size: usize) -> AttachmentUpload {
    AttachmentUpload {
        name: name.to_string(),
        mime_type: mime_type.to_string(),
        bytes: Bytes::from(vec![b'x'; size]),
    }
}
