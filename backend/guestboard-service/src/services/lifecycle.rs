//! Post lifecycle: publish, list, expire.
//!
//! A post moves `Pending -> Live -> Expired -> Deleted`. Publishing uploads
//! the attachment before the metadata record is written, so a stored post
//! never points at a missing blob. Expiry is driven by [`PostLifecycleManager::sweep`],
//! which the scheduler calls on a fixed interval.

use crate::blob::{BlobError, BlobStore};
use crate::clock::Clock;
use crate::config::{LifecycleConfig, PostIdScheme};
use crate::db::{MetadataStore, PostStream};
use crate::error::{AttachmentError, ServiceError, ValidationError};
use crate::metrics::lifecycle as metrics;
use crate::models::{AttachmentUpload, BlobRef, NewPost, Post, PublishRequest, PublishedPost};
use crate::resilience::{with_timeout, CallError, CallSite};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Outcome of one expiry sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired posts found at the start of the run
    pub found: usize,
    pub posts_deleted: usize,
    pub blobs_deleted: usize,
    /// Posts left in place for the next run
    pub failed: usize,
}

/// Outcome of one orphan blob reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub scanned: usize,
    pub orphans: usize,
    pub deleted: usize,
    pub failed: usize,
}

enum ExpireOutcome {
    Deleted { had_blob: bool },
    Failed,
}

pub struct PostLifecycleManager {
    blob: Arc<dyn BlobStore>,
    meta: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl PostLifecycleManager {
    pub fn new(
        config: &LifecycleConfig,
        blob: Arc<dyn BlobStore>,
        meta: Arc<dyn MetadataStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            blob,
            meta,
            clock,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Validate, store the attachment (if any), then write the post record.
    pub async fn publish(&self, request: PublishRequest) -> Result<PublishedPost, ServiceError> {
        let result = self.publish_inner(request).await;
        match &result {
            Ok(published) => {
                metrics::record_publish("success");
                info!(
                    post_id = %published.post_id,
                    guest_id = %published.post.guest_id,
                    expires_at = published.post.expires_at,
                    has_attachment = published.post.attachment.is_some(),
                    "Post published"
                );
            }
            Err(err) => {
                metrics::record_publish(err.kind());
                debug!(error = %err, "Publish rejected");
            }
        }
        result
    }

    async fn publish_inner(&self, request: PublishRequest) -> Result<PublishedPost, ServiceError> {
        let PublishRequest {
            guest_id,
            title,
            text,
            attachment,
        } = request;

        let guest_id = guest_id.trim().to_string();
        if guest_id.is_empty() {
            return Err(ValidationError::MissingGuestId.into());
        }
        let title = title.trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::MissingTitle.into());
        }
        let text = text.filter(|t| !t.trim().is_empty());
        if let Some(body) = &text {
            let words = word_count(body);
            if words > self.config.max_text_words {
                return Err(ValidationError::TextTooLong {
                    words,
                    max: self.config.max_text_words,
                }
                .into());
            }
        }
        if let Some(upload) = &attachment {
            if upload.name.trim().is_empty() {
                return Err(ValidationError::MissingFileName.into());
            }
            self.check_attachment(upload)?;
        }

        let stored = match attachment {
            Some(upload) => Some(self.store_attachment(upload).await?),
            None => None,
        };

        let created_at = self.clock.now_millis();
        let expires_at = created_at + self.config.ttl_millis();
        let id = match self.config.post_id_scheme {
            PostIdScheme::Store => None,
            PostIdScheme::Derived => Some(format!("{}-{}", guest_id, created_at)),
        };

        let new_post = NewPost {
            id,
            guest_id,
            title,
            text,
            attachment: stored,
            created_at,
            expires_at,
        };

        let post_id = match with_timeout(
            self.config.call_timeout(),
            CallSite::CreatePost,
            self.meta.create_post(new_post.clone()),
        )
        .await
        {
            Ok(id) => id,
            Err(err) => {
                note_failure(&err, &new_post.guest_id);
                if let Some(blob) = &new_post.attachment {
                    // left for the orphan reconciler
                    warn!(blob_id = %blob.id, "Post record not written, attachment is unreferenced");
                }
                return Err(ServiceError::Store(err.to_string()));
            }
        };

        Ok(PublishedPost {
            post: new_post.into_post(post_id.clone()),
            post_id,
        })
    }

    fn check_attachment(&self, upload: &AttachmentUpload) -> Result<(), AttachmentError> {
        if upload.bytes.is_empty() {
            return Err(AttachmentError::Empty);
        }
        if upload.mime_type.parse::<mime::Mime>().is_err() {
            return Err(AttachmentError::InvalidMimeType(upload.mime_type.clone()));
        }
        let size = upload.bytes.len();
        if size > self.config.max_attachment_bytes {
            return Err(AttachmentError::TooLarge {
                size,
                max: self.config.max_attachment_bytes,
            });
        }
        Ok(())
    }

    async fn store_attachment(&self, upload: AttachmentUpload) -> Result<BlobRef, ServiceError> {
        let stored = with_timeout(
            self.config.call_timeout(),
            CallSite::BlobUpload,
            self.blob
                .upload(&upload.name, &upload.mime_type, upload.bytes.clone()),
        )
        .await;

        let blob = match stored {
            Ok(blob) => blob,
            Err(err) => {
                note_failure(&err, &upload.name);
                let attachment_error = match err.source_error() {
                    Some(BlobError::TooLarge { size, max }) => AttachmentError::TooLarge {
                        size: *size,
                        max: *max,
                    },
                    _ => AttachmentError::Upload(err.to_string()),
                };
                return Err(attachment_error.into());
            }
        };

        if let Err(err) = with_timeout(
            self.config.call_timeout(),
            CallSite::BlobMakePublic,
            self.blob.make_public(&blob.id),
        )
        .await
        {
            note_failure(&err, &blob.id);
        }

        Ok(blob)
    }

    /// Most recent live posts, newest first. Yields nothing when the store is
    /// unavailable.
    pub async fn list_recent(&self, limit: Option<usize>) -> PostStream {
        if limit == Some(0) {
            return stream::empty().boxed();
        }
        let limit = limit
            .unwrap_or(self.config.listing_limit)
            .clamp(1, self.config.listing_limit.max(1));
        let now = self.clock.now_millis();

        match with_timeout(
            self.config.call_timeout(),
            CallSite::ListRecentPosts,
            self.meta.list_recent_posts(limit, now),
        )
        .await
        {
            Ok(posts) => posts
                .filter(move |post| futures::future::ready(!post.is_expired_at(now)))
                .boxed(),
            Err(err) => {
                note_failure(&err, "listing");
                stream::empty().boxed()
            }
        }
    }

    /// A single live post. Expired posts awaiting the sweep read as absent.
    pub async fn get_post(&self, id: &str) -> Result<Option<Post>, ServiceError> {
        let now = self.clock.now_millis();
        match with_timeout(self.config.call_timeout(), CallSite::GetPost, self.meta.get_post(id))
            .await
        {
            Ok(post) => Ok(post.filter(|p| !p.is_expired_at(now))),
            Err(err) => {
                note_failure(&err, id);
                Err(ServiceError::Store(err.to_string()))
            }
        }
    }

    /// Delete every post whose expiry has passed, together with its blob.
    ///
    /// Posts are processed concurrently. A post whose blob could not be
    /// deleted keeps its record so the next run tries again; nothing is
    /// retried within a run.
    pub async fn sweep(&self) -> Result<SweepReport, ServiceError> {
        let now = self.clock.now_millis();
        let expired = match with_timeout(
            self.config.call_timeout(),
            CallSite::FindExpired,
            self.meta.find_expired(now),
        )
        .await
        {
            Ok(posts) => posts,
            Err(err) => {
                note_failure(&err, "sweep");
                return Err(ServiceError::Store(err.to_string()));
            }
        };

        let mut report = SweepReport {
            found: expired.len(),
            ..Default::default()
        };
        metrics::set_expired_found(expired.len() as i64);
        if expired.is_empty() {
            return Ok(report);
        }

        let outcomes: Vec<ExpireOutcome> = stream::iter(expired)
            .map(|post| self.expire_post(post))
            .buffer_unordered(self.config.sweep_concurrency.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                ExpireOutcome::Deleted { had_blob } => {
                    report.posts_deleted += 1;
                    if had_blob {
                        report.blobs_deleted += 1;
                    }
                }
                ExpireOutcome::Failed => report.failed += 1,
            }
        }

        metrics::record_deleted("post", report.posts_deleted as u64);
        metrics::record_deleted("blob", report.blobs_deleted as u64);
        Ok(report)
    }

    async fn expire_post(&self, post: Post) -> ExpireOutcome {
        let timeout = self.config.call_timeout();

        let had_blob = match post.blob_id() {
            Some(blob_id) => {
                if let Err(err) =
                    with_timeout(timeout, CallSite::BlobDelete, self.blob.delete(blob_id)).await
                {
                    note_failure(&err, &post.id);
                    return ExpireOutcome::Failed;
                }
                true
            }
            None => false,
        };

        match with_timeout(timeout, CallSite::DeletePost, self.meta.delete_post(&post.id)).await {
            Ok(()) => {
                debug!(post_id = %post.id, expired_at = post.expires_at, "Post expired");
                ExpireOutcome::Deleted { had_blob }
            }
            Err(err) => {
                note_failure(&err, &post.id);
                ExpireOutcome::Failed
            }
        }
    }

    /// Delete stored blobs that no post references and that are older than
    /// `grace`.
    pub async fn reconcile_orphans(&self, grace: Duration) -> Result<ReconcileReport, ServiceError> {
        let timeout = self.config.call_timeout();

        let blobs = match with_timeout(timeout, CallSite::BlobList, self.blob.list()).await {
            Ok(blobs) => blobs,
            Err(err) => {
                note_failure(&err, "reconcile");
                return Err(ServiceError::Store(err.to_string()));
            }
        };
        let referenced: HashSet<String> = match with_timeout(
            timeout,
            CallSite::ReferencedBlobIds,
            self.meta.referenced_blob_ids(),
        )
        .await
        {
            Ok(ids) => ids,
            Err(err) => {
                note_failure(&err, "reconcile");
                return Err(ServiceError::Store(err.to_string()));
            }
        };

        let grace_ms = i64::try_from(grace.as_millis()).unwrap_or(i64::MAX);
        let cutoff = self.clock.now_millis().saturating_sub(grace_ms);
        let orphans: Vec<String> = blobs
            .iter()
            .filter(|blob| !referenced.contains(&blob.id) && blob.last_modified_ms <= cutoff)
            .map(|blob| blob.id.clone())
            .collect();

        let mut report = ReconcileReport {
            scanned: blobs.len(),
            orphans: orphans.len(),
            ..Default::default()
        };

        let results: Vec<bool> = stream::iter(orphans)
            .map(|id| async move {
                match with_timeout(timeout, CallSite::OrphanBlobDelete, self.blob.delete(&id)).await
                {
                    Ok(()) => {
                        info!(blob_id = %id, "Reclaimed orphan blob");
                        true
                    }
                    Err(err) => {
                        note_failure(&err, &id);
                        false
                    }
                }
            })
            .buffer_unordered(self.config.sweep_concurrency.max(1))
            .collect()
            .await;

        report.deleted = results.iter().filter(|ok| **ok).count();
        report.failed = results.len() - report.deleted;
        metrics::record_deleted("orphan_blob", report.deleted as u64);
        Ok(report)
    }
}

fn note_failure<E>(err: &CallError<E>, subject: &str)
where
    E: std::error::Error + 'static,
{
    metrics::record_call_failure(err.site(), err.is_timeout());
    err.log(subject);
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::{MockBlobStore, StoredBlob};
    use crate::clock::ManualClock;
    use crate::db::{MockMetadataStore, StoreError};
    use bytes::Bytes;
    use mockall::predicate::eq;

    const NOW: i64 = 1_700_000_000_000;

    fn manager(blob: MockBlobStore, meta: MockMetadataStore) -> PostLifecycleManager {
        manager_with(LifecycleConfig::default(), blob, meta)
    }

    fn manager_with(
        config: LifecycleConfig,
        blob: MockBlobStore,
        meta: MockMetadataStore,
    ) -> PostLifecycleManager {
        PostLifecycleManager::new(
            &config,
            Arc::new(blob),
            Arc::new(meta),
            Arc::new(ManualClock::new(NOW)),
        )
    }

    fn expired_post(id: &str, blob_id: Option<&str>) -> Post {
        Post {
            id: id.to_string(),
            guest_id: "guest".to_string(),
            title: "t".to_string(),
            text: None,
            attachment: blob_id.map(|b| BlobRef {
                id: b.to_string(),
                url: format!("https://cdn/{}", b),
                name: "f.png".to_string(),
            }),
            created_at: NOW - 10,
            expires_at: NOW - 1,
        }
    }

    fn upload(bytes: &'static [u8]) -> AttachmentUpload {
        AttachmentUpload {
            name: "photo.png".to_string(),
            mime_type: "image/png".to_string(),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn test_word_count() {
        assert_eq!(word_count("  one two\nthree\tfour "), 4);
        assert_eq!(word_count(""), 0);
    }

    #[tokio::test]
    async fn test_publish_without_attachment_touches_no_blob() {
        let blob = MockBlobStore::new();
        let mut meta = MockMetadataStore::new();
        meta.expect_create_post()
            .withf(|p| p.id.is_none() && p.expires_at - p.created_at == 24 * 3_600_000)
            .times(1)
            .returning(|_| Ok("generated".to_string()));

        let published = manager(blob, meta)
            .publish(PublishRequest {
                guest_id: "a_b_com".into(),
                title: "Hello".into(),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(published.post_id, "generated");
        assert_eq!(published.post.created_at, NOW);
    }

    #[tokio::test]
    async fn test_validation_runs_before_any_store_call() {
        // no expectations: any call panics
        let mgr = manager(MockBlobStore::new(), MockMetadataStore::new());

        let err = mgr
            .publish(PublishRequest {
                guest_id: "  ".into(),
                title: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Validation(ValidationError::MissingGuestId));

        let err = mgr
            .publish(PublishRequest {
                guest_id: "g".into(),
                title: "x".into(),
                attachment: Some(upload(b"")),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err, ServiceError::Attachment(AttachmentError::Empty));
    }

    #[tokio::test]
    async fn test_invalid_mime_type_rejected() {
        let mgr = manager(MockBlobStore::new(), MockMetadataStore::new());
        let mut bad = upload(b"data");
        bad.mime_type = "not a mime".to_string();

        let err = mgr
            .publish(PublishRequest {
                guest_id: "g".into(),
                title: "x".into(),
                attachment: Some(bad),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some("invalid_mime_type"));
    }

    #[tokio::test]
    async fn test_make_public_failure_is_not_fatal() {
        let mut blob = MockBlobStore::new();
        blob.expect_upload().times(1).returning(|name, _, _| {
            Ok(BlobRef {
                id: "att/1-photo.png".to_string(),
                url: "https://cdn/att/1-photo.png".to_string(),
                name: name.to_string(),
            })
        });
        blob.expect_make_public()
            .times(1)
            .returning(|_| Err(BlobError::PermissionGrant("denied".into())));
        let mut meta = MockMetadataStore::new();
        meta.expect_create_post()
            .withf(|p| p.attachment.as_ref().map(|a| a.id.as_str()) == Some("att/1-photo.png"))
            .times(1)
            .returning(|_| Ok("p1".to_string()));

        let published = manager(blob, meta)
            .publish(PublishRequest {
                guest_id: "g".into(),
                title: "x".into(),
                attachment: Some(upload(b"png")),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(published.post.attachment.unwrap().url, "https://cdn/att/1-photo.png");
    }

    #[tokio::test]
    async fn test_upload_failure_writes_no_post() {
        let mut blob = MockBlobStore::new();
        blob.expect_upload()
            .returning(|_, _, _| Err(BlobError::Upload("connection reset".into())));
        let mgr = manager(blob, MockMetadataStore::new());

        let err = mgr
            .publish(PublishRequest {
                guest_id: "g".into(),
                title: "x".into(),
                attachment: Some(upload(b"png")),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.reason(), Some("upload_failed"));
    }

    #[tokio::test]
    async fn test_derived_post_id() {
        let mut meta = MockMetadataStore::new();
        meta.expect_create_post()
            .withf(|p| p.id.as_deref() == Some("a_b_com-1700000000000"))
            .returning(|p| Ok(p.id.unwrap_or_default()));
        let config = LifecycleConfig {
            post_id_scheme: PostIdScheme::Derived,
            ..Default::default()
        };

        let published = manager_with(config, MockBlobStore::new(), meta)
            .publish(PublishRequest {
                guest_id: "a_b_com".into(),
                title: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(published.post_id, "a_b_com-1700000000000");
    }

    #[tokio::test]
    async fn test_create_post_failure_is_store_error() {
        let mut meta = MockMetadataStore::new();
        meta.expect_create_post()
            .returning(|_| Err(StoreError::Database("down".into())));

        let err = manager(MockBlobStore::new(), meta)
            .publish(PublishRequest {
                guest_id: "g".into(),
                title: "x".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "store_error");
    }

    #[tokio::test]
    async fn test_sweep_skips_metadata_delete_when_blob_delete_fails() {
        let mut blob = MockBlobStore::new();
        blob.expect_delete()
            .with(eq("b1"))
            .returning(|_| Err(BlobError::Delete("503".into())));
        blob.expect_delete().with(eq("b2")).returning(|_| Ok(()));

        let mut meta = MockMetadataStore::new();
        meta.expect_find_expired().with(eq(NOW)).returning(|_| {
            Ok(vec![
                expired_post("p1", Some("b1")),
                expired_post("p2", Some("b2")),
                expired_post("p3", None),
            ])
        });
        meta.expect_delete_post().with(eq("p2")).times(1).returning(|_| Ok(()));
        meta.expect_delete_post().with(eq("p3")).times(1).returning(|_| Ok(()));

        let report = manager(blob, meta).sweep().await.unwrap();
        assert_eq!(
            report,
            SweepReport {
                found: 3,
                posts_deleted: 2,
                blobs_deleted: 1,
                failed: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_sweep_fails_when_expired_query_fails() {
        let mut meta = MockMetadataStore::new();
        meta.expect_find_expired()
            .returning(|_| Err(StoreError::Database("down".into())));

        let err = manager(MockBlobStore::new(), meta).sweep().await.unwrap_err();
        assert_eq!(err.kind(), "store_error");
    }

    #[tokio::test]
    async fn test_list_degrades_to_empty() {
        let mut meta = MockMetadataStore::new();
        meta.expect_list_recent_posts()
            .returning(|_, _| Err(StoreError::Database("down".into())));

        let posts: Vec<Post> = manager(MockBlobStore::new(), meta)
            .list_recent(None)
            .await
            .collect()
            .await;
        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn test_list_limit_is_clamped() {
        let mut meta = MockMetadataStore::new();
        meta.expect_list_recent_posts()
            .with(eq(100usize), eq(NOW))
            .times(1)
            .returning(|_, _| Ok(stream::empty().boxed()));

        let _ = manager(MockBlobStore::new(), meta).list_recent(Some(5_000)).await;
    }

    #[tokio::test]
    async fn test_zero_limit_skips_the_store() {
        let posts: Vec<Post> = manager(MockBlobStore::new(), MockMetadataStore::new())
            .list_recent(Some(0))
            .await
            .collect()
            .await;
        assert!(posts.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_deletes_only_old_unreferenced_blobs() {
        let mut blob = MockBlobStore::new();
        blob.expect_list().returning(|| {
            Ok(vec![
                StoredBlob { id: "kept".into(), last_modified_ms: NOW - 7_200_000 },
                StoredBlob { id: "orphan".into(), last_modified_ms: NOW - 7_200_000 },
                StoredBlob { id: "fresh".into(), last_modified_ms: NOW - 1_000 },
            ])
        });
        blob.expect_delete().with(eq("orphan")).times(1).returning(|_| Ok(()));
        let mut meta = MockMetadataStore::new();
        meta.expect_referenced_blob_ids()
            .returning(|| Ok(HashSet::from(["kept".to_string()])));

        let report = manager(blob, meta)
            .reconcile_orphans(Duration::from_secs(3600))
            .await
            .unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.orphans, 1);
        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);
    }
}
