/// Metadata store client
///
/// Posts and guests are kept as documents keyed by string ids. Two backends
/// exist: Postgres (JSONB documents) for deployments and an in-process map for
/// development and tests.
use crate::models::{Guest, GuestFields, NewPost, Post};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashSet;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryMetadataStore;
pub use postgres::PgMetadataStore;

/// Finite, non-restartable read over a snapshot of posts.
pub type PostStream = BoxStream<'static, Post>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),
    #[error("malformed document: {0}")]
    Serialization(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .map(|code| code == "23505")
            .unwrap_or(false);
        if unique_violation {
            StoreError::Conflict(err.to_string())
        } else {
            StoreError::Database(err.to_string())
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Create or update a guest. With `merge`, supplied fields overwrite and
    /// omitted ones are kept, and `friends` is union-appended; without it the
    /// record is replaced.
    async fn upsert_guest(
        &self,
        guest_id: &str,
        fields: GuestFields,
        merge: bool,
        updated_at: i64,
    ) -> Result<(), StoreError>;

    async fn get_guest(&self, guest_id: &str) -> Result<Option<Guest>, StoreError>;

    /// Case-insensitive "contains" match over guest name and email.
    async fn search_guests(&self, query: &str, limit: usize) -> Result<Vec<Guest>, StoreError>;

    /// Write the full record in one step, assigning an id when `post.id` is
    /// `None`. Returns the id the post is stored under.
    async fn create_post(&self, post: NewPost) -> Result<String, StoreError>;

    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError>;

    /// Newest first, at most `limit` posts that are still live at `now`.
    async fn list_recent_posts(&self, limit: usize, now: i64) -> Result<PostStream, StoreError>;

    /// All posts with `expires_at <= now`.
    async fn find_expired(&self, now: i64) -> Result<Vec<Post>, StoreError>;

    /// Delete a post. Deleting an unknown id succeeds.
    async fn delete_post(&self, id: &str) -> Result<(), StoreError>;

    /// Blob ids referenced by any stored post.
    async fn referenced_blob_ids(&self) -> Result<HashSet<String>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
