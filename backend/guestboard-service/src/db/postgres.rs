/// Postgres-backed metadata store
///
/// Documents are stored as JSONB bodies; only the fields the store queries on
/// (`guest_id`, `created_at`, `expires_at`) are promoted to columns. Friends
/// live in their own table so union-append is a plain `ON CONFLICT DO NOTHING`.
use super::{MetadataStore, PostStream, StoreError};
use crate::models::{BlobRef, Guest, GuestFields, NewPost, Post};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, PgPool, Row};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize)]
struct PostDocument {
    title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attachment: Option<BlobRef>,
}

const GUEST_COLUMNS: &str = r#"
    g.id, g.body, g.updated_at,
    COALESCE(
        array_agg(f.friend_id ORDER BY f.friend_id) FILTER (WHERE f.friend_id IS NOT NULL),
        '{}'
    ) AS friends
"#;

#[derive(Clone)]
pub struct PgMetadataStore {
    pool: PgPool,
}

impl PgMetadataStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_post(row: &PgRow) -> Result<Post, StoreError> {
        let body: serde_json::Value = row.try_get("body")?;
        let doc: PostDocument = serde_json::from_value(body)?;
        Ok(Post {
            id: row.try_get("id")?,
            guest_id: row.try_get("guest_id")?,
            title: doc.title,
            text: doc.text,
            attachment: doc.attachment,
            created_at: row.try_get("created_at")?,
            expires_at: row.try_get("expires_at")?,
        })
    }

    fn row_to_guest(row: &PgRow) -> Result<Guest, StoreError> {
        let body: serde_json::Value = row.try_get("body")?;
        let fields: GuestFields = serde_json::from_value(body)?;
        Ok(Guest {
            id: row.try_get("id")?,
            name: fields.name,
            email: fields.email,
            phone: fields.phone,
            friends: row.try_get("friends")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Escape LIKE wildcards so user input matches literally.
fn like_pattern(query: &str) -> String {
    let escaped = query
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

#[async_trait]
impl MetadataStore for PgMetadataStore {
    async fn upsert_guest(
        &self,
        guest_id: &str,
        fields: GuestFields,
        merge: bool,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        let body = serde_json::to_value(&fields)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO guests (id, body, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET
                body = CASE WHEN $4 THEN guests.body || EXCLUDED.body ELSE EXCLUDED.body END,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(guest_id)
        .bind(body)
        .bind(updated_at)
        .bind(merge)
        .execute(&mut *tx)
        .await?;

        if !merge {
            sqlx::query("DELETE FROM guest_friends WHERE guest_id = $1")
                .bind(guest_id)
                .execute(&mut *tx)
                .await?;
        }

        for friend_id in &fields.friends {
            sqlx::query(
                r#"INSERT INTO guest_friends (guest_id, friend_id) VALUES ($1, $2)
                   ON CONFLICT (guest_id, friend_id) DO NOTHING"#,
            )
            .bind(guest_id)
            .bind(friend_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_guest(&self, guest_id: &str) -> Result<Option<Guest>, StoreError> {
        let sql = format!(
            r#"SELECT {GUEST_COLUMNS}
               FROM guests g LEFT JOIN guest_friends f ON f.guest_id = g.id
               WHERE g.id = $1
               GROUP BY g.id"#
        );
        let row = sqlx::query(&sql)
            .bind(guest_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_guest).transpose()
    }

    async fn search_guests(&self, query: &str, limit: usize) -> Result<Vec<Guest>, StoreError> {
        let sql = format!(
            r#"SELECT {GUEST_COLUMNS}
               FROM guests g LEFT JOIN guest_friends f ON f.guest_id = g.id
               WHERE g.body->>'name' ILIKE $1 OR g.body->>'email' ILIKE $1
               GROUP BY g.id
               ORDER BY g.id
               LIMIT $2"#
        );
        let rows = sqlx::query(&sql)
            .bind(like_pattern(query))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_guest).collect()
    }

    async fn create_post(&self, post: NewPost) -> Result<String, StoreError> {
        let id = post
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let body = serde_json::to_value(PostDocument {
            title: post.title,
            text: post.text,
            attachment: post.attachment,
        })?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, guest_id, created_at, expires_at, body)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&id)
        .bind(&post.guest_id)
        .bind(post.created_at)
        .bind(post.expires_at)
        .bind(body)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query(
            r#"SELECT id, guest_id, created_at, expires_at, body FROM posts WHERE id = $1"#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_to_post).transpose()
    }

    async fn list_recent_posts(&self, limit: usize, now: i64) -> Result<PostStream, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, guest_id, created_at, expires_at, body
            FROM posts
            WHERE expires_at > $1
            ORDER BY created_at DESC, id
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let posts = rows
            .iter()
            .map(Self::row_to_post)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stream::iter(posts).boxed())
    }

    async fn find_expired(&self, now: i64) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, guest_id, created_at, expires_at, body
            FROM posts
            WHERE expires_at <= $1
            ORDER BY expires_at
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_post).collect()
    }

    async fn delete_post(&self, id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM posts WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn referenced_blob_ids(&self) -> Result<HashSet<String>, StoreError> {
        let ids: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT body->'attachment'->>'blobId'
            FROM posts
            WHERE body->'attachment'->>'blobId' IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("ann"), "%ann%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    }

    #[test]
    fn test_post_document_omits_absent_fields() {
        let value = serde_json::to_value(PostDocument {
            title: "Hello".into(),
            text: None,
            attachment: None,
        })
        .unwrap();
        assert_eq!(value, serde_json::json!({ "title": "Hello" }));
    }
}
