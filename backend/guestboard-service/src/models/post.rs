use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Reference to an object held by the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    #[serde(rename = "blobId")]
    pub id: String,
    /// Public, unauthenticated fetch link rendered from `id`
    pub url: String,
    pub name: String,
}

/// A published post as stored in the metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub guest_id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment: Option<BlobRef>,
    /// Milliseconds since epoch
    pub created_at: i64,
    /// Milliseconds since epoch
    pub expires_at: i64,
}

/// Lifecycle position of a post.
///
/// `Pending` and `Deleted` are never persisted: a post is pending only while
/// its publish call is in flight, and a deleted post no longer has a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostState {
    Pending,
    Live,
    Expired,
    Deleted,
}

impl PostState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostState::Pending => "pending",
            PostState::Live => "live",
            PostState::Expired => "expired",
            PostState::Deleted => "deleted",
        }
    }
}

impl Post {
    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }

    pub fn state_at(&self, now_ms: i64) -> PostState {
        if self.is_expired_at(now_ms) {
            PostState::Expired
        } else {
            PostState::Live
        }
    }

    pub fn blob_id(&self) -> Option<&str> {
        self.attachment.as_ref().map(|a| a.id.as_str())
    }
}

/// Post record handed to the metadata store for creation.
///
/// `id` is `None` when the store is expected to assign one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub id: Option<String>,
    pub guest_id: String,
    pub title: String,
    pub text: Option<String>,
    pub attachment: Option<BlobRef>,
    pub created_at: i64,
    pub expires_at: i64,
}

impl NewPost {
    pub fn into_post(self, id: String) -> Post {
        Post {
            id,
            guest_id: self.guest_id,
            title: self.title,
            text: self.text,
            attachment: self.attachment,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

/// File submitted alongside a post.
#[derive(Debug, Clone)]
pub struct AttachmentUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

/// Inbound publish request.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub guest_id: String,
    pub title: String,
    pub text: Option<String>,
    pub attachment: Option<AttachmentUpload>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedPost {
    pub post_id: String,
    pub post: Post,
}
