//! Timeouts and failure policy for external calls
//!
//! Every blob-store and metadata-store call made by the services is wrapped
//! by [`with_timeout`] and tagged with a [`CallSite`]. What happens when that
//! call fails is decided in one place, [`CallSite::policy`].

use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// What the caller does when an external call fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Abort the enclosing operation and surface the error.
    FailCaller,
    /// Log and carry on; the degraded outcome is acceptable.
    LogAndIgnore,
    /// Log and leave the work for the next scheduled run.
    RetryNextCycle,
}

/// Every external call the core makes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallSite {
    BlobUpload,
    BlobMakePublic,
    BlobDelete,
    BlobList,
    CreatePost,
    GetPost,
    ListRecentPosts,
    FindExpired,
    DeletePost,
    ReferencedBlobIds,
    UpsertGuest,
    GetGuest,
    SearchGuests,
    /// Blob deletion issued by the orphan reconciler
    OrphanBlobDelete,
}

impl CallSite {
    pub const fn policy(self) -> FailurePolicy {
        match self {
            CallSite::BlobUpload
            | CallSite::CreatePost
            | CallSite::GetPost
            | CallSite::UpsertGuest
            | CallSite::GetGuest => FailurePolicy::FailCaller,
            // a private attachment and an empty listing are safe degraded states
            CallSite::BlobMakePublic | CallSite::ListRecentPosts | CallSite::SearchGuests => {
                FailurePolicy::LogAndIgnore
            }
            CallSite::BlobDelete
            | CallSite::BlobList
            | CallSite::FindExpired
            | CallSite::DeletePost
            | CallSite::ReferencedBlobIds
            | CallSite::OrphanBlobDelete => FailurePolicy::RetryNextCycle,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            CallSite::BlobUpload => "blob_upload",
            CallSite::BlobMakePublic => "blob_make_public",
            CallSite::BlobDelete => "blob_delete",
            CallSite::BlobList => "blob_list",
            CallSite::CreatePost => "create_post",
            CallSite::GetPost => "get_post",
            CallSite::ListRecentPosts => "list_recent_posts",
            CallSite::FindExpired => "find_expired",
            CallSite::DeletePost => "delete_post",
            CallSite::ReferencedBlobIds => "referenced_blob_ids",
            CallSite::UpsertGuest => "upsert_guest",
            CallSite::GetGuest => "get_guest",
            CallSite::SearchGuests => "search_guests",
            CallSite::OrphanBlobDelete => "orphan_blob_delete",
        }
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of a guarded external call.
#[derive(Debug, thiserror::Error)]
pub enum CallError<E>
where
    E: std::error::Error + 'static,
{
    #[error("{site} timed out after {elapsed:?}")]
    Elapsed { site: CallSite, elapsed: Duration },
    #[error("{site} failed: {source}")]
    Failed {
        site: CallSite,
        #[source]
        source: E,
    },
}

impl<E> CallError<E>
where
    E: std::error::Error + 'static,
{
    pub fn site(&self) -> CallSite {
        match self {
            CallError::Elapsed { site, .. } | CallError::Failed { site, .. } => *site,
        }
    }

    pub fn policy(&self) -> FailurePolicy {
        self.site().policy()
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CallError::Elapsed { .. })
    }

    /// The underlying store error, if the call completed.
    pub fn source_error(&self) -> Option<&E> {
        match self {
            CallError::Failed { source, .. } => Some(source),
            CallError::Elapsed { .. } => None,
        }
    }

    /// Log the failure at the level its policy calls for.
    pub fn log(&self, subject: &str) {
        let site = self.site();
        match site.policy() {
            FailurePolicy::FailCaller => {
                tracing::error!(call = %site, subject, error = %self, "External call failed");
            }
            FailurePolicy::LogAndIgnore => {
                tracing::warn!(call = %site, subject, error = %self, "External call failed, continuing degraded");
            }
            FailurePolicy::RetryNextCycle => {
                tracing::warn!(call = %site, subject, error = %self, "External call failed, will retry next cycle");
            }
        }
    }
}

/// Run `future` with a deadline, tagging any failure with `site`.
pub async fn with_timeout<F, T, E>(
    duration: Duration,
    site: CallSite,
    future: F,
) -> Result<T, CallError<E>>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    match timeout(duration, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(source)) => Err(CallError::Failed { site, source }),
        Err(_) => Err(CallError::Elapsed {
            site,
            elapsed: duration,
        }),
    }
}
