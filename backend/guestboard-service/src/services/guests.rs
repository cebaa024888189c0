/// Guest registry
///
/// Guests are keyed by an id derived from their email. Profile submissions
/// merge into the stored record and friend links only ever accumulate.
use crate::clock::Clock;
use crate::db::MetadataStore;
use crate::error::{ServiceError, ValidationError};
use crate::models::{normalize_guest_id, Guest, GuestFields, GuestProfile};
use crate::resilience::{with_timeout, CallSite};
use std::sync::Arc;
use std::time::Duration;

const MAX_SEARCH_RESULTS: usize = 50;

pub struct GuestRegistry {
    meta: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
}

impl GuestRegistry {
    pub fn new(meta: Arc<dyn MetadataStore>, clock: Arc<dyn Clock>, call_timeout: Duration) -> Self {
        Self {
            meta,
            clock,
            call_timeout,
        }
    }

    /// Create or update the guest identified by `profile.email`.
    pub async fn upsert_profile(&self, profile: GuestProfile) -> Result<Guest, ServiceError> {
        let guest_id =
            normalize_guest_id(&profile.email).ok_or(ValidationError::InvalidGuestEmail)?;
        let fields = GuestFields {
            name: non_blank(profile.name),
            email: Some(profile.email.trim().to_string()),
            phone: non_blank(profile.phone),
            ..Default::default()
        };

        self.upsert(&guest_id, fields).await?;
        tracing::info!(guest_id = %guest_id, "Guest profile saved");
        self.require(&guest_id).await
    }

    /// Record `friend_id` as a friend of `guest_id`. Adding an existing friend
    /// is a no-op.
    pub async fn add_friend(&self, guest_id: &str, friend_id: &str) -> Result<Guest, ServiceError> {
        let guest_id = guest_id.trim();
        if guest_id.is_empty() {
            return Err(ValidationError::MissingGuestId.into());
        }
        let friend_id = friend_id.trim();
        if friend_id.is_empty() {
            return Err(ValidationError::MissingFriendId.into());
        }

        self.upsert(guest_id, GuestFields::friend(friend_id)).await?;
        self.require(guest_id).await
    }

    pub async fn get_guest(&self, guest_id: &str) -> Result<Option<Guest>, ServiceError> {
        with_timeout(self.call_timeout, CallSite::GetGuest, self.meta.get_guest(guest_id))
            .await
            .map_err(|err| {
                err.log(guest_id);
                ServiceError::Store(err.to_string())
            })
    }

    /// Guests whose name or email contains `query`. Empty on store failure.
    pub async fn search(&self, query: &str) -> Vec<Guest> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        match with_timeout(
            self.call_timeout,
            CallSite::SearchGuests,
            self.meta.search_guests(query, MAX_SEARCH_RESULTS),
        )
        .await
        {
            Ok(guests) => guests,
            Err(err) => {
                err.log(query);
                Vec::new()
            }
        }
    }

    async fn upsert(&self, guest_id: &str, fields: GuestFields) -> Result<(), ServiceError> {
        let updated_at = self.clock.now_millis();
        with_timeout(
            self.call_timeout,
            CallSite::UpsertGuest,
            self.meta.upsert_guest(guest_id, fields, true, updated_at),
        )
        .await
        .map_err(|err| {
            err.log(guest_id);
            ServiceError::Store(err.to_string())
        })
    }

    async fn require(&self, guest_id: &str) -> Result<Guest, ServiceError> {
        self.get_guest(guest_id).await?.ok_or_else(|| {
            ServiceError::Store(format!("guest {} missing after upsert", guest_id))
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
