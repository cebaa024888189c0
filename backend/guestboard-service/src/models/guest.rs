use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Guest profile as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Guest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub friends: Vec<String>,
    pub updated_at: i64,
}

/// Profile submission body.
#[derive(Debug, Clone, Deserialize)]
pub struct GuestProfile {
    pub name: Option<String>,
    pub email: String,
    pub phone: Option<String>,
}

/// Fields written by an upsert. `None` leaves the stored value untouched when
/// merging; `friends` is always union-appended when merging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(skip)]
    pub friends: BTreeSet<String>,
}

impl GuestFields {
    pub fn friend(friend_id: impl Into<String>) -> Self {
        Self {
            friends: BTreeSet::from([friend_id.into()]),
            ..Default::default()
        }
    }

    /// Apply `self` on top of `existing`, field by field.
    pub fn merge_into(self, existing: &mut GuestFields) {
        if self.name.is_some() {
            existing.name = self.name;
        }
        if self.email.is_some() {
            existing.email = self.email;
        }
        if self.phone.is_some() {
            existing.phone = self.phone;
        }
        existing.friends.extend(self.friends);
    }
}

/// Derive the guest id from a contact email.
///
/// Lowercases the address and replaces every character outside `[a-z0-9]`
/// with `_`. Returns `None` for input that is not shaped like an email.
pub fn normalize_guest_id(email: &str) -> Option<String> {
    let email = email.trim();
    let (local, domain) = email.split_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }

    Some(
        email
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '_' })
            .collect(),
    )
}
