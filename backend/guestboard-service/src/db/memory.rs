/// In-process metadata store for local development and tests
use super::{MetadataStore, PostStream, StoreError};
use crate::models::{Guest, GuestFields, NewPost, Post};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct GuestRecord {
    fields: GuestFields,
    updated_at: i64,
}

impl GuestRecord {
    fn to_guest(&self, id: &str) -> Guest {
        Guest {
            id: id.to_string(),
            name: self.fields.name.clone(),
            email: self.fields.email.clone(),
            phone: self.fields.phone.clone(),
            friends: self.fields.friends.iter().cloned().collect(),
            updated_at: self.updated_at,
        }
    }
}

#[derive(Default)]
pub struct InMemoryMetadataStore {
    posts: DashMap<String, Post>,
    guests: DashMap<String, GuestRecord>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn contains_post(&self, id: &str) -> bool {
        self.posts.contains_key(id)
    }

    /// Store a post as-is, bypassing `create_post`.
    pub fn insert_raw(&self, post: Post) {
        self.posts.insert(post.id.clone(), post);
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn upsert_guest(
        &self,
        guest_id: &str,
        fields: GuestFields,
        merge: bool,
        updated_at: i64,
    ) -> Result<(), StoreError> {
        match self.guests.entry(guest_id.to_string()) {
            Entry::Occupied(mut entry) if merge => {
                let record = entry.get_mut();
                fields.merge_into(&mut record.fields);
                record.updated_at = updated_at;
            }
            Entry::Occupied(mut entry) => {
                entry.insert(GuestRecord { fields, updated_at });
            }
            Entry::Vacant(entry) => {
                entry.insert(GuestRecord { fields, updated_at });
            }
        }
        Ok(())
    }

    async fn get_guest(&self, guest_id: &str) -> Result<Option<Guest>, StoreError> {
        Ok(self.guests.get(guest_id).map(|r| r.to_guest(guest_id)))
    }

    async fn search_guests(&self, query: &str, limit: usize) -> Result<Vec<Guest>, StoreError> {
        let needle = query.to_lowercase();
        let contains = |value: &Option<String>| {
            value
                .as_deref()
                .map(|v| v.to_lowercase().contains(&needle))
                .unwrap_or(false)
        };

        let mut found: Vec<Guest> = self
            .guests
            .iter()
            .filter(|entry| contains(&entry.value().fields.name) || contains(&entry.value().fields.email))
            .map(|entry| entry.value().to_guest(entry.key()))
            .collect();
        found.sort_by(|a, b| a.id.cmp(&b.id));
        found.truncate(limit);
        Ok(found)
    }

    async fn create_post(&self, post: NewPost) -> Result<String, StoreError> {
        let id = post
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        match self.posts.entry(id.clone()) {
            Entry::Occupied(_) => Err(StoreError::Conflict(format!("post {} already exists", id))),
            Entry::Vacant(entry) => {
                entry.insert(post.into_post(id.clone()));
                Ok(id)
            }
        }
    }

    async fn get_post(&self, id: &str) -> Result<Option<Post>, StoreError> {
        Ok(self.posts.get(id).map(|p| p.value().clone()))
    }

    async fn list_recent_posts(&self, limit: usize, now: i64) -> Result<PostStream, StoreError> {
        let mut snapshot: Vec<Post> = self
            .posts
            .iter()
            .filter(|entry| !entry.value().is_expired_at(now))
            .map(|entry| entry.value().clone())
            .collect();
        snapshot.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        snapshot.truncate(limit);

        Ok(stream::iter(snapshot).boxed())
    }

    async fn find_expired(&self, now: i64) -> Result<Vec<Post>, StoreError> {
        Ok(self
            .posts
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn delete_post(&self, id: &str) -> Result<(), StoreError> {
        self.posts.remove(id);
        Ok(())
    }

    async fn referenced_blob_ids(&self) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .posts
            .iter()
            .filter_map(|entry| entry.value().blob_id().map(str::to_string))
            .collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
