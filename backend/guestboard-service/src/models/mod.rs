/// Data models for guestboard-service
///
/// Posts and guests are persisted as loosely-typed documents; the structs here
/// are the typed view the rest of the service works with.
pub mod guest;
pub mod post;

pub use guest::{normalize_guest_id, Guest, GuestFields, GuestProfile};
pub use post::{
    AttachmentUpload, BlobRef, NewPost, Post, PostState, PublishRequest, PublishedPost,
    MILLIS_PER_HOUR,
};
