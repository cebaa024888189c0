/// Guest handlers
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::models::GuestProfile;
use crate::services::GuestRegistry;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddFriendRequest {
    pub friend_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

/// Create or update a guest profile
/// PUT /api/v1/guests
pub async fn upsert_guest(
    registry: web::Data<GuestRegistry>,
    body: web::Json<GuestProfile>,
) -> Result<HttpResponse> {
    let guest = registry.upsert_profile(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(guest))
}

/// GET /api/v1/guests/{guest_id}
pub async fn get_guest(
    registry: web::Data<GuestRegistry>,
    guest_id: web::Path<String>,
) -> Result<HttpResponse> {
    let guest_id = guest_id.into_inner();
    let guest = registry
        .get_guest(&guest_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("guest {}", guest_id)))?;
    Ok(HttpResponse::Ok().json(guest))
}

/// POST /api/v1/guests/{guest_id}/friends
pub async fn add_friend(
    registry: web::Data<GuestRegistry>,
    guest_id: web::Path<String>,
    body: web::Json<AddFriendRequest>,
) -> Result<HttpResponse> {
    let guest = registry
        .add_friend(&guest_id.into_inner(), &body.friend_id)
        .await?;
    Ok(HttpResponse::Ok().json(guest))
}

/// GET /api/v1/guests/search?q=
pub async fn search_guests(
    registry: web::Data<GuestRegistry>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse> {
    let guests = registry.search(&query.q).await;
    Ok(HttpResponse::Ok().json(guests))
}
