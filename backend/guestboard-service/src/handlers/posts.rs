/// Post handlers
///
/// - POST /api/v1/posts: publish (multipart: guestId, title, text, file)
/// - GET /api/v1/posts: most recent live posts
/// - GET /api/v1/posts/{post_id}: a single live post
use actix_multipart::{Field, Multipart};
use actix_web::http::header::{self, ContentDisposition};
use actix_web::{web, HttpResponse};
use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AttachmentError, Result, ServiceError};
use crate::metrics::lifecycle as metrics;
use crate::models::{AttachmentUpload, Post, PublishRequest};
use crate::services::PostLifecycleManager;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub posts: Vec<Post>,
    pub count: usize,
}

/// Publish a post
/// POST /api/v1/posts
pub async fn publish_post(
    manager: web::Data<PostLifecycleManager>,
    mut payload: Multipart,
) -> Result<HttpResponse> {
    let max_bytes = manager.config().max_attachment_bytes;
    let mut request = PublishRequest::default();

    while let Some(field) = payload.next().await {
        let mut field =
            field.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;
        let cd = disposition(&field);
        let name = cd
            .as_ref()
            .and_then(|cd| cd.get_name())
            .unwrap_or_default()
            .to_string();

        match name.as_str() {
            "guestId" => request.guest_id = read_text(&mut field).await?,
            "title" => request.title = read_text(&mut field).await?,
            "text" => request.text = Some(read_text(&mut field).await?),
            "file" => {
                let file_name = cd
                    .as_ref()
                    .and_then(|cd| cd.get_filename())
                    .unwrap_or_default()
                    .to_string();
                let mime_type = field
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = read_limited(&mut field, max_bytes).await?;
                // Browsers send an unnamed empty part for a file input left blank.
                if file_name.is_empty() && bytes.is_empty() {
                    continue;
                }
                request.attachment = Some(AttachmentUpload {
                    name: file_name,
                    mime_type,
                    bytes,
                });
            }
            _ => drain(&mut field).await?,
        }
    }

    let published = manager.publish(request).await?;
    Ok(HttpResponse::Created().json(published))
}

/// List recent posts
/// GET /api/v1/posts?limit=N
pub async fn list_posts(
    manager: web::Data<PostLifecycleManager>,
    query: web::Query<ListQuery>,
) -> Result<HttpResponse> {
    let posts: Vec<Post> = manager.list_recent(query.limit).await.collect().await;
    Ok(HttpResponse::Ok().json(PostListResponse {
        count: posts.len(),
        posts,
    }))
}

/// GET /api/v1/posts/{post_id}
pub async fn get_post(
    manager: web::Data<PostLifecycleManager>,
    post_id: web::Path<String>,
) -> Result<HttpResponse> {
    let post_id = post_id.into_inner();
    let post = manager
        .get_post(&post_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("post {}", post_id)))?;
    Ok(HttpResponse::Ok().json(post))
}

fn disposition(field: &Field) -> Option<ContentDisposition> {
    field
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|value| ContentDisposition::from_raw(value).ok())
}

async fn read_text(field: &mut Field) -> Result<String> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| AppError::BadRequest(format!("Field read error: {}", e)))?;
        buf.extend_from_slice(&data);
    }
    String::from_utf8(buf.to_vec())
        .map_err(|_| AppError::BadRequest("form field is not valid UTF-8".into()))
}

/// Read the file part, buffering at most `max_bytes`. The rest of an oversized
/// part is consumed but discarded so the reported size is the real one.
async fn read_limited(field: &mut Field, max_bytes: usize) -> Result<Bytes> {
    let mut buf = BytesMut::new();
    let mut size = 0usize;
    while let Some(chunk) = field.next().await {
        let data = chunk.map_err(|e| AppError::BadRequest(format!("File read error: {}", e)))?;
        size += data.len();
        if size <= max_bytes {
            buf.extend_from_slice(&data);
        }
    }

    if size > max_bytes {
        metrics::record_publish("attachment_error");
        return Err(ServiceError::from(AttachmentError::TooLarge {
            size,
            max: max_bytes,
        })
        .into());
    }
    Ok(buf.freeze())
}

async fn drain(field: &mut Field) -> Result<()> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| AppError::BadRequest(format!("Multipart error: {}", e)))?;
    }
    Ok(())
}
