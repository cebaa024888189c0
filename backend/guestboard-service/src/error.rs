/// Error types for Guestboard Service
///
/// `ServiceError` is what the lifecycle manager and guest registry return;
/// `AppError` is its HTTP projection. Store-level errors live next to their
/// clients (`blob::BlobError`, `db::StoreError`).
use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::fmt;

/// Result type for HTTP handlers
pub type Result<T> = std::result::Result<T, AppError>;

/// Bad or missing input. Raised before any store is touched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("guestId is required")]
    MissingGuestId,
    #[error("title is required")]
    MissingTitle,
    #[error("text has {words} words, limit is {max}")]
    TextTooLong { words: usize, max: usize },
    #[error("attachment file name is required")]
    MissingFileName,
    #[error("a valid email is required")]
    InvalidGuestEmail,
    #[error("friend id is required")]
    MissingFriendId,
}

impl ValidationError {
    /// Machine-readable reason code
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::MissingGuestId => "missing_guest_id",
            ValidationError::MissingTitle => "missing_title",
            ValidationError::TextTooLong { .. } => "text_too_long",
            ValidationError::MissingFileName => "missing_file_name",
            ValidationError::InvalidGuestEmail => "invalid_guest_email",
            ValidationError::MissingFriendId => "missing_friend_id",
        }
    }
}

/// Attachment rejected or not stored. No post record exists afterwards.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttachmentError {
    #[error("attachment is {size} bytes, limit is {max}")]
    TooLarge { size: usize, max: usize },
    #[error("attachment is empty")]
    Empty,
    #[error("unsupported attachment type '{0}'")]
    InvalidMimeType(String),
    #[error("attachment upload failed: {0}")]
    Upload(String),
}

impl AttachmentError {
    pub fn reason(&self) -> &'static str {
        match self {
            AttachmentError::TooLarge { .. } => "too_large",
            AttachmentError::Empty => "empty_attachment",
            AttachmentError::InvalidMimeType(_) => "invalid_mime_type",
            AttachmentError::Upload(_) => "upload_failed",
        }
    }
}

/// Errors surfaced by the core services.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
    #[error("attachment error: {0}")]
    Attachment(#[from] AttachmentError),
    #[error("store error: {0}")]
    Store(String),
}

impl ServiceError {
    /// Machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::Attachment(_) => "attachment_error",
            ServiceError::Store(_) => "store_error",
        }
    }

    pub fn reason(&self) -> Option<&'static str> {
        match self {
            ServiceError::Validation(e) => Some(e.reason()),
            ServiceError::Attachment(e) => Some(e.reason()),
            ServiceError::Store(_) => None,
        }
    }
}

/// Application error types
#[derive(Debug)]
pub enum AppError {
    /// Error raised by the lifecycle manager or guest registry
    Service(ServiceError),

    /// Resource not found
    NotFound(String),

    /// Malformed request (multipart, query string, ...)
    BadRequest(String),

    /// Internal server error
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Service(err) => write!(f, "{}", err),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Service(err) => err.kind(),
            AppError::NotFound(_) => "not_found",
            AppError::BadRequest(_) => "bad_request",
            AppError::Internal(_) => "internal_error",
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Service(ServiceError::Validation(_)) => StatusCode::BAD_REQUEST,
            AppError::Service(ServiceError::Attachment(err)) => match err {
                AttachmentError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                AttachmentError::InvalidMimeType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                AttachmentError::Empty => StatusCode::BAD_REQUEST,
                AttachmentError::Upload(_) => StatusCode::BAD_GATEWAY,
            },
            AppError::Service(ServiceError::Store(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut body = serde_json::json!({
            "error": self.to_string(),
            "kind": self.kind(),
            "status": status.as_u16(),
        });
        if let AppError::Service(err) = self {
            if let Some(reason) = err.reason() {
                body["reason"] = serde_json::Value::from(reason);
            }
        }

        HttpResponse::build(status).json(body)
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        AppError::Service(err)
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Service(ServiceError::Validation(err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
