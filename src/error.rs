use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

use crate::repo::RepoError;

/// Failures of the comment lifecycle engine and the report ledger.
#[derive(thiserror::Error, Debug)]
pub enum CommentError {
    #[error("not found")] NotFound,
    #[error("comment target not found")] TargetNotFound,
    #[error("not authorized")] NotAuthorized,
    #[error("operation not allowed in the current state")] InvalidState,
    #[error("you cannot report your own comment")] SelfReport,
    #[error("comment already reported")] AlreadyReported,
    #[error("no report by this user")] NotReporter,
    /// A target id resolved to something that cannot carry comments.
    #[error("invalid comment target")] InvalidTargetKind,
    /// Stale read detected at commit; the caller may reload and retry.
    #[error("concurrent modification, retry")] Conflict,
    #[error("{0}")] Invalid(String),
    #[error("internal error: {0}")] Internal(String),
}

impl CommentError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommentError::Conflict)
    }
}

impl From<RepoError> for CommentError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => CommentError::NotFound,
            RepoError::Conflict => CommentError::Conflict,
            RepoError::Internal(msg) => CommentError::Internal(msg),
        }
    }
}

pub type CommentResult<T> = Result<T, CommentError>;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("authorization required")] Unauthorized,
    #[error("{0}")] Forbidden(String),
    #[error("{0}")] NotFound(String),
    #[error("{0}")] Conflict(String),
    #[error("{0}")] Unprocessable(String),
    #[error("too many requests")] TooManyRequests,
    #[error("internal error")] Internal,
}

impl From<CommentError> for ApiError {
    fn from(e: CommentError) -> Self {
        match e {
            CommentError::NotAuthorized => ApiError::Forbidden(e.to_string()),
            CommentError::NotFound | CommentError::TargetNotFound => ApiError::NotFound(e.to_string()),
            CommentError::AlreadyReported
            | CommentError::SelfReport
            | CommentError::InvalidState
            | CommentError::NotReporter => ApiError::Unprocessable(e.to_string()),
            CommentError::Conflict => ApiError::Conflict(e.to_string()),
            CommentError::Invalid(msg) => ApiError::BadRequest(msg),
            CommentError::InvalidTargetKind => {
                tracing::error!("data integrity: comment target resolved to an unsupported kind");
                ApiError::Internal
            }
            CommentError::Internal(msg) => {
                tracing::error!("internal error: {msg}");
                ApiError::Internal
            }
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        CommentError::from(e).into()
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.to_string() })
    }
}
