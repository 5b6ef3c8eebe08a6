use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DUPLICATE_USER_NAME: &str = "DuplicateUserName";

/// One reason a store refused a write, reported back to the caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityError {
    pub code: String,
    pub description: String,
}

impl IdentityError {
    pub fn new(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            description: description.into(),
        }
    }

    pub fn duplicate_user_name(username: &str) -> Self {
        Self::new(
            DUPLICATE_USER_NAME,
            format!("Username '{}' is already taken.", username),
        )
    }
}

fn describe(errors: &[IdentityError]) -> String {
    errors
        .iter()
        .map(|e| e.description.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    UserNotFound,

    #[error("tweet {0} not found")]
    TweetNotFound(i64),

    #[error("rejected: {}", describe(.0))]
    Rejected(Vec<IdentityError>),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),
}

impl StoreError {
    pub fn rejected(code: &str, description: impl Into<String>) -> Self {
        StoreError::Rejected(vec![IdentityError::new(code, description)])
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("validation failed: {}", describe(.0))]
    ValidationFailed(Vec<IdentityError>),

    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Errors", skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<IdentityError>,
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) | ApiError::ValidationFailed(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ApiError::ValidationFailed(errors) => ErrorBody {
                message: "Validation failed.".to_string(),
                errors: errors.clone(),
            },
            // Internal details stay in the log.
            ApiError::Internal(_) => ErrorBody {
                message: "Internal server error.".to_string(),
                errors: Vec::new(),
            },
            other => ErrorBody {
                message: other.to_string(),
                errors: Vec::new(),
            },
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound => ApiError::NotFound("User not found.".to_string()),
            StoreError::TweetNotFound(_) => ApiError::NotFound("Tweet not found.".to_string()),
            StoreError::Rejected(errors) => {
                if errors.iter().any(|e| e.code == DUPLICATE_USER_NAME) {
                    ApiError::Conflict("Username is already taken.".to_string())
                } else {
                    ApiError::ValidationFailed(errors)
                }
            }
            StoreError::Hash(e) => {
                error!("Password hashing failed: {:?}", e);
                ApiError::Internal(e.to_string())
            }
        }
    }
}
