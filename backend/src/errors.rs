use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use friendship::{ErrorInfo, TransitionError, ValidationError};

use crate::config::ConfigError;
use crate::events::PublishError;
use crate::storage::StorageError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("unauthorized")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation",
            ServiceError::Transition(err) => err.code(),
            ServiceError::Unauthorized => "unauthorized",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Storage(_) | ServiceError::Internal(_) => "internal",
        }
    }

    pub fn info(&self) -> ErrorInfo {
        let message = match self {
            ServiceError::Storage(_) | ServiceError::Internal(_) => "internal server error".to_string(),
            err => err.to_string(),
        };
        ErrorInfo::new(message, Some(self.code()))
    }
}

impl ResponseError for ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Transition(err) if err.is_forbidden() => StatusCode::FORBIDDEN,
            ServiceError::Transition(_) | ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Storage(_) | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            log::error!("request failed: {}", self);
        } else {
            log::debug!("request rejected: {}", self);
        }
        HttpResponse::build(self.status_code()).json(self.info())
    }
}

/// Failures while wiring the service together at startup.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("unable to create postgres pool: {0}")]
    Postgres(#[from] deadpool_postgres::CreatePoolError),

    #[error("unable to create redis pool: {0}")]
    Redis(#[from] deadpool_redis::CreatePoolError),

    #[error("unable to migrate the database: {0}")]
    Migration(#[from] StorageError),

    #[error("unable to connect to the message broker: {0}")]
    Broker(#[from] PublishError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_map_to_forbidden_or_conflict() {
        let forbidden = ServiceError::from(TransitionError::NotRequestRecipient);
        assert_eq!(forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(forbidden.code(), "forbidden");

        let conflict = ServiceError::from(TransitionError::AlreadyFriends);
        assert_eq!(conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(conflict.info().message, "users are already friends");
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ServiceError::Internal("connection refused on 10.0.0.3".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.info(), ErrorInfo::new("internal server error", Some("internal")));
    }
}
