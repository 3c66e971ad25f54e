use std::fmt;

use serde::Serialize;
use utoipa::ToSchema;

use crate::password::PasswordError;
use crate::repo::RepoError;
use crate::validate::FieldErrors;

/// Record kinds named in not-found errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Board,
    Thread,
    Reply,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Board => "Board",
            Entity::Thread => "Thread",
            Entity::Reply => "Reply",
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ValidationErrorBody {
    #[schema(value_type = Object)]
    pub errors: FieldErrors,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("invalid request fields")] Validation(FieldErrors),
    #[error("{0} is not found.")] NotFound(Entity),
    #[error("incorrect password")] Unauthorized,
    #[error("{0}")] Storage(String),
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound(entity) => ApiError::NotFound(entity),
            RepoError::Conflict => ApiError::Storage("conflicting write".into()),
            RepoError::Storage(msg) => ApiError::Storage(msg),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(e: PasswordError) -> Self {
        ApiError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_message_names_the_entity() {
        assert_eq!(ApiError::NotFound(Entity::Thread).to_string(), "Thread is not found.");
        assert_eq!(ApiError::NotFound(Entity::Reply).to_string(), "Reply is not found.");
    }

    #[test]
    fn repo_errors_convert() {
        let e: ApiError = RepoError::NotFound(Entity::Reply).into();
        assert!(matches!(e, ApiError::NotFound(Entity::Reply)));
        let e: ApiError = RepoError::Storage("pool closed".into()).into();
        assert_eq!(e.to_string(), "pool closed");
    }
}
