//! Result-kind to HTTP response mapping. Every handler funnels its outcome
//! through [`respond`], so status codes and literal sentinels live here only.

use std::str::FromStr;

use actix_web::http::{header::ContentType, StatusCode};
use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, ApiErrorBody, ValidationErrorBody};

/// How outcomes map onto HTTP status codes. `Compat` answers 200 for every
/// outcome and distinguishes failures by body only, which existing clients
/// of this API rely on. `Strict` uses conventional codes with the same bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusMode {
    #[default]
    Compat,
    Strict,
}

impl FromStr for StatusMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "compat" | "" => Ok(StatusMode::Compat),
            "strict" => Ok(StatusMode::Strict),
            other => Err(format!("unknown status mode '{other}' (expected compat or strict)")),
        }
    }
}

/// Plain-text success bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    Success,
    Reported,
}

impl Sentinel {
    pub const fn as_str(self) -> &'static str {
        match self {
            Sentinel::Success => "success",
            Sentinel::Reported => "reported",
        }
    }
}

/// Successful handler outcome.
#[derive(Debug)]
pub enum Answer {
    Created(Value),
    Json(Value),
    Text(Sentinel),
}

impl Answer {
    pub fn created<T: Serialize>(body: &T) -> Result<Self, ApiError> {
        Ok(Answer::Created(to_value(body)?))
    }

    pub fn json<T: Serialize>(body: &T) -> Result<Self, ApiError> {
        Ok(Answer::Json(to_value(body)?))
    }
}

fn to_value<T: Serialize>(body: &T) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Storage(format!("failed to encode response: {e}")))
}

fn status(mode: StatusMode, strict: StatusCode) -> StatusCode {
    match mode {
        StatusMode::Compat => StatusCode::OK,
        StatusMode::Strict => strict,
    }
}

fn text(code: StatusCode, body: &'static str) -> HttpResponse {
    HttpResponse::build(code).content_type(ContentType::plaintext()).body(body)
}

pub fn respond(mode: StatusMode, result: Result<Answer, ApiError>) -> HttpResponse {
    match result {
        Ok(Answer::Created(v)) => HttpResponse::build(status(mode, StatusCode::CREATED)).json(v),
        Ok(Answer::Json(v)) => HttpResponse::Ok().json(v),
        Ok(Answer::Text(s)) => text(StatusCode::OK, s.as_str()),
        Err(ApiError::Validation(errors)) => {
            HttpResponse::build(status(mode, StatusCode::BAD_REQUEST)).json(ValidationErrorBody { errors })
        }
        Err(ApiError::Unauthorized) => text(status(mode, StatusCode::FORBIDDEN), "incorrect password"),
        Err(e @ ApiError::NotFound(_)) => {
            HttpResponse::build(status(mode, StatusCode::NOT_FOUND)).json(ApiErrorBody { error: e.to_string() })
        }
        Err(e @ ApiError::Storage(_)) => {
            tracing::error!(error = %e, "storage failure");
            HttpResponse::build(status(mode, StatusCode::INTERNAL_SERVER_ERROR)).json(ApiErrorBody { error: e.to_string() })
        }
    }
}
