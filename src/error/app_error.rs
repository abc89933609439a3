use chrono::NaiveDate;
use rocket::http::Status;
use rocket::response::Responder;
use rocket::{Request, Response};
use rocket_okapi::OpenApiError;
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::Responses;
use rocket_okapi::response::OpenApiResponderInner;
use std::io::Cursor;
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;
use validator::ValidationErrors;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error")]
    Db {
        message: String,
        #[source]
        source: sqlx::error::Error,
    },
    #[error("User not found")]
    UserNotFound,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Forbidden")]
    Forbidden,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Internal server error")]
    PasswordHash { message: String },
    #[error("User {0} already exists")]
    UserAlreadyExists(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal server error")]
    UuidError {
        message: String,
        #[source]
        source: uuid::Error,
    },
    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationErrors),
    #[error("Internal server error")]
    ConfigurationError {
        message: String,
        #[source]
        source: figment::Error,
    },
    #[error("No active allowance period")]
    NoActivePeriod,
    #[error("Amount {requested} exceeds the remaining balance of {remaining}")]
    InsufficientBalance { requested: i64, remaining: i64 },
    #[error("Amount {requested} exceeds the weekly limit of {limit} ({spent} already spent)")]
    WeeklyLimitExceeded { requested: i64, spent: i64, limit: i64 },
    #[error("Weekly period {start} to {end} overlaps existing period {existing_id}")]
    OverlappingPeriod { start: NaiveDate, end: NaiveDate, existing_id: Uuid },
    #[error("Allowance period was modified concurrently, please retry")]
    ConcurrentModification,
}

impl AppError {
    pub fn db(message: impl Into<String>, source: sqlx::error::Error) -> Self {
        Self::Db {
            message: message.into(),
            source,
        }
    }

    pub fn uuid(message: impl Into<String>, source: uuid::Error) -> Self {
        Self::UuidError {
            message: message.into(),
            source,
        }
    }

    pub fn password_hash(message: impl Into<String>, source: password_hash::Error) -> Self {
        Self::PasswordHash {
            message: format!("{}: {}", message.into(), source),
        }
    }

    /// Rejections produced by the budget rules rather than by a failure.
    pub fn is_budget_rejection(&self) -> bool {
        matches!(
            self,
            AppError::NoActivePeriod | AppError::InsufficientBalance { .. } | AppError::WeeklyLimitExceeded { .. } | AppError::OverlappingPeriod { .. }
        )
    }
}

impl From<password_hash::Error> for AppError {
    fn from(e: password_hash::Error) -> Self {
        AppError::password_hash("Password hashing failed", e)
    }
}

impl From<uuid::Error> for AppError {
    fn from(e: uuid::Error) -> Self {
        AppError::uuid("Invalid UUID", e)
    }
}

impl From<&AppError> for Status {
    fn from(e: &AppError) -> Self {
        match e {
            AppError::UserNotFound => Status::NotFound,
            AppError::InvalidCredentials => Status::Unauthorized,
            AppError::PasswordHash { .. } => Status::InternalServerError,
            AppError::Db { .. } => Status::InternalServerError,
            AppError::Unauthorized => Status::Unauthorized,
            AppError::Forbidden => Status::Forbidden,
            AppError::UserAlreadyExists(_) => Status::Conflict,
            AppError::BadRequest(_) => Status::BadRequest,
            AppError::NotFound(_) => Status::NotFound,
            AppError::UuidError { .. } => Status::BadRequest,
            AppError::ValidationError(_) => Status::BadRequest,
            AppError::ConfigurationError { .. } => Status::InternalServerError,
            AppError::NoActivePeriod => Status::Conflict,
            AppError::InsufficientBalance { .. } => Status::UnprocessableEntity,
            AppError::WeeklyLimitExceeded { .. } => Status::UnprocessableEntity,
            AppError::OverlappingPeriod { .. } => Status::Conflict,
            AppError::ConcurrentModification => Status::Conflict,
        }
    }
}

impl<'r> Responder<'r, 'static> for AppError {
    fn respond_to(self, req: &Request<'_>) -> rocket::response::Result<'static> {
        let method = req.method();
        let uri = req.uri();

        let request_id = req
            .local_cache(|| None::<crate::middleware::RequestId>)
            .as_ref()
            .map(|r| r.0.as_str())
            .unwrap_or("unknown");

        let user_id = crate::auth::authenticated_user_id(req)
            .map(|id| id.to_string())
            .unwrap_or_else(|| "anonymous".to_string());

        // Budget rejections are expected outcomes; keep them out of the error log.
        if self.is_budget_rejection() {
            warn!(
                error = %self,
                request_id = %request_id,
                user_id = %user_id,
                method = %method,
                uri = %uri,
                "request rejected by budget rules"
            );
        } else {
            error!(
                error = ?self,
                request_id = %request_id,
                user_id = %user_id,
                method = %method,
                uri = %uri,
                "request failed"
            );
        }

        let status = Status::from(&self);
        let body = self.to_string();

        Response::build().status(status).sized_body(body.len(), Cursor::new(body)).ok()
    }
}

impl OpenApiResponderInner for AppError {
    fn responses(_gen: &mut OpenApiGenerator) -> Result<Responses, OpenApiError> {
        use rocket_okapi::okapi::openapi3::{RefOr, Response as OpenApiResponse};
        let mut responses = Responses::default();
        for (code, description) in [
            ("400", "Bad Request"),
            ("401", "Unauthorized"),
            ("404", "Not Found"),
            ("409", "Conflict - no active period, overlapping period or concurrent update"),
            ("422", "Unprocessable Entity - weekly limit or remaining balance exceeded"),
            ("500", "Internal Server Error"),
        ] {
            responses.responses.insert(
                code.to_string(),
                RefOr::Object(OpenApiResponse {
                    description: description.to_string(),
                    ..Default::default()
                }),
            );
        }
        Ok(responses)
    }
}

impl From<figment::Error> for AppError {
    fn from(e: figment::Error) -> Self {
        AppError::ConfigurationError {
            message: "Failed to read configuration".to_string(),
            source: e,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => AppError::NotFound("Resource not found".to_string()),
            _ => AppError::db("Database error", e),
        }
    }
}
