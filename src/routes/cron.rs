use crate::config::Config;
use crate::cron_tasks::create_current_periods_with;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::allowance_period::PeriodCreationSummary;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket::serde::json::Json;
use rocket::{State, post};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::openapi;
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use sqlx::PgPool;

pub const CRON_TOKEN_HEADER: &str = "x-cron-token";

pub(crate) struct CronAuth;

/// Compares every byte regardless of where the first mismatch is.
fn tokens_match(expected: &[u8], given: &[u8]) -> bool {
    if expected.len() != given.len() {
        return false;
    }
    expected.iter().zip(given).fold(0u8, |diff, (a, b)| diff | (a ^ b)) == 0
}

/// An empty configured token disables the endpoint, which then answers 404.
fn check_cron_token(configured: &str, incoming: Option<&str>) -> Result<(), AppError> {
    if configured.is_empty() {
        return Err(AppError::NotFound("Cron endpoint is disabled".to_string()));
    }
    match incoming {
        Some(token) if tokens_match(configured.as_bytes(), token.as_bytes()) => Ok(()),
        _ => Err(AppError::Forbidden),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CronAuth {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        let config = match req.rocket().state::<Config>() {
            Some(config) => config,
            None => return Outcome::Error((Status::InternalServerError, AppError::Unauthorized)),
        };

        match check_cron_token(&config.cron.auth_token, req.headers().get_one(CRON_TOKEN_HEADER)) {
            Ok(()) => Outcome::Success(CronAuth),
            Err(err) => Outcome::Error((Status::from(&err), err)),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for CronAuth {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let security_scheme = SecurityScheme {
            description: Some("Shared secret configured as cron.auth_token.".to_string()),
            data: SecuritySchemeData::ApiKey {
                name: CRON_TOKEN_HEADER.to_string(),
                location: "header".to_string(),
            },
            extensions: Object::default(),
        };

        let mut security_req = SecurityRequirement::new();
        security_req.insert("cronToken".to_string(), Vec::new());

        Ok(RequestHeaderInput::Security("cronToken".to_string(), security_scheme, security_req))
    }
}

/// Create the current allowance period for every user that lacks one
#[openapi(tag = "Cron")]
#[post("/create-periods")]
pub async fn create_periods(pool: &State<PgPool>, config: &State<Config>, _cron_auth: CronAuth) -> Result<Json<PeriodCreationSummary>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let summary = create_current_periods_with(&repo, config).await?;
    Ok(Json(summary))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![create_periods]
}
