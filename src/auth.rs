use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use rocket::http::Status;
use rocket::outcome::Outcome;
use rocket::request::{FromRequest, Outcome as RequestOutcome, Request};
use rocket_okapi::r#gen::OpenApiGenerator;
use rocket_okapi::okapi::openapi3::{Object, RefOr, Response, Responses, SecurityRequirement, SecurityScheme, SecuritySchemeData};
use rocket_okapi::request::{OpenApiFromRequest, RequestHeaderInput};
use serde::Serialize;
use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

/// Private cookie holding `<session id>:<user id>`.
pub const SESSION_COOKIE: &str = "saldo_session";

const SECURITY_SCHEME: &str = "sessionCookie";

/// The owner of the request. Every ledger query is scoped to `id`.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub session_id: Uuid,
}

pub(crate) fn session_cookie_value(session_id: &Uuid, user_id: &Uuid) -> String {
    format!("{}:{}", session_id, user_id)
}

pub(crate) fn parse_session_cookie_value(value: &str) -> Option<(Uuid, Uuid)> {
    let (session_part, user_part) = value.split_once(':')?;
    Some((Uuid::parse_str(session_part).ok()?, Uuid::parse_str(user_part).ok()?))
}

type CachedSession = Result<CurrentUser, Status>;

/// Id of the user this request was authenticated as, if the session guard has run.
pub(crate) fn authenticated_user_id(req: &Request<'_>) -> Option<Uuid> {
    req.local_cache(|| CachedSession::Err(Status::Unauthorized)).as_ref().ok().map(|user| user.id)
}

async fn resolve_session(req: &Request<'_>) -> Result<CurrentUser, (Status, AppError)> {
    let (session_id, user_id) = req
        .cookies()
        .get_private(SESSION_COOKIE)
        .and_then(|cookie| parse_session_cookie_value(cookie.value()))
        .ok_or((Status::Unauthorized, AppError::Unauthorized))?;

    let Some(pool) = req.rocket().state::<PgPool>() else {
        error!("database pool is not managed; cannot check sessions");
        return Err((Status::InternalServerError, AppError::Unauthorized));
    };
    let repo = PostgresRepository { pool: pool.clone() };

    match repo.get_active_session_user(&session_id, &user_id).await {
        Ok(Some(user)) => Ok(CurrentUser {
            id: user.id,
            name: user.name,
            email: user.email,
            session_id,
        }),
        Ok(None) => Err((Status::Unauthorized, AppError::Unauthorized)),
        Err(err) => Err((Status::InternalServerError, err)),
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for CurrentUser {
    type Error = AppError;

    async fn from_request(req: &'r Request<'_>) -> RequestOutcome<Self, Self::Error> {
        // A route may take the guard more than once; hit the session table only the first time.
        let resolved: &CachedSession = req
            .local_cache_async(async {
                resolve_session(req).await.map_err(|(status, err)| {
                    if let AppError::Db { .. } = err {
                        error!(error = ?err, "session lookup failed");
                    }
                    status
                })
            })
            .await;

        match resolved {
            Ok(user) => Outcome::Success(user.clone()),
            Err(status) => Outcome::Error((*status, AppError::Unauthorized)),
        }
    }
}

impl<'a> OpenApiFromRequest<'a> for CurrentUser {
    fn from_request_input(_gen: &mut OpenApiGenerator, _name: String, _required: bool) -> rocket_okapi::Result<RequestHeaderInput> {
        let scheme = SecurityScheme {
            description: Some("Session cookie issued by POST /api/users/login.".to_string()),
            data: SecuritySchemeData::ApiKey {
                name: SESSION_COOKIE.to_string(),
                location: "cookie".to_string(),
            },
            extensions: Object::default(),
        };

        let mut requirement = SecurityRequirement::new();
        requirement.insert(SECURITY_SCHEME.to_string(), Vec::new());

        Ok(RequestHeaderInput::Security(SECURITY_SCHEME.to_string(), scheme, requirement))
    }

    fn get_responses(_gen: &mut OpenApiGenerator) -> rocket_okapi::Result<Responses> {
        let mut responses = Responses::default();
        responses.responses.insert(
            "401".to_string(),
            RefOr::Object(Response {
                description: "No session cookie, or the session has expired".to_string(),
                ..Default::default()
            }),
        );
        Ok(responses)
    }
}
