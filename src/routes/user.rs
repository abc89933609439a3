use crate::auth::{CurrentUser, SESSION_COOKIE, session_cookie_value};
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::user::{LoginRequest, UserRequest, UserResponse};
use chrono::{Duration, Utc};
use rocket::http::{Cookie, CookieJar, SameSite, Status};
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use tracing::info;
use validator::Validate;

pub(crate) fn build_auth_cookie(value: &str) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Register a new user
#[openapi(tag = "Users")]
#[post("/", data = "<payload>")]
pub async fn post_user(pool: &State<PgPool>, payload: Json<UserRequest>) -> Result<Created<Json<UserResponse>>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let email = payload.email.trim().to_lowercase();
    let user = repo.create_user(payload.name.trim(), &email, &payload.password).await?;
    info!(user_id = %user.id, "user registered");

    Ok(Created::new(format!("/users/{}", user.id)).body(Json(UserResponse::from(&user))))
}

/// Log in and receive the session cookie
#[openapi(skip)]
#[post("/login", data = "<payload>")]
pub async fn post_user_login(pool: &State<PgPool>, config: &State<Config>, cookies: &CookieJar<'_>, payload: Json<LoginRequest>) -> Result<Status, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let email = payload.email.trim().to_lowercase();
    let user = match repo.get_user_by_email(&email).await? {
        Some(user) => user,
        None => {
            PostgresRepository::dummy_verify(&payload.password);
            return Err(AppError::InvalidCredentials);
        }
    };
    repo.verify_password(&user, &payload.password)?;

    let expires_at = Utc::now() + Duration::hours(config.session.ttl_hours);
    let session = repo.create_session(&user.id, expires_at).await?;
    cookies.add_private(build_auth_cookie(&session_cookie_value(&session.id, &user.id)));
    info!(user_id = %user.id, "user logged in");

    Ok(Status::Ok)
}

/// End the current session
#[openapi(skip)]
#[post("/logout")]
pub async fn post_user_logout(pool: &State<PgPool>, current_user: CurrentUser, cookies: &CookieJar<'_>) -> Result<Status, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    repo.delete_session(&current_user.session_id, &current_user.id).await?;
    cookies.remove_private(Cookie::build(SESSION_COOKIE).path("/").build());

    Ok(Status::Ok)
}

/// Get the logged-in user
#[openapi(tag = "Users")]
#[get("/me")]
pub async fn get_me(pool: &State<PgPool>, current_user: CurrentUser) -> Result<Json<UserResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let user = repo.get_user_by_id(&current_user.id).await?.ok_or(AppError::UserNotFound)?;
    Ok(Json(UserResponse::from(&user)))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![post_user, post_user_login, post_user_logout, get_me]
}
