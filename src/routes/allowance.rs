use crate::auth::CurrentUser;
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::allowance_period::{AllowancePeriodResponse, EditBalanceRequest, EnsurePeriodResponse, TopUpRequest};
use crate::service::budget::BudgetService;
use rocket::serde::json::Json;
use rocket::{State, get, post, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

/// Get the allowance period currently being spent from
#[openapi(tag = "Allowance")]
#[get("/current")]
pub async fn get_current(pool: &State<PgPool>, config: &State<Config>, current_user: CurrentUser) -> Result<Json<AllowancePeriodResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let period = service.current_allowance_period(&current_user.id).await?.ok_or(AppError::NoActivePeriod)?;
    Ok(Json(AllowancePeriodResponse::from(&period)))
}

/// List all allowance periods, newest first
#[openapi(tag = "Allowance")]
#[get("/")]
pub async fn list_periods(pool: &State<PgPool>, config: &State<Config>, current_user: CurrentUser) -> Result<Json<Vec<AllowancePeriodResponse>>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let periods = service.list_allowance_periods(&current_user.id).await?;
    Ok(Json(periods.iter().map(AllowancePeriodResponse::from).collect()))
}

/// Make sure the allowance period for today exists, creating it with the configured default total
#[openapi(tag = "Allowance")]
#[post("/current")]
pub async fn ensure_current(pool: &State<PgPool>, config: &State<Config>, current_user: CurrentUser) -> Result<Json<EnsurePeriodResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let (period, created) = service
        .ensure_allowance_period(config.budget.today(), config.budget.default_allowance_total, &current_user.id)
        .await?;
    Ok(Json(EnsurePeriodResponse {
        created,
        period: AllowancePeriodResponse::from(&period),
    }))
}

/// Add money to the current allowance period.
/// Creates the period for today with the top-up as its total when none exists.
#[openapi(tag = "Allowance")]
#[post("/top-up", data = "<payload>")]
pub async fn top_up(
    pool: &State<PgPool>,
    config: &State<Config>,
    current_user: CurrentUser,
    payload: Json<TopUpRequest>,
) -> Result<Json<AllowancePeriodResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let period = service.top_up(payload.amount, config.budget.today(), &current_user.id).await?;
    Ok(Json(AllowancePeriodResponse::from(&period)))
}

/// Overwrite the current period's balance.
/// `reset` sets total and remaining to the amount; `keep_spent` keeps what was already spent deducted.
#[openapi(tag = "Allowance")]
#[put("/balance", data = "<payload>")]
pub async fn edit_balance(
    pool: &State<PgPool>,
    config: &State<Config>,
    current_user: CurrentUser,
    payload: Json<EditBalanceRequest>,
) -> Result<Json<AllowancePeriodResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let period = service.edit_balance(payload.amount, payload.mode, &current_user.id).await?;
    Ok(Json(AllowancePeriodResponse::from(&period)))
}

/// Designate an allowance period as the current one
#[openapi(tag = "Allowance")]
#[put("/<id>/current")]
pub async fn select_current(pool: &State<PgPool>, config: &State<Config>, current_user: CurrentUser, id: &str) -> Result<Json<AllowancePeriodResponse>, AppError> {
    let period_id = Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid allowance period id", e))?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let period = service.select_allowance_period(&period_id, &current_user.id).await?;
    Ok(Json(AllowancePeriodResponse::from(&period)))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_current, list_periods, ensure_current, top_up, edit_balance, select_current]
}

#[cfg(test)]
mod tests {
    use crate::routes::user::tests::{register_and_login, test_client};
    use rocket::http::{ContentType, Status};
    use serde_json::Value;

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn top_up_without_period_creates_one() {
        let client = test_client().await;
        register_and_login(&client).await;

        let response = client.get("/api/allowance/current").dispatch().await;
        assert_eq!(response.status(), Status::Conflict);

        let payload = serde_json::json!({ "amount": 500000 });
        let response = client.post("/api/allowance/top-up").header(ContentType::JSON).body(payload.to_string()).dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let body = response.into_string().await.expect("top-up body");
        let json: Value = serde_json::from_str(&body).expect("valid json");
        assert_eq!(json["total_amount"].as_i64(), Some(500_000));
        assert_eq!(json["remaining_amount"].as_i64(), Some(500_000));
        assert!(json["period_start"].as_str().is_some_and(|d| d.ends_with("-25")));
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn edit_balance_without_period_conflicts() {
        let client = test_client().await;
        register_and_login(&client).await;

        let payload = serde_json::json!({ "amount": 1000, "mode": "keep_spent" });
        let response = client.put("/api/allowance/balance").header(ContentType::JSON).body(payload.to_string()).dispatch().await;
        assert_eq!(response.status(), Status::Conflict);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn ensure_current_is_idempotent() {
        let client = test_client().await;
        register_and_login(&client).await;

        let first = client.post("/api/allowance/current").dispatch().await;
        assert_eq!(first.status(), Status::Ok);
        let first: Value = serde_json::from_str(&first.into_string().await.expect("body")).expect("json");
        assert_eq!(first["created"].as_bool(), Some(true));

        let second = client.post("/api/allowance/current").dispatch().await;
        let second: Value = serde_json::from_str(&second.into_string().await.expect("body")).expect("json");
        assert_eq!(second["created"].as_bool(), Some(false));
        assert_eq!(first["period"]["id"], second["period"]["id"]);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn requests_without_session_are_unauthorized() {
        let client = test_client().await;
        let response = client.get("/api/allowance/current").dispatch().await;
        assert_eq!(response.status(), Status::Unauthorized);
    }
}
