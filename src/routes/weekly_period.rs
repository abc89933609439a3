use crate::auth::CurrentUser;
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::weekly_period::{
    DeleteWeeklyPeriodResponse, WeeklyPeriodDetail, WeeklyPeriodPatch, WeeklyPeriodRequest, WeeklyPeriodResponse, WeeklyPeriodSummary, WeeklyPeriodUpdateRequest,
};
use crate::service::budget::BudgetService;
use crate::service::history::{self, HistoryService};
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{State, delete, get, post, put};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

#[allow(clippy::result_large_err)]
fn parse_weekly_period_id(id: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(id).map_err(|e| AppError::uuid("Invalid weekly period id", e))
}

/// Weekly periods with spent and remaining amounts, newest first.
/// Pass `allowance_period_id` to restrict to one allowance period.
#[openapi(tag = "Weekly Periods")]
#[get("/?<allowance_period_id>")]
pub async fn list_weekly_periods(
    pool: &State<PgPool>,
    config: &State<Config>,
    current_user: CurrentUser,
    allowance_period_id: Option<String>,
) -> Result<Json<Vec<WeeklyPeriodSummary>>, AppError> {
    let allowance_period_id = allowance_period_id
        .map(|id| Uuid::parse_str(&id).map_err(|e| AppError::uuid("Invalid allowance period id", e)))
        .transpose()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = HistoryService::new(&repo, config.budget.weekly_spend_mode);
    let history = service
        .weekly_history(allowance_period_id.as_ref(), config.budget.today(), &current_user.id)
        .await?;
    Ok(Json(history))
}

/// The weekly period covering today, with its usage
#[openapi(tag = "Weekly Periods")]
#[get("/active")]
pub async fn get_active_weekly_period(pool: &State<PgPool>, config: &State<Config>, current_user: CurrentUser) -> Result<Json<WeeklyPeriodSummary>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let today = config.budget.today();

    let period = service
        .active_weekly_period(today, &current_user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("No weekly period covers today".to_string()))?;
    let usage = service.weekly_usage(&period, &current_user.id).await?;
    Ok(Json(history::summary(&period, &usage, today)))
}

/// One weekly period with its expenses grouped per day
#[openapi(tag = "Weekly Periods")]
#[get("/<id>")]
pub async fn get_weekly_period(pool: &State<PgPool>, config: &State<Config>, current_user: CurrentUser, id: &str) -> Result<Json<WeeklyPeriodDetail>, AppError> {
    let weekly_period_id = parse_weekly_period_id(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = HistoryService::new(&repo, config.budget.weekly_spend_mode);
    let detail = service.weekly_period_detail(&weekly_period_id, config.budget.today(), &current_user.id).await?;
    Ok(Json(detail))
}

/// Create a weekly period.
/// Omitting both dates uses the current Monday-to-Sunday week; omitting `allowance_period_id` uses the current allowance period.
/// Returns 409 if the dates overlap another weekly period of the same allowance period.
#[openapi(tag = "Weekly Periods")]
#[post("/", data = "<payload>")]
pub async fn create_weekly_period(
    pool: &State<PgPool>,
    config: &State<Config>,
    current_user: CurrentUser,
    payload: Json<WeeklyPeriodRequest>,
) -> Result<Created<Json<WeeklyPeriodResponse>>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let period = service.create_weekly_period(&payload, config.budget.today(), &current_user.id).await?;
    Ok(Created::new(format!("/weekly-periods/{}", period.id)).body(Json(WeeklyPeriodResponse::from(&period))))
}

/// Rename a weekly period or change its limit. Dates cannot be changed.
#[openapi(tag = "Weekly Periods")]
#[put("/<id>", data = "<payload>")]
pub async fn put_weekly_period(
    pool: &State<PgPool>,
    config: &State<Config>,
    current_user: CurrentUser,
    id: &str,
    payload: Json<WeeklyPeriodUpdateRequest>,
) -> Result<Json<WeeklyPeriodResponse>, AppError> {
    payload.validate()?;
    let weekly_period_id = parse_weekly_period_id(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let period = service
        .update_weekly_period(&weekly_period_id, &WeeklyPeriodPatch::from(&*payload), &current_user.id)
        .await?;
    Ok(Json(WeeklyPeriodResponse::from(&period)))
}

/// Delete a weekly period and every expense recorded against it. Balances are not refunded.
#[openapi(tag = "Weekly Periods")]
#[delete("/<id>")]
pub async fn delete_weekly_period(
    pool: &State<PgPool>,
    config: &State<Config>,
    current_user: CurrentUser,
    id: &str,
) -> Result<Json<DeleteWeeklyPeriodResponse>, AppError> {
    let weekly_period_id = parse_weekly_period_id(id)?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let deleted_expenses = service.delete_weekly_period(&weekly_period_id, &current_user.id).await?;
    Ok(Json(DeleteWeeklyPeriodResponse {
        id: weekly_period_id,
        deleted_expenses,
    }))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![
        list_weekly_periods,
        get_active_weekly_period,
        get_weekly_period,
        create_weekly_period,
        put_weekly_period,
        delete_weekly_period,
    ]
}

#[cfg(test)]
mod tests {
    use super::parse_weekly_period_id;
    use crate::error::app_error::AppError;
    use crate::routes::user::tests::{register_and_login, test_client};
    use rocket::http::{ContentType, Status};
    use rocket::local::asynchronous::Client;
    use serde_json::Value;

    #[test]
    fn invalid_id_is_bad_request() {
        assert!(matches!(parse_weekly_period_id("nope"), Err(AppError::UuidError { .. })));
    }

    async fn create_week(client: &Client, start: &str, end: &str) -> rocket::http::Status {
        let payload = serde_json::json!({
            "period_name": "Minggu",
            "start_date": start,
            "end_date": end,
            "weekly_limit": 200000
        });
        client
            .post("/api/weekly-periods/")
            .header(ContentType::JSON)
            .body(payload.to_string())
            .dispatch()
            .await
            .status()
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn overlapping_week_is_a_conflict() {
        let client = test_client().await;
        register_and_login(&client).await;
        client.post("/api/allowance/current").dispatch().await;

        assert_eq!(create_week(&client, "2026-03-10", "2026-03-16").await, Status::Created);
        assert_eq!(create_week(&client, "2026-03-14", "2026-03-20").await, Status::Conflict);
        assert_eq!(create_week(&client, "2026-03-17", "2026-03-23").await, Status::Created);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn reversed_dates_are_rejected() {
        let client = test_client().await;
        register_and_login(&client).await;

        assert_eq!(create_week(&client, "2026-03-16", "2026-03-10").await, Status::BadRequest);
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn deleted_week_disappears_from_history() {
        let client = test_client().await;
        register_and_login(&client).await;
        client.post("/api/allowance/current").dispatch().await;

        let payload = serde_json::json!({ "weekly_limit": 200000 });
        let response = client
            .post("/api/weekly-periods/")
            .header(ContentType::JSON)
            .body(payload.to_string())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        let created: Value = serde_json::from_str(&response.into_string().await.expect("body")).expect("json");
        let id = created["id"].as_str().expect("id").to_string();

        for amount in [10000, 20000, 30000] {
            let expense = serde_json::json!({ "amount": amount });
            let response = client.post("/api/expenses/").header(ContentType::JSON).body(expense.to_string()).dispatch().await;
            assert_eq!(response.status(), Status::Created);
        }

        let response = client.delete(format!("/api/weekly-periods/{}", id)).dispatch().await;
        assert_eq!(response.status(), Status::Ok);
        let deleted: Value = serde_json::from_str(&response.into_string().await.expect("body")).expect("json");
        assert_eq!(deleted["deleted_expenses"].as_u64(), Some(3));

        let response = client.get("/api/weekly-periods/").dispatch().await;
        let history: Value = serde_json::from_str(&response.into_string().await.expect("body")).expect("json");
        assert!(history.as_array().is_some_and(|weeks| weeks.iter().all(|w| w["id"].as_str() != Some(id.as_str()))));
    }
}
