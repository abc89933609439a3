use crate::auth::CurrentUser;
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::expense::{AdmissionResponse, ExpenseFilter, ExpenseRequest, ExpenseResponse};
use crate::service::budget::BudgetService;
use crate::service::history::HistoryService;
use chrono::NaiveDate;
use rocket::response::status::Created;
use rocket::serde::json::Json;
use rocket::{State, get, post};
use rocket_okapi::openapi;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

#[allow(clippy::result_large_err)]
fn parse_uuid(value: &str, what: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(value).map_err(|e| AppError::uuid(format!("Invalid {}", what), e))
}

#[allow(clippy::result_large_err)]
fn parse_date(value: &str, what: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| AppError::BadRequest(format!("Invalid {} date '{}', expected YYYY-MM-DD", what, value)))
}

/// Picks the listing filter from the query. A weekly period wins over an
/// allowance period, which wins over a date range. `None` means no filter was given.
#[allow(clippy::result_large_err)]
fn parse_filter(
    allowance_period_id: Option<&str>,
    weekly_period_id: Option<&str>,
    from: Option<&str>,
    to: Option<&str>,
) -> Result<Option<ExpenseFilter>, AppError> {
    if let Some(id) = weekly_period_id {
        return Ok(Some(ExpenseFilter::WeeklyPeriod(parse_uuid(id, "weekly period id")?)));
    }
    if let Some(id) = allowance_period_id {
        return Ok(Some(ExpenseFilter::AllowancePeriod(parse_uuid(id, "allowance period id")?)));
    }
    match (from, to) {
        (Some(from), Some(to)) => {
            let start = parse_date(from, "from")?;
            let end = parse_date(to, "to")?;
            if start > end {
                return Err(AppError::BadRequest("'from' must not be after 'to'".to_string()));
            }
            Ok(Some(ExpenseFilter::DateRange { start, end }))
        }
        (None, None) => Ok(None),
        _ => Err(AppError::BadRequest("'from' and 'to' must be given together".to_string())),
    }
}

/// List expenses, newest first.
/// Filter by `weekly_period_id`, `allowance_period_id`, or a `from`/`to` date range; defaults to the current allowance period.
#[openapi(tag = "Expenses")]
#[get("/?<allowance_period_id>&<weekly_period_id>&<from>&<to>")]
pub async fn list_expenses(
    pool: &State<PgPool>,
    config: &State<Config>,
    current_user: CurrentUser,
    allowance_period_id: Option<String>,
    weekly_period_id: Option<String>,
    from: Option<String>,
    to: Option<String>,
) -> Result<Json<Vec<ExpenseResponse>>, AppError> {
    let filter = parse_filter(allowance_period_id.as_deref(), weekly_period_id.as_deref(), from.as_deref(), to.as_deref())?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let filter = match filter {
        Some(filter) => filter,
        None => {
            let budget = BudgetService::new(&repo, config.budget.weekly_spend_mode);
            let period = budget.current_allowance_period(&current_user.id).await?.ok_or(AppError::NoActivePeriod)?;
            ExpenseFilter::AllowancePeriod(period.id)
        }
    };

    let service = HistoryService::new(&repo, config.budget.weekly_spend_mode);
    let expenses = service.list_expenses(&filter, &current_user.id).await?;
    Ok(Json(expenses.iter().map(ExpenseResponse::from).collect()))
}

/// Record an expense for today.
/// Returns 422 when it would exceed the active weekly limit or the remaining balance, and 409 when there is no allowance period.
#[openapi(tag = "Expenses")]
#[post("/", data = "<payload>")]
pub async fn create_expense(
    pool: &State<PgPool>,
    config: &State<Config>,
    current_user: CurrentUser,
    payload: Json<ExpenseRequest>,
) -> Result<Created<Json<ExpenseResponse>>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    let expense = service.add_expense(&payload, config.budget.today(), &current_user.id).await?;
    Ok(Created::new(format!("/expenses/{}", expense.id)).body(Json(ExpenseResponse::from(&expense))))
}

/// Check whether an expense would be accepted, without recording it
#[openapi(tag = "Expenses")]
#[post("/check", data = "<payload>")]
pub async fn check_expense(
    pool: &State<PgPool>,
    config: &State<Config>,
    current_user: CurrentUser,
    payload: Json<ExpenseRequest>,
) -> Result<Json<AdmissionResponse>, AppError> {
    payload.validate()?;

    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = BudgetService::new(&repo, config.budget.weekly_spend_mode);
    Ok(Json(service.check_expense(payload.amount, config.budget.today(), &current_user.id).await?))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![list_expenses, create_expense, check_expense]
}

#[cfg(test)]
mod tests {
    use super::parse_filter;
    use crate::error::app_error::AppError;
    use crate::models::expense::ExpenseFilter;
    use crate::routes::user::tests::{register_and_login, test_client};
    use crate::test_utils::date;
    use rocket::http::{ContentType, Status};
    use serde_json::Value;
    use uuid::Uuid;

    #[test]
    fn weekly_filter_takes_precedence() {
        let weekly = Uuid::new_v4();
        let allowance = Uuid::new_v4();
        let filter = parse_filter(Some(&allowance.to_string()), Some(&weekly.to_string()), None, None).expect("filter");
        assert_eq!(filter, Some(ExpenseFilter::WeeklyPeriod(weekly)));
    }

    #[test]
    fn date_range_filter() {
        let filter = parse_filter(None, None, Some("2026-03-10"), Some("2026-03-16")).expect("filter");
        assert_eq!(
            filter,
            Some(ExpenseFilter::DateRange {
                start: date(2026, 3, 10),
                end: date(2026, 3, 16)
            })
        );
        assert_eq!(parse_filter(None, None, None, None).expect("filter"), None);
    }

    #[test]
    fn malformed_filters_are_rejected() {
        assert!(matches!(parse_filter(None, None, Some("2026-03-10"), None), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_filter(None, None, Some("10/03/2026"), Some("2026-03-16")), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_filter(None, None, Some("2026-03-16"), Some("2026-03-10")), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_filter(Some("nope"), None, None, None), Err(AppError::UuidError { .. })));
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn expense_over_weekly_limit_is_unprocessable() {
        let client = test_client().await;
        register_and_login(&client).await;
        client.post("/api/allowance/current").dispatch().await;

        let week = serde_json::json!({ "weekly_limit": 200000 });
        let response = client.post("/api/weekly-periods/").header(ContentType::JSON).body(week.to_string()).dispatch().await;
        assert_eq!(response.status(), Status::Created);

        let first = serde_json::json!({ "description": "Belanja", "amount": 150000 });
        let response = client.post("/api/expenses/").header(ContentType::JSON).body(first.to_string()).dispatch().await;
        assert_eq!(response.status(), Status::Created);

        let too_much = serde_json::json!({ "amount": 60000 });
        let response = client.post("/api/expenses/check").header(ContentType::JSON).body(too_much.to_string()).dispatch().await;
        let check: Value = serde_json::from_str(&response.into_string().await.expect("body")).expect("json");
        assert_eq!(check["accepted"].as_bool(), Some(false));

        let response = client.post("/api/expenses/").header(ContentType::JSON).body(too_much.to_string()).dispatch().await;
        assert_eq!(response.status(), Status::UnprocessableEntity);

        let fits = serde_json::json!({ "amount": 40000 });
        let response = client.post("/api/expenses/").header(ContentType::JSON).body(fits.to_string()).dispatch().await;
        assert_eq!(response.status(), Status::Created);

        let response = client.get("/api/allowance/current").dispatch().await;
        let period: Value = serde_json::from_str(&response.into_string().await.expect("body")).expect("json");
        assert_eq!(period["remaining_amount"].as_i64(), Some(1_360_000));

        let response = client.get("/api/expenses/").dispatch().await;
        let expenses: Value = serde_json::from_str(&response.into_string().await.expect("body")).expect("json");
        assert_eq!(expenses.as_array().map(Vec::len), Some(2));
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn expense_without_period_conflicts() {
        let client = test_client().await;
        register_and_login(&client).await;

        let payload = serde_json::json!({ "amount": 1000 });
        let response = client.post("/api/expenses/").header(ContentType::JSON).body(payload.to_string()).dispatch().await;
        assert_eq!(response.status(), Status::Conflict);
    }
}
