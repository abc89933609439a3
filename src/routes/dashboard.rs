use crate::auth::CurrentUser;
use crate::config::Config;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::dashboard::DashboardResponse;
use crate::service::history::HistoryService;
use rocket::serde::json::Json;
use rocket::{State, get};
use rocket_okapi::openapi;
use sqlx::PgPool;

/// Current allowance balance, the active week's usage and this period's expenses
#[openapi(tag = "Dashboard")]
#[get("/")]
pub async fn get_dashboard(pool: &State<PgPool>, config: &State<Config>, current_user: CurrentUser) -> Result<Json<DashboardResponse>, AppError> {
    let repo = PostgresRepository { pool: pool.inner().clone() };
    let service = HistoryService::new(&repo, config.budget.weekly_spend_mode);
    Ok(Json(service.dashboard(config.budget.today(), &current_user.id).await?))
}

pub fn routes() -> (Vec<rocket::Route>, okapi::openapi3::OpenApi) {
    rocket_okapi::openapi_get_routes_spec![get_dashboard]
}

#[cfg(test)]
mod tests {
    use crate::routes::user::tests::{register_and_login, test_client};
    use rocket::http::Status;
    use serde_json::Value;

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn dashboard_for_new_user_has_no_period() {
        let client = test_client().await;
        register_and_login(&client).await;

        let response = client.get("/api/dashboard/").dispatch().await;
        assert_eq!(response.status(), Status::Ok);

        let json: Value = serde_json::from_str(&response.into_string().await.expect("body")).expect("json");
        assert!(json["allowance"].is_null());
        assert!(json["active_week"].is_null());
        assert_eq!(json["expenses"].as_array().map(Vec::len), Some(0));
    }

    #[rocket::async_test]
    #[ignore = "requires database"]
    async fn dashboard_reports_percent_used() {
        let client = test_client().await;
        register_and_login(&client).await;
        client.post("/api/allowance/current").dispatch().await;

        let expense = serde_json::json!({ "amount": 155000 });
        client
            .post("/api/expenses/")
            .header(rocket::http::ContentType::JSON)
            .body(expense.to_string())
            .dispatch()
            .await;

        let response = client.get("/api/dashboard/").dispatch().await;
        let json: Value = serde_json::from_str(&response.into_string().await.expect("body")).expect("json");
        assert_eq!(json["allowance"]["spent_amount"].as_i64(), Some(155_000));
        assert_eq!(json["allowance"]["percent_used"].as_f64(), Some(10.0));
    }
}
