use crate::models::allowance_period::AllowancePeriodResponse;
use crate::models::expense::ExpenseResponse;
use crate::models::weekly_period::WeeklyPeriodSummary;
use chrono::NaiveDate;
use rocket::serde::Serialize;
use schemars::JsonSchema;

#[derive(Serialize, Debug, JsonSchema)]
pub struct DashboardResponse {
    pub today: NaiveDate,
    pub allowance: Option<AllowancePeriodResponse>,
    pub active_week: Option<WeeklyPeriodSummary>,
    pub expenses: Vec<ExpenseResponse>,
}
