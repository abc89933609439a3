use crate::models::expense::ExpenseResponse;
use chrono::{DateTime, NaiveDate, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// A window of dates with its own spending cap.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct WeeklyPeriod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub allowance_period_id: Option<Uuid>,
    pub period_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekly_limit: i64,
    pub created_at: DateTime<Utc>,
}

impl WeeklyPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWeeklyPeriod {
    pub allowance_period_id: Option<Uuid>,
    pub period_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekly_limit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WeeklyPeriodPatch {
    /// `Some(None)` clears the name; `None` leaves it untouched.
    pub period_name: Option<Option<String>>,
    pub weekly_limit: Option<i64>,
}

/// When both dates are omitted the week (Monday to Sunday) containing today is used.
#[derive(Deserialize, Debug, Validate, JsonSchema)]
#[validate(schema(function = "validate_date_range"))]
pub struct WeeklyPeriodRequest {
    pub allowance_period_id: Option<Uuid>,
    #[validate(length(max = 100))]
    pub period_name: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[validate(range(min = 1, message = "weekly_limit must be greater than zero"))]
    pub weekly_limit: i64,
}

fn validate_date_range(request: &WeeklyPeriodRequest) -> Result<(), ValidationError> {
    match (request.start_date, request.end_date) {
        (Some(start), Some(end)) if start > end => Err(ValidationError::new("start_date_must_not_be_after_end_date")),
        (Some(_), None) | (None, Some(_)) => Err(ValidationError::new("start_date_and_end_date_must_be_given_together")),
        _ => Ok(()),
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
#[validate(schema(function = "validate_patch_not_empty"))]
pub struct WeeklyPeriodUpdateRequest {
    #[validate(length(max = 100))]
    pub period_name: Option<String>,
    #[validate(range(min = 1, message = "weekly_limit must be greater than zero"))]
    pub weekly_limit: Option<i64>,
}

fn validate_patch_not_empty(request: &WeeklyPeriodUpdateRequest) -> Result<(), ValidationError> {
    if request.period_name.is_none() && request.weekly_limit.is_none() {
        return Err(ValidationError::new("nothing_to_update"));
    }
    Ok(())
}

impl From<&WeeklyPeriodUpdateRequest> for WeeklyPeriodPatch {
    fn from(request: &WeeklyPeriodUpdateRequest) -> Self {
        Self {
            period_name: request.period_name.clone().map(Some),
            weekly_limit: request.weekly_limit,
        }
    }
}

#[derive(Serialize, Debug, Clone, JsonSchema)]
pub struct WeeklyPeriodResponse {
    pub id: Uuid,
    pub allowance_period_id: Option<Uuid>,
    pub period_name: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub weekly_limit: i64,
}

impl From<&WeeklyPeriod> for WeeklyPeriodResponse {
    fn from(period: &WeeklyPeriod) -> Self {
        Self {
            id: period.id,
            allowance_period_id: period.allowance_period_id,
            period_name: period.period_name.clone(),
            start_date: period.start_date,
            end_date: period.end_date,
            weekly_limit: period.weekly_limit,
        }
    }
}

/// A weekly period together with how much of its limit is used.
#[derive(Serialize, Debug, Clone, JsonSchema)]
pub struct WeeklyPeriodSummary {
    #[serde(flatten)]
    pub period: WeeklyPeriodResponse,
    pub spent: i64,
    pub remaining: i64,
    pub is_active: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct DailyExpenses {
    pub date: NaiveDate,
    pub total: i64,
    pub expenses: Vec<ExpenseResponse>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct WeeklyPeriodDetail {
    #[serde(flatten)]
    pub summary: WeeklyPeriodSummary,
    pub days: Vec<DailyExpenses>,
}

#[derive(Serialize, Debug, JsonSchema)]
pub struct DeleteWeeklyPeriodResponse {
    pub id: Uuid,
    pub deleted_expenses: u64,
}
