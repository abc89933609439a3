use chrono::{DateTime, NaiveDate, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct Expense {
    pub id: Uuid,
    pub user_id: Uuid,
    pub weekly_period_id: Option<Uuid>,
    pub allowance_period_id: Uuid,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub weekly_period_id: Option<Uuid>,
    pub allowance_period_id: Uuid,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub amount: i64,
}

/// Which expenses a sum or listing covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpenseFilter {
    WeeklyPeriod(Uuid),
    AllowancePeriod(Uuid),
    DateRange { start: NaiveDate, end: NaiveDate },
}

impl ExpenseFilter {
    /// In-memory counterpart of the SQL `WHERE` clause built for this filter.
    #[cfg(test)]
    pub fn matches(&self, expense: &Expense) -> bool {
        match self {
            ExpenseFilter::WeeklyPeriod(id) => expense.weekly_period_id == Some(*id),
            ExpenseFilter::AllowancePeriod(id) => expense.allowance_period_id == *id,
            ExpenseFilter::DateRange { start, end } => *start <= expense.date && expense.date <= *end,
        }
    }
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct ExpenseRequest {
    #[validate(length(max = 255))]
    pub description: Option<String>,
    #[validate(range(min = 1, message = "amount must be greater than zero"))]
    pub amount: i64,
}

#[derive(Serialize, Debug, Clone, PartialEq, JsonSchema)]
pub struct ExpenseResponse {
    pub id: Uuid,
    pub weekly_period_id: Option<Uuid>,
    pub allowance_period_id: Uuid,
    pub date: NaiveDate,
    pub description: Option<String>,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl From<&Expense> for ExpenseResponse {
    fn from(expense: &Expense) -> Self {
        Self {
            id: expense.id,
            weekly_period_id: expense.weekly_period_id,
            allowance_period_id: expense.allowance_period_id,
            date: expense.date,
            description: expense.description.clone(),
            amount: expense.amount,
            created_at: expense.created_at,
        }
    }
}

/// Outcome of a dry-run admission check.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct AdmissionResponse {
    pub accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub weekly_period_id: Option<Uuid>,
    pub allowance_period_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_matches_by_link_and_by_date() {
        let weekly_id = Uuid::new_v4();
        let expense = Expense {
            weekly_period_id: Some(weekly_id),
            date: NaiveDate::from_ymd_opt(2026, 3, 12).expect("valid date"),
            amount: 10_000,
            ..Expense::default()
        };

        assert!(ExpenseFilter::WeeklyPeriod(weekly_id).matches(&expense));
        assert!(!ExpenseFilter::WeeklyPeriod(Uuid::new_v4()).matches(&expense));
        assert!(
            ExpenseFilter::DateRange {
                start: NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date"),
                end: NaiveDate::from_ymd_opt(2026, 3, 12).expect("valid date"),
            }
            .matches(&expense)
        );
        assert!(
            !ExpenseFilter::DateRange {
                start: NaiveDate::from_ymd_opt(2026, 3, 13).expect("valid date"),
                end: NaiveDate::from_ymd_opt(2026, 3, 19).expect("valid date"),
            }
            .matches(&expense)
        );
    }

    #[test]
    fn request_rejects_non_positive_amount() {
        let request = ExpenseRequest {
            description: Some("Makan siang".to_string()),
            amount: 0,
        };
        assert!(request.validate().is_err());
    }
}
