use chrono::{DateTime, NaiveDate, Utc};
use rocket::serde::{Deserialize, Serialize};
use schemars::JsonSchema;
use uuid::Uuid;
use validator::Validate;

/// A 25th-to-24th allowance cycle with its total and remaining balance.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct AllowancePeriod {
    pub id: Uuid,
    pub user_id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_amount: i64,
    pub remaining_amount: i64,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

impl AllowancePeriod {
    pub fn spent(&self) -> i64 {
        self.total_amount - self.remaining_amount
    }

    /// Share of the total already spent, rounded to one decimal place.
    pub fn percent_used(&self) -> f64 {
        if self.total_amount <= 0 {
            return 0.0;
        }
        let percent = self.spent() as f64 / self.total_amount as f64 * 100.0;
        (percent * 10.0).round() / 10.0
    }
}

#[derive(Debug, Clone)]
pub struct NewAllowancePeriod {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_amount: i64,
}

/// Partial update of an allowance period's amounts, guarded by the version the caller read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowancePeriodPatch {
    pub total_amount: Option<i64>,
    pub remaining_amount: Option<i64>,
    pub expected_version: i32,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct TopUpRequest {
    #[validate(range(min = 1, message = "amount must be greater than zero"))]
    pub amount: i64,
}

/// How an edit treats what has already been spent.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EditBalanceMode {
    /// Set both total and remaining to the new amount.
    #[default]
    Reset,
    /// Set the total and keep the amount already spent deducted from it.
    KeepSpent,
}

#[derive(Deserialize, Debug, Validate, JsonSchema)]
pub struct EditBalanceRequest {
    #[validate(range(min = 1, message = "amount must be greater than zero"))]
    pub amount: i64,
    #[serde(default)]
    pub mode: EditBalanceMode,
}

#[derive(Serialize, Debug, Clone, JsonSchema)]
pub struct AllowancePeriodResponse {
    pub id: Uuid,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_amount: i64,
    pub remaining_amount: i64,
    pub spent_amount: i64,
    pub percent_used: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&AllowancePeriod> for AllowancePeriodResponse {
    fn from(period: &AllowancePeriod) -> Self {
        Self {
            id: period.id,
            period_start: period.period_start,
            period_end: period.period_end,
            total_amount: period.total_amount,
            remaining_amount: period.remaining_amount,
            spent_amount: period.spent(),
            percent_used: period.percent_used(),
            created_at: period.created_at,
        }
    }
}

/// Result of asking for the current allowance period to exist.
#[derive(Serialize, Debug, JsonSchema)]
pub struct EnsurePeriodResponse {
    pub created: bool,
    pub period: AllowancePeriodResponse,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq, JsonSchema)]
pub struct PeriodCreationSummary {
    pub users_processed: i64,
    pub periods_created: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_used_rounds_to_one_decimal() {
        let period = AllowancePeriod {
            total_amount: 1_550_000,
            remaining_amount: 1_510_000,
            ..AllowancePeriod::default()
        };
        assert_eq!(period.spent(), 40_000);
        assert_eq!(period.percent_used(), 2.6);
    }

    #[test]
    fn percent_used_is_zero_for_empty_total() {
        let period = AllowancePeriod::default();
        assert_eq!(period.percent_used(), 0.0);
    }

    #[test]
    fn edit_mode_defaults_to_reset() {
        let request: EditBalanceRequest = serde_json::from_str(r#"{"amount": 1000}"#).expect("valid payload");
        assert_eq!(request.mode, EditBalanceMode::Reset);

        let request: EditBalanceRequest = serde_json::from_str(r#"{"amount": 1000, "mode": "keep_spent"}"#).expect("valid payload");
        assert_eq!(request.mode, EditBalanceMode::KeepSpent);
    }
}
