//! Budget accounting rules: which periods are active on a given day, whether an
//! expense may be recorded, and how balances move. Everything here is a pure
//! function of its arguments so both the Postgres store (inside its
//! transactions) and the services can run the same checks.

use crate::config::WeeklySpendMode;
use crate::error::app_error::AppError;
use crate::models::allowance_period::{AllowancePeriod, AllowancePeriodPatch, EditBalanceMode};
use crate::models::expense::ExpenseFilter;
use crate::models::weekly_period::{NewWeeklyPeriod, WeeklyPeriod};
use chrono::{Datelike, Days, Months, NaiveDate};
use uuid::Uuid;

/// Allowance periods start on this day of the month...
pub const ALLOWANCE_START_DAY: u32 = 25;
/// ...and end on this day of the following month.
pub const ALLOWANCE_END_DAY: u32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    #[cfg(test)]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// The allowance window containing `today`: the 25th on or before today through
/// the 24th of the month after that.
pub fn allowance_window(today: NaiveDate) -> Option<DateWindow> {
    let this_month = NaiveDate::from_ymd_opt(today.year(), today.month(), ALLOWANCE_START_DAY)?;
    let start = if today.day() >= ALLOWANCE_START_DAY {
        this_month
    } else {
        this_month.checked_sub_months(Months::new(1))?
    };
    let end = start.checked_add_months(Months::new(1))?.with_day(ALLOWANCE_END_DAY)?;

    Some(DateWindow { start, end })
}

/// Monday through Sunday of the week containing `today`.
pub fn week_window(today: NaiveDate) -> Option<DateWindow> {
    let start = today.checked_sub_days(Days::new(today.weekday().num_days_from_monday() as u64))?;
    let end = start.checked_add_days(Days::new(6))?;
    Some(DateWindow { start, end })
}

/// The weekly period covering `today`. When several do, the one that started
/// last wins, then the one created last. Postgres applies the same ordering in SQL.
#[cfg(test)]
pub fn select_active_weekly(periods: &[WeeklyPeriod], today: NaiveDate) -> Option<&WeeklyPeriod> {
    periods
        .iter()
        .filter(|period| period.contains(today))
        .max_by(|a, b| a.start_date.cmp(&b.start_date).then(a.created_at.cmp(&b.created_at)))
}

pub fn ranges_overlap(start: NaiveDate, end: NaiveDate, other_start: NaiveDate, other_end: NaiveDate) -> bool {
    start <= other_end && end >= other_start
}

/// First existing period under the same allowance period whose dates overlap the candidate.
/// Periods without an allowance period form their own group.
pub fn find_overlap<'a>(existing: &'a [WeeklyPeriod], candidate: &NewWeeklyPeriod) -> Option<&'a WeeklyPeriod> {
    existing.iter().find(|period| {
        period.allowance_period_id == candidate.allowance_period_id
            && ranges_overlap(candidate.start_date, candidate.end_date, period.start_date, period.end_date)
    })
}

pub fn ensure_no_overlap(existing: &[WeeklyPeriod], candidate: &NewWeeklyPeriod) -> Result<(), AppError> {
    match find_overlap(existing, candidate) {
        Some(period) => Err(AppError::OverlappingPeriod {
            start: candidate.start_date,
            end: candidate.end_date,
            existing_id: period.id,
        }),
        None => Ok(()),
    }
}

/// How much of a weekly period's limit has been used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyUsage {
    pub weekly_period_id: Uuid,
    pub limit: i64,
    pub spent: i64,
}

impl WeeklyUsage {
    pub fn of(period: &WeeklyPeriod, spent: i64) -> Self {
        WeeklyUsage {
            weekly_period_id: period.id,
            limit: period.weekly_limit,
            spent,
        }
    }

    pub fn remaining(&self) -> i64 {
        self.limit - self.spent
    }
}

/// Expenses that count against a weekly period's limit.
pub fn weekly_spend_filter(period: &WeeklyPeriod, mode: WeeklySpendMode) -> ExpenseFilter {
    match mode {
        WeeklySpendMode::Linked => ExpenseFilter::WeeklyPeriod(period.id),
        WeeklySpendMode::DateRange => ExpenseFilter::DateRange {
            start: period.start_date,
            end: period.end_date,
        },
    }
}

pub fn ensure_positive_amount(amount: i64, field: &str) -> Result<(), AppError> {
    if amount <= 0 {
        return Err(AppError::BadRequest(format!("{} must be greater than zero", field)));
    }
    Ok(())
}

/// A non-positive limit means the week is uncapped.
pub fn check_weekly_limit(usage: &WeeklyUsage, amount: i64) -> Result<(), AppError> {
    if usage.limit > 0 && usage.spent.saturating_add(amount) > usage.limit {
        return Err(AppError::WeeklyLimitExceeded {
            requested: amount,
            spent: usage.spent,
            limit: usage.limit,
        });
    }
    Ok(())
}

pub fn check_balance(allowance: Option<&AllowancePeriod>, amount: i64) -> Result<&AllowancePeriod, AppError> {
    let allowance = allowance.ok_or(AppError::NoActivePeriod)?;
    if amount > allowance.remaining_amount {
        return Err(AppError::InsufficientBalance {
            requested: amount,
            remaining: allowance.remaining_amount,
        });
    }
    Ok(allowance)
}

/// Decides whether an expense of `amount` may be recorded. The weekly cap is
/// checked first and skipped entirely when no weekly period is active.
pub fn admit_expense(amount: i64, weekly: Option<&WeeklyUsage>, allowance: Option<&AllowancePeriod>) -> Result<(), AppError> {
    ensure_positive_amount(amount, "amount")?;
    if let Some(usage) = weekly {
        check_weekly_limit(usage, amount)?;
    }
    check_balance(allowance, amount)?;
    Ok(())
}

pub fn top_up_patch(period: &AllowancePeriod, amount: i64) -> Result<AllowancePeriodPatch, AppError> {
    ensure_positive_amount(amount, "amount")?;
    let overflow = || AppError::BadRequest("Top-up amount is too large".to_string());

    Ok(AllowancePeriodPatch {
        total_amount: Some(period.total_amount.checked_add(amount).ok_or_else(overflow)?),
        remaining_amount: Some(period.remaining_amount.checked_add(amount).ok_or_else(overflow)?),
        expected_version: period.version,
    })
}

pub fn edit_balance_patch(period: &AllowancePeriod, amount: i64, mode: EditBalanceMode) -> Result<AllowancePeriodPatch, AppError> {
    ensure_positive_amount(amount, "amount")?;

    let remaining = match mode {
        EditBalanceMode::Reset => amount,
        EditBalanceMode::KeepSpent => {
            let remaining = amount - period.spent();
            if remaining < 0 {
                return Err(AppError::BadRequest(format!(
                    "New total {} is below the {} already spent in this period",
                    amount,
                    period.spent()
                )));
            }
            remaining
        }
    };

    Ok(AllowancePeriodPatch {
        total_amount: Some(amount),
        remaining_amount: Some(remaining),
        expected_version: period.version,
    })
}

/// The period as it looks after `patch` is applied.
pub fn apply_patch(period: &AllowancePeriod, patch: &AllowancePeriodPatch) -> AllowancePeriod {
    AllowancePeriod {
        total_amount: patch.total_amount.unwrap_or(period.total_amount),
        remaining_amount: patch.remaining_amount.unwrap_or(period.remaining_amount),
        version: period.version + 1,
        ..period.clone()
    }
}

pub fn deduct_patch(period: &AllowancePeriod, amount: i64) -> AllowancePeriodPatch {
    AllowancePeriodPatch {
        total_amount: None,
        remaining_amount: Some(period.remaining_amount - amount),
        expected_version: period.version,
    }
}
