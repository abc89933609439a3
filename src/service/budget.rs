use crate::config::WeeklySpendMode;
use crate::database::allowance_period::AllowancePeriodRepository;
use crate::database::expense::ExpenseRepository;
use crate::database::weekly_period::WeeklyPeriodRepository;
use crate::error::app_error::AppError;
use crate::models::allowance_period::{AllowancePeriod, EditBalanceMode, NewAllowancePeriod};
use crate::models::expense::{AdmissionResponse, Expense, ExpenseRequest, NewExpense};
use crate::models::weekly_period::{NewWeeklyPeriod, WeeklyPeriod, WeeklyPeriodPatch, WeeklyPeriodRequest};
use crate::service::accounting::{self, WeeklyUsage};
use chrono::NaiveDate;
use tracing::{debug, info};
use uuid::Uuid;

/// Periods an expense recorded today would be charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub weekly_period_id: Option<Uuid>,
    pub allowance_period_id: Uuid,
}

pub struct BudgetService<'a, R> {
    repository: &'a R,
    weekly_spend_mode: WeeklySpendMode,
}

impl<'a, R> BudgetService<'a, R>
where
    R: AllowancePeriodRepository + WeeklyPeriodRepository + ExpenseRepository + Sync,
{
    pub fn new(repository: &'a R, weekly_spend_mode: WeeklySpendMode) -> Self {
        BudgetService {
            repository,
            weekly_spend_mode,
        }
    }

    pub async fn current_allowance_period(&self, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
        self.repository.get_current_allowance_period(user_id).await
    }

    pub async fn list_allowance_periods(&self, user_id: &Uuid) -> Result<Vec<AllowancePeriod>, AppError> {
        self.repository.list_allowance_periods(user_id).await
    }

    /// Returns the allowance period whose window contains `today`, creating it with
    /// `default_total` if it does not exist yet. The flag is true when it was created.
    pub async fn ensure_allowance_period(&self, today: NaiveDate, default_total: i64, user_id: &Uuid) -> Result<(AllowancePeriod, bool), AppError> {
        let window = accounting::allowance_window(today).ok_or_else(|| AppError::BadRequest(format!("No allowance window for {}", today)))?;

        if let Some(existing) = self.repository.find_allowance_period_by_start(window.start, user_id).await? {
            return Ok((existing, false));
        }

        let new_period = NewAllowancePeriod {
            period_start: window.start,
            period_end: window.end,
            total_amount: default_total,
        };
        match self.repository.insert_allowance_period(&new_period, user_id).await? {
            Some(created) => {
                info!(user_id = %user_id, period_start = %created.period_start, total = created.total_amount, "allowance period created");
                Ok((created, true))
            }
            // Lost a race with another creator; theirs is the period.
            None => self
                .repository
                .find_allowance_period_by_start(window.start, user_id)
                .await?
                .map(|existing| (existing, false))
                .ok_or_else(|| AppError::NotFound("Allowance period not found".to_string())),
        }
    }

    /// Adds `amount` to the current period. With no current period, one is created
    /// for today's window with `amount` as its total.
    pub async fn top_up(&self, amount: i64, today: NaiveDate, user_id: &Uuid) -> Result<AllowancePeriod, AppError> {
        accounting::ensure_positive_amount(amount, "amount")?;

        let period = match self.repository.get_current_allowance_period(user_id).await? {
            Some(period) => period,
            None => {
                let (period, created) = self.ensure_allowance_period(today, amount, user_id).await?;
                if created {
                    return Ok(period);
                }
                self.repository.set_current_allowance_period(&period.id, user_id).await?
            }
        };

        let patch = accounting::top_up_patch(&period, amount)?;
        let updated = self.repository.update_allowance_period(&period.id, &patch, user_id).await?;
        info!(user_id = %user_id, amount, remaining = updated.remaining_amount, "allowance topped up");

        Ok(updated)
    }

    pub async fn edit_balance(&self, amount: i64, mode: EditBalanceMode, user_id: &Uuid) -> Result<AllowancePeriod, AppError> {
        let period = self.repository.get_current_allowance_period(user_id).await?.ok_or(AppError::NoActivePeriod)?;

        let patch = accounting::edit_balance_patch(&period, amount, mode)?;
        let updated = self.repository.update_allowance_period(&period.id, &patch, user_id).await?;
        info!(user_id = %user_id, total = updated.total_amount, remaining = updated.remaining_amount, ?mode, "allowance balance edited");

        Ok(updated)
    }

    pub async fn select_allowance_period(&self, id: &Uuid, user_id: &Uuid) -> Result<AllowancePeriod, AppError> {
        self.repository.set_current_allowance_period(id, user_id).await
    }

    pub async fn active_weekly_period(&self, today: NaiveDate, user_id: &Uuid) -> Result<Option<WeeklyPeriod>, AppError> {
        self.repository.find_weekly_period(today, None, user_id).await
    }

    pub async fn weekly_usage(&self, period: &WeeklyPeriod, user_id: &Uuid) -> Result<WeeklyUsage, AppError> {
        let filter = accounting::weekly_spend_filter(period, self.weekly_spend_mode);
        let spent = self.repository.sum_expenses(&filter, user_id).await?;

        Ok(WeeklyUsage::of(period, spent))
    }

    /// Runs the admission rules for an expense of `amount` today without recording it.
    pub async fn admit(&self, amount: i64, today: NaiveDate, user_id: &Uuid) -> Result<Admission, AppError> {
        let usage = match self.active_weekly_period(today, user_id).await? {
            Some(period) => Some(self.weekly_usage(&period, user_id).await?),
            None => None,
        };
        let allowance = self.repository.get_current_allowance_period(user_id).await?;

        accounting::admit_expense(amount, usage.as_ref(), allowance.as_ref())?;

        Ok(Admission {
            weekly_period_id: usage.map(|usage| usage.weekly_period_id),
            allowance_period_id: allowance.map(|period| period.id).ok_or(AppError::NoActivePeriod)?,
        })
    }

    /// Like [`Self::admit`], but a budget rejection is reported in the response instead of as an error.
    pub async fn check_expense(&self, amount: i64, today: NaiveDate, user_id: &Uuid) -> Result<AdmissionResponse, AppError> {
        match self.admit(amount, today, user_id).await {
            Ok(admission) => Ok(AdmissionResponse {
                accepted: true,
                reason: None,
                weekly_period_id: admission.weekly_period_id,
                allowance_period_id: Some(admission.allowance_period_id),
            }),
            Err(e) if e.is_budget_rejection() || matches!(e, AppError::BadRequest(_)) => Ok(AdmissionResponse {
                accepted: false,
                reason: Some(e.to_string()),
                weekly_period_id: None,
                allowance_period_id: None,
            }),
            Err(e) => Err(e),
        }
    }

    pub async fn add_expense(&self, request: &ExpenseRequest, today: NaiveDate, user_id: &Uuid) -> Result<Expense, AppError> {
        let admission = self.admit(request.amount, today, user_id).await?;

        let new_expense = NewExpense {
            weekly_period_id: admission.weekly_period_id,
            allowance_period_id: admission.allowance_period_id,
            date: today,
            description: normalize_text(request.description.as_deref()),
            amount: request.amount,
        };
        let expense = self.repository.record_expense(&new_expense, self.weekly_spend_mode, user_id).await?;
        debug!(user_id = %user_id, expense_id = %expense.id, amount = expense.amount, "expense recorded");

        Ok(expense)
    }

    pub async fn create_weekly_period(&self, request: &WeeklyPeriodRequest, today: NaiveDate, user_id: &Uuid) -> Result<WeeklyPeriod, AppError> {
        accounting::ensure_positive_amount(request.weekly_limit, "weekly_limit")?;

        let (start_date, end_date) = match (request.start_date, request.end_date) {
            (Some(start), Some(end)) => (start, end),
            (None, None) => {
                let week = accounting::week_window(today).ok_or_else(|| AppError::BadRequest(format!("No week window for {}", today)))?;
                (week.start, week.end)
            }
            _ => return Err(AppError::BadRequest("start_date and end_date must be given together".to_string())),
        };
        if start_date > end_date {
            return Err(AppError::BadRequest("start_date must not be after end_date".to_string()));
        }

        let allowance_period_id = match request.allowance_period_id {
            Some(id) => {
                self.repository
                    .get_allowance_period(&id, user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Allowance period not found".to_string()))?;
                Some(id)
            }
            None => self.repository.get_current_allowance_period(user_id).await?.map(|period| period.id),
        };

        let candidate = NewWeeklyPeriod {
            allowance_period_id,
            period_name: normalize_text(request.period_name.as_deref()),
            start_date,
            end_date,
            weekly_limit: request.weekly_limit,
        };

        let existing = self.repository.list_weekly_periods(candidate.allowance_period_id.as_ref(), user_id).await?;
        accounting::ensure_no_overlap(&existing, &candidate)?;

        let created = self.repository.insert_weekly_period(&candidate, user_id).await?;
        info!(user_id = %user_id, weekly_period_id = %created.id, start = %created.start_date, end = %created.end_date, "weekly period created");

        Ok(created)
    }

    pub async fn update_weekly_period(&self, id: &Uuid, patch: &WeeklyPeriodPatch, user_id: &Uuid) -> Result<WeeklyPeriod, AppError> {
        if let Some(limit) = patch.weekly_limit {
            accounting::ensure_positive_amount(limit, "weekly_limit")?;
        }
        let patch = WeeklyPeriodPatch {
            period_name: patch.period_name.as_ref().map(|name| normalize_text(name.as_deref())),
            weekly_limit: patch.weekly_limit,
        };

        self.repository.update_weekly_period(id, &patch, user_id).await
    }

    /// Removes the weekly period together with its expenses. Balances are not refunded.
    pub async fn delete_weekly_period(&self, id: &Uuid, user_id: &Uuid) -> Result<u64, AppError> {
        let deleted_expenses = self.repository.delete_weekly_period(id, user_id).await?;
        info!(user_id = %user_id, weekly_period_id = %id, deleted_expenses, "weekly period deleted");

        Ok(deleted_expenses)
    }
}

fn normalize_text(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|value| !value.is_empty()).map(str::to_string)
}
