use crate::config::WeeklySpendMode;
use crate::database::allowance_period::AllowancePeriodRepository;
use crate::database::expense::ExpenseRepository;
use crate::database::weekly_period::WeeklyPeriodRepository;
use crate::error::app_error::AppError;
use crate::models::allowance_period::AllowancePeriodResponse;
use crate::models::dashboard::DashboardResponse;
use crate::models::expense::{Expense, ExpenseFilter, ExpenseResponse};
use crate::models::weekly_period::{DailyExpenses, WeeklyPeriod, WeeklyPeriodDetail, WeeklyPeriodResponse, WeeklyPeriodSummary};
use crate::service::accounting::{self, WeeklyUsage};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Read-side views: dashboard, weekly history and per-day breakdowns.
pub struct HistoryService<'a, R> {
    repository: &'a R,
    weekly_spend_mode: WeeklySpendMode,
}

impl<'a, R> HistoryService<'a, R>
where
    R: AllowancePeriodRepository + WeeklyPeriodRepository + ExpenseRepository + Sync,
{
    pub fn new(repository: &'a R, weekly_spend_mode: WeeklySpendMode) -> Self {
        HistoryService {
            repository,
            weekly_spend_mode,
        }
    }

    pub async fn dashboard(&self, today: NaiveDate, user_id: &Uuid) -> Result<DashboardResponse, AppError> {
        let allowance = self.repository.get_current_allowance_period(user_id).await?;
        let active_week = match self.repository.find_weekly_period(today, None, user_id).await? {
            Some(period) => Some(self.summarize(&period, today, user_id).await?),
            None => None,
        };
        let expenses = match &allowance {
            Some(period) => self.repository.list_expenses(&ExpenseFilter::AllowancePeriod(period.id), user_id).await?,
            None => Vec::new(),
        };

        Ok(DashboardResponse {
            today,
            allowance: allowance.as_ref().map(AllowancePeriodResponse::from),
            active_week,
            expenses: expenses.iter().map(ExpenseResponse::from).collect(),
        })
    }

    pub async fn weekly_history(&self, allowance_period_id: Option<&Uuid>, today: NaiveDate, user_id: &Uuid) -> Result<Vec<WeeklyPeriodSummary>, AppError> {
        let periods = self.repository.list_weekly_periods(allowance_period_id, user_id).await?;

        let mut summaries = Vec::with_capacity(periods.len());
        for period in &periods {
            summaries.push(self.summarize(period, today, user_id).await?);
        }
        Ok(summaries)
    }

    pub async fn weekly_period_detail(&self, id: &Uuid, today: NaiveDate, user_id: &Uuid) -> Result<WeeklyPeriodDetail, AppError> {
        let period = self
            .repository
            .get_weekly_period(id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Weekly period not found".to_string()))?;

        let filter = accounting::weekly_spend_filter(&period, self.weekly_spend_mode);
        let expenses = self.repository.list_expenses(&filter, user_id).await?;
        let spent = expenses.iter().map(|e| e.amount).sum();

        Ok(WeeklyPeriodDetail {
            summary: summary(&period, &WeeklyUsage::of(&period, spent), today),
            days: daily_breakdown(period.start_date, period.end_date, &expenses),
        })
    }

    pub async fn list_expenses(&self, filter: &ExpenseFilter, user_id: &Uuid) -> Result<Vec<Expense>, AppError> {
        self.repository.list_expenses(filter, user_id).await
    }

    async fn summarize(&self, period: &WeeklyPeriod, today: NaiveDate, user_id: &Uuid) -> Result<WeeklyPeriodSummary, AppError> {
        let filter = accounting::weekly_spend_filter(period, self.weekly_spend_mode);
        let spent = self.repository.sum_expenses(&filter, user_id).await?;
        Ok(summary(period, &WeeklyUsage::of(period, spent), today))
    }
}

pub fn summary(period: &WeeklyPeriod, usage: &WeeklyUsage, today: NaiveDate) -> WeeklyPeriodSummary {
    WeeklyPeriodSummary {
        period: WeeklyPeriodResponse::from(period),
        spent: usage.spent,
        remaining: usage.remaining(),
        is_active: period.contains(today),
    }
}

/// Groups expenses by day, one entry for every date from `start` to `end`
/// inclusive. Days are ascending; expenses within a day keep their given order.
pub fn daily_breakdown(start: NaiveDate, end: NaiveDate, expenses: &[Expense]) -> Vec<DailyExpenses> {
    let mut by_day: BTreeMap<NaiveDate, DailyExpenses> = start
        .iter_days()
        .take_while(|day| *day <= end)
        .map(|day| {
            (
                day,
                DailyExpenses {
                    date: day,
                    total: 0,
                    expenses: Vec::new(),
                },
            )
        })
        .collect();

    for expense in expenses {
        if let Some(day) = by_day.get_mut(&expense.date) {
            day.total += expense.amount;
            day.expenses.push(ExpenseResponse::from(expense));
        }
    }

    by_day.into_values().collect()
}
