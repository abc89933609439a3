use crate::config::WeeklySpendMode;
use crate::database::allowance_period::AllowancePeriodRepository;
use crate::database::expense::ExpenseRepository;
use crate::database::weekly_period::WeeklyPeriodRepository;
use crate::error::app_error::AppError;
use crate::models::allowance_period::{AllowancePeriod, AllowancePeriodPatch, NewAllowancePeriod};
use crate::models::expense::{Expense, ExpenseFilter, NewExpense};
use crate::models::weekly_period::{NewWeeklyPeriod, WeeklyPeriod, WeeklyPeriodPatch};
use crate::service::accounting::{self, WeeklyUsage};
use chrono::{NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

pub fn sample_weekly_period(start: NaiveDate, end: NaiveDate, weekly_limit: i64) -> WeeklyPeriod {
    WeeklyPeriod {
        id: Uuid::new_v4(),
        start_date: start,
        end_date: end,
        weekly_limit,
        created_at: Utc::now(),
        ..WeeklyPeriod::default()
    }
}

pub fn sample_expense(date: NaiveDate, amount: i64) -> Expense {
    Expense {
        id: Uuid::new_v4(),
        date,
        amount,
        created_at: Utc::now(),
        ..Expense::default()
    }
}

#[derive(Default)]
struct MockState {
    allowance_periods: Vec<AllowancePeriod>,
    current: HashMap<Uuid, Uuid>,
    weekly_periods: Vec<WeeklyPeriod>,
    expenses: Vec<Expense>,
}

impl MockState {
    fn allowance_period(&self, id: &Uuid, user_id: &Uuid) -> Option<&AllowancePeriod> {
        self.allowance_periods.iter().find(|p| p.id == *id && p.user_id == *user_id)
    }

    fn weekly_period(&self, id: &Uuid, user_id: &Uuid) -> Option<&WeeklyPeriod> {
        self.weekly_periods.iter().find(|p| p.id == *id && p.user_id == *user_id)
    }

    fn sum(&self, filter: &ExpenseFilter, user_id: &Uuid) -> i64 {
        self.expenses.iter().filter(|e| e.user_id == *user_id && filter.matches(e)).map(|e| e.amount).sum()
    }
}

/// In-memory store with the same rules as the Postgres repository.
pub struct MockRepository {
    pub user_id: Uuid,
    state: Mutex<MockState>,
}

impl MockRepository {
    pub fn new() -> Self {
        MockRepository {
            user_id: Uuid::new_v4(),
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    pub fn expenses(&self) -> Vec<Expense> {
        self.state().expenses.clone()
    }

    pub fn insert_expense(&self, expense: Expense) {
        self.state().expenses.push(expense);
    }
}

#[async_trait::async_trait]
impl AllowancePeriodRepository for MockRepository {
    async fn get_current_allowance_period(&self, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
        let state = self.state();
        Ok(state.current.get(user_id).and_then(|id| state.allowance_period(id, user_id)).cloned())
    }

    async fn get_allowance_period(&self, id: &Uuid, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
        Ok(self.state().allowance_period(id, user_id).cloned())
    }

    async fn find_allowance_period_by_start(&self, period_start: NaiveDate, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
        Ok(self
            .state()
            .allowance_periods
            .iter()
            .find(|p| p.user_id == *user_id && p.period_start == period_start)
            .cloned())
    }

    async fn list_allowance_periods(&self, user_id: &Uuid) -> Result<Vec<AllowancePeriod>, AppError> {
        let mut periods: Vec<AllowancePeriod> = self.state().allowance_periods.iter().filter(|p| p.user_id == *user_id).cloned().collect();
        periods.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        Ok(periods)
    }

    async fn insert_allowance_period(&self, period: &NewAllowancePeriod, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
        let mut state = self.state();
        if state.allowance_periods.iter().any(|p| p.user_id == *user_id && p.period_start == period.period_start) {
            return Ok(None);
        }

        let created = AllowancePeriod {
            id: Uuid::new_v4(),
            user_id: *user_id,
            period_start: period.period_start,
            period_end: period.period_end,
            total_amount: period.total_amount,
            remaining_amount: period.total_amount,
            version: 0,
            created_at: Utc::now(),
        };
        state.allowance_periods.push(created.clone());
        state.current.insert(*user_id, created.id);
        Ok(Some(created))
    }

    async fn update_allowance_period(&self, id: &Uuid, patch: &AllowancePeriodPatch, user_id: &Uuid) -> Result<AllowancePeriod, AppError> {
        let mut state = self.state();
        let period = state
            .allowance_periods
            .iter_mut()
            .find(|p| p.id == *id && p.user_id == *user_id)
            .ok_or_else(|| AppError::NotFound("Allowance period not found".to_string()))?;
        if period.version != patch.expected_version {
            return Err(AppError::ConcurrentModification);
        }

        *period = accounting::apply_patch(period, patch);
        Ok(period.clone())
    }

    async fn set_current_allowance_period(&self, id: &Uuid, user_id: &Uuid) -> Result<AllowancePeriod, AppError> {
        let mut state = self.state();
        let period = state
            .allowance_period(id, user_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound("Allowance period not found".to_string()))?;
        state.current.insert(*user_id, period.id);
        Ok(period)
    }
}

#[async_trait::async_trait]
impl WeeklyPeriodRepository for MockRepository {
    async fn find_weekly_period(&self, date: NaiveDate, allowance_period_id: Option<&Uuid>, user_id: &Uuid) -> Result<Option<WeeklyPeriod>, AppError> {
        let state = self.state();
        let candidates: Vec<WeeklyPeriod> = state
            .weekly_periods
            .iter()
            .filter(|p| p.user_id == *user_id && allowance_period_id.is_none_or(|id| p.allowance_period_id == Some(*id)))
            .cloned()
            .collect();
        Ok(accounting::select_active_weekly(&candidates, date).cloned())
    }

    async fn list_weekly_periods(&self, allowance_period_id: Option<&Uuid>, user_id: &Uuid) -> Result<Vec<WeeklyPeriod>, AppError> {
        let mut periods: Vec<WeeklyPeriod> = self
            .state()
            .weekly_periods
            .iter()
            .filter(|p| p.user_id == *user_id && allowance_period_id.is_none_or(|id| p.allowance_period_id == Some(*id)))
            .cloned()
            .collect();
        periods.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.created_at.cmp(&a.created_at)));
        Ok(periods)
    }

    async fn get_weekly_period(&self, id: &Uuid, user_id: &Uuid) -> Result<Option<WeeklyPeriod>, AppError> {
        Ok(self.state().weekly_period(id, user_id).cloned())
    }

    async fn insert_weekly_period(&self, period: &NewWeeklyPeriod, user_id: &Uuid) -> Result<WeeklyPeriod, AppError> {
        let mut state = self.state();
        let existing: Vec<WeeklyPeriod> = state.weekly_periods.iter().filter(|p| p.user_id == *user_id).cloned().collect();
        accounting::ensure_no_overlap(&existing, period)?;

        let created = WeeklyPeriod {
            id: Uuid::new_v4(),
            user_id: *user_id,
            allowance_period_id: period.allowance_period_id,
            period_name: period.period_name.clone(),
            start_date: period.start_date,
            end_date: period.end_date,
            weekly_limit: period.weekly_limit,
            created_at: Utc::now(),
        };
        state.weekly_periods.push(created.clone());
        Ok(created)
    }

    async fn update_weekly_period(&self, id: &Uuid, patch: &WeeklyPeriodPatch, user_id: &Uuid) -> Result<WeeklyPeriod, AppError> {
        let mut state = self.state();
        let period = state
            .weekly_periods
            .iter_mut()
            .find(|p| p.id == *id && p.user_id == *user_id)
            .ok_or_else(|| AppError::NotFound("Weekly period not found".to_string()))?;
        if let Some(name) = &patch.period_name {
            period.period_name = name.clone();
        }
        if let Some(limit) = patch.weekly_limit {
            period.weekly_limit = limit;
        }
        Ok(period.clone())
    }

    async fn delete_weekly_period(&self, id: &Uuid, user_id: &Uuid) -> Result<u64, AppError> {
        let mut state = self.state();
        if state.weekly_period(id, user_id).is_none() {
            return Err(AppError::NotFound("Weekly period not found".to_string()));
        }

        let before = state.expenses.len();
        state.expenses.retain(|e| e.weekly_period_id != Some(*id));
        let deleted = (before - state.expenses.len()) as u64;
        state.weekly_periods.retain(|p| p.id != *id);
        Ok(deleted)
    }
}

#[async_trait::async_trait]
impl ExpenseRepository for MockRepository {
    async fn sum_expenses(&self, filter: &ExpenseFilter, user_id: &Uuid) -> Result<i64, AppError> {
        Ok(self.state().sum(filter, user_id))
    }

    async fn list_expenses(&self, filter: &ExpenseFilter, user_id: &Uuid) -> Result<Vec<Expense>, AppError> {
        let mut expenses: Vec<Expense> = self
            .state()
            .expenses
            .iter()
            .filter(|e| e.user_id == *user_id && filter.matches(e))
            .cloned()
            .collect();
        expenses.sort_by(|a, b| b.date.cmp(&a.date).then(b.created_at.cmp(&a.created_at)));
        Ok(expenses)
    }

    async fn record_expense(&self, expense: &NewExpense, weekly_spend_mode: WeeklySpendMode, user_id: &Uuid) -> Result<Expense, AppError> {
        let mut state = self.state();
        let allowance = state.allowance_period(&expense.allowance_period_id, user_id).cloned();

        let usage = match &expense.weekly_period_id {
            Some(weekly_period_id) => {
                let period = state
                    .weekly_period(weekly_period_id, user_id)
                    .ok_or_else(|| AppError::NotFound("Weekly period not found".to_string()))?;
                let spent = state.sum(&accounting::weekly_spend_filter(period, weekly_spend_mode), user_id);
                Some(WeeklyUsage::of(period, spent))
            }
            None => None,
        };
        accounting::admit_expense(expense.amount, usage.as_ref(), allowance.as_ref())?;

        let recorded = Expense {
            id: Uuid::new_v4(),
            user_id: *user_id,
            weekly_period_id: expense.weekly_period_id,
            allowance_period_id: expense.allowance_period_id,
            date: expense.date,
            description: expense.description.clone(),
            amount: expense.amount,
            created_at: Utc::now(),
        };
        state.expenses.push(recorded.clone());

        if let Some(period) = state.allowance_periods.iter_mut().find(|p| p.id == expense.allowance_period_id) {
            *period = accounting::apply_patch(period, &accounting::deduct_patch(period, expense.amount));
        }

        Ok(recorded)
    }
}
