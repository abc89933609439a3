use crate::config::WeeklySpendMode;
use crate::database::allowance_period::{deduct_remaining, lock_allowance_period};
use crate::database::postgres_repository::PostgresRepository;
use crate::database::weekly_period::lock_weekly_period;
use crate::error::app_error::AppError;
use crate::models::expense::{Expense, ExpenseFilter, NewExpense};
use crate::service::accounting::{self, WeeklyUsage};
use sqlx::PgConnection;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait ExpenseRepository {
    async fn sum_expenses(&self, filter: &ExpenseFilter, user_id: &Uuid) -> Result<i64, AppError>;
    async fn list_expenses(&self, filter: &ExpenseFilter, user_id: &Uuid) -> Result<Vec<Expense>, AppError>;
    /// Re-runs the admission checks against locked rows, then inserts the expense
    /// and deducts it from its allowance period in one transaction.
    async fn record_expense(&self, expense: &NewExpense, weekly_spend_mode: WeeklySpendMode, user_id: &Uuid) -> Result<Expense, AppError>;
}

const EXPENSE_COLUMNS: &str = "id, user_id, weekly_period_id, allowance_period_id, date, description, amount, created_at";

fn filter_clause(filter: &ExpenseFilter) -> &'static str {
    match filter {
        ExpenseFilter::WeeklyPeriod(_) => "weekly_period_id = $2",
        ExpenseFilter::AllowancePeriod(_) => "allowance_period_id = $2",
        ExpenseFilter::DateRange { .. } => "date >= $2 AND date <= $3",
    }
}

async fn sum_expenses_in(conn: &mut PgConnection, filter: &ExpenseFilter, user_id: &Uuid) -> Result<i64, AppError> {
    let query = format!(
        "SELECT COALESCE(SUM(amount), 0)::INT8 FROM expense WHERE user_id = $1 AND {}",
        filter_clause(filter)
    );
    let query = sqlx::query_scalar::<_, i64>(&query).bind(user_id);
    let query = match filter {
        ExpenseFilter::WeeklyPeriod(id) | ExpenseFilter::AllowancePeriod(id) => query.bind(*id),
        ExpenseFilter::DateRange { start, end } => query.bind(*start).bind(*end),
    };

    Ok(query.fetch_one(&mut *conn).await?)
}

pub(crate) async fn delete_expenses_by_weekly_period(conn: &mut PgConnection, weekly_period_id: &Uuid) -> Result<u64, AppError> {
    let result = sqlx::query("DELETE FROM expense WHERE weekly_period_id = $1")
        .bind(weekly_period_id)
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected())
}

#[async_trait::async_trait]
impl ExpenseRepository for PostgresRepository {
    async fn sum_expenses(&self, filter: &ExpenseFilter, user_id: &Uuid) -> Result<i64, AppError> {
        let mut conn = self.pool.acquire().await?;
        sum_expenses_in(&mut conn, filter, user_id).await
    }

    async fn list_expenses(&self, filter: &ExpenseFilter, user_id: &Uuid) -> Result<Vec<Expense>, AppError> {
        let query = format!(
            "SELECT {} FROM expense WHERE user_id = $1 AND {} ORDER BY date DESC, created_at DESC",
            EXPENSE_COLUMNS,
            filter_clause(filter)
        );
        let query = sqlx::query_as::<_, Expense>(&query).bind(user_id);
        let query = match filter {
            ExpenseFilter::WeeklyPeriod(id) | ExpenseFilter::AllowancePeriod(id) => query.bind(*id),
            ExpenseFilter::DateRange { start, end } => query.bind(*start).bind(*end),
        };

        Ok(query.fetch_all(&self.pool).await?)
    }

    async fn record_expense(&self, expense: &NewExpense, weekly_spend_mode: WeeklySpendMode, user_id: &Uuid) -> Result<Expense, AppError> {
        let mut tx = self.pool.begin().await?;

        // Lock order: allowance period, then weekly period.
        let allowance = lock_allowance_period(&mut tx, &expense.allowance_period_id, user_id).await?;

        let usage = match &expense.weekly_period_id {
            Some(weekly_period_id) => {
                let period = lock_weekly_period(&mut tx, weekly_period_id, user_id)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Weekly period not found".to_string()))?;
                let filter = accounting::weekly_spend_filter(&period, weekly_spend_mode);
                let spent = sum_expenses_in(&mut tx, &filter, user_id).await?;
                Some(WeeklyUsage::of(&period, spent))
            }
            None => None,
        };

        accounting::admit_expense(expense.amount, usage.as_ref(), allowance.as_ref())?;

        let query = format!(
            r#"
            INSERT INTO expense (user_id, weekly_period_id, allowance_period_id, date, description, amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            EXPENSE_COLUMNS
        );
        let recorded = sqlx::query_as::<_, Expense>(&query)
            .bind(user_id)
            .bind(expense.weekly_period_id)
            .bind(expense.allowance_period_id)
            .bind(expense.date)
            .bind(&expense.description)
            .bind(expense.amount)
            .fetch_one(&mut *tx)
            .await?;

        deduct_remaining(&mut tx, &expense.allowance_period_id, expense.amount).await?;

        tx.commit().await?;

        Ok(recorded)
    }
}
