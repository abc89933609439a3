use crate::database::expense::delete_expenses_by_weekly_period;
use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::weekly_period::{NewWeeklyPeriod, WeeklyPeriod, WeeklyPeriodPatch};
use crate::service::accounting;
use chrono::NaiveDate;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait WeeklyPeriodRepository {
    /// Weekly period covering `date`, optionally restricted to one allowance period.
    /// Ties go to the latest start date, then the latest creation time.
    async fn find_weekly_period(&self, date: NaiveDate, allowance_period_id: Option<&Uuid>, user_id: &Uuid) -> Result<Option<WeeklyPeriod>, AppError>;
    async fn list_weekly_periods(&self, allowance_period_id: Option<&Uuid>, user_id: &Uuid) -> Result<Vec<WeeklyPeriod>, AppError>;
    async fn get_weekly_period(&self, id: &Uuid, user_id: &Uuid) -> Result<Option<WeeklyPeriod>, AppError>;
    /// Rejects the insert with `OverlappingPeriod` if another period in the same
    /// allowance group shares a date with it.
    async fn insert_weekly_period(&self, period: &NewWeeklyPeriod, user_id: &Uuid) -> Result<WeeklyPeriod, AppError>;
    async fn update_weekly_period(&self, id: &Uuid, patch: &WeeklyPeriodPatch, user_id: &Uuid) -> Result<WeeklyPeriod, AppError>;
    /// Deletes the period and its expenses, returning how many expenses went with it.
    async fn delete_weekly_period(&self, id: &Uuid, user_id: &Uuid) -> Result<u64, AppError>;
}

const WEEKLY_PERIOD_COLUMNS: &str = "id, user_id, allowance_period_id, period_name, start_date, end_date, weekly_limit, created_at";

pub(crate) async fn lock_weekly_period(conn: &mut sqlx::PgConnection, id: &Uuid, user_id: &Uuid) -> Result<Option<WeeklyPeriod>, AppError> {
    let query = format!(
        "SELECT {} FROM weekly_period WHERE id = $1 AND user_id = $2 FOR UPDATE",
        WEEKLY_PERIOD_COLUMNS
    );
    let period = sqlx::query_as::<_, WeeklyPeriod>(&query)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(period)
}

#[async_trait::async_trait]
impl WeeklyPeriodRepository for PostgresRepository {
    async fn find_weekly_period(&self, date: NaiveDate, allowance_period_id: Option<&Uuid>, user_id: &Uuid) -> Result<Option<WeeklyPeriod>, AppError> {
        let query = format!(
            r#"
            SELECT {}
            FROM weekly_period
            WHERE user_id = $1
              AND start_date <= $2
              AND end_date >= $2
              AND ($3::uuid IS NULL OR allowance_period_id = $3)
            ORDER BY start_date DESC, created_at DESC
            LIMIT 1
            "#,
            WEEKLY_PERIOD_COLUMNS
        );
        let period = sqlx::query_as::<_, WeeklyPeriod>(&query)
            .bind(user_id)
            .bind(date)
            .bind(allowance_period_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(period)
    }

    async fn list_weekly_periods(&self, allowance_period_id: Option<&Uuid>, user_id: &Uuid) -> Result<Vec<WeeklyPeriod>, AppError> {
        let query = format!(
            r#"
            SELECT {}
            FROM weekly_period
            WHERE user_id = $1
              AND ($2::uuid IS NULL OR allowance_period_id = $2)
            ORDER BY start_date DESC, created_at DESC
            "#,
            WEEKLY_PERIOD_COLUMNS
        );
        let periods = sqlx::query_as::<_, WeeklyPeriod>(&query)
            .bind(user_id)
            .bind(allowance_period_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(periods)
    }

    async fn get_weekly_period(&self, id: &Uuid, user_id: &Uuid) -> Result<Option<WeeklyPeriod>, AppError> {
        let query = format!("SELECT {} FROM weekly_period WHERE id = $1 AND user_id = $2", WEEKLY_PERIOD_COLUMNS);
        let period = sqlx::query_as::<_, WeeklyPeriod>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(period)
    }

    async fn insert_weekly_period(&self, period: &NewWeeklyPeriod, user_id: &Uuid) -> Result<WeeklyPeriod, AppError> {
        let mut tx = self.pool.begin().await?;

        // Serializes weekly period inserts per user so the overlap check below
        // sees every committed row.
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::UserNotFound)?;

        let query = format!(
            r#"
            SELECT {}
            FROM weekly_period
            WHERE user_id = $1
              AND allowance_period_id IS NOT DISTINCT FROM $2
              AND start_date <= $4
              AND end_date >= $3
            "#,
            WEEKLY_PERIOD_COLUMNS
        );
        let overlapping = sqlx::query_as::<_, WeeklyPeriod>(&query)
            .bind(user_id)
            .bind(period.allowance_period_id)
            .bind(period.start_date)
            .bind(period.end_date)
            .fetch_all(&mut *tx)
            .await?;
        accounting::ensure_no_overlap(&overlapping, period)?;

        let query = format!(
            r#"
            INSERT INTO weekly_period (user_id, allowance_period_id, period_name, start_date, end_date, weekly_limit)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {}
            "#,
            WEEKLY_PERIOD_COLUMNS
        );
        let inserted = sqlx::query_as::<_, WeeklyPeriod>(&query)
            .bind(user_id)
            .bind(period.allowance_period_id)
            .bind(&period.period_name)
            .bind(period.start_date)
            .bind(period.end_date)
            .bind(period.weekly_limit)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(inserted)
    }

    async fn update_weekly_period(&self, id: &Uuid, patch: &WeeklyPeriodPatch, user_id: &Uuid) -> Result<WeeklyPeriod, AppError> {
        let query = format!(
            r#"
            UPDATE weekly_period
            SET period_name = CASE WHEN $1 THEN $2 ELSE period_name END,
                weekly_limit = COALESCE($3, weekly_limit)
            WHERE id = $4 AND user_id = $5
            RETURNING {}
            "#,
            WEEKLY_PERIOD_COLUMNS
        );
        let period = sqlx::query_as::<_, WeeklyPeriod>(&query)
            .bind(patch.period_name.is_some())
            .bind(patch.period_name.clone().flatten())
            .bind(patch.weekly_limit)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        period.ok_or_else(|| AppError::NotFound("Weekly period not found".to_string()))
    }

    async fn delete_weekly_period(&self, id: &Uuid, user_id: &Uuid) -> Result<u64, AppError> {
        let mut tx = self.pool.begin().await?;

        lock_weekly_period(&mut tx, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Weekly period not found".to_string()))?;

        let deleted_expenses = delete_expenses_by_weekly_period(&mut tx, id).await?;

        sqlx::query("DELETE FROM weekly_period WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(deleted_expenses)
    }
}
