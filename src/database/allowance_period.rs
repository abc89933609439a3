use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::allowance_period::{AllowancePeriod, AllowancePeriodPatch, NewAllowancePeriod};
use chrono::NaiveDate;
use sqlx::PgConnection;
use uuid::Uuid;

#[async_trait::async_trait]
pub trait AllowancePeriodRepository {
    /// The period the user is spending from, as designated in `allowance_state`.
    async fn get_current_allowance_period(&self, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError>;
    async fn get_allowance_period(&self, id: &Uuid, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError>;
    async fn find_allowance_period_by_start(&self, period_start: NaiveDate, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError>;
    async fn list_allowance_periods(&self, user_id: &Uuid) -> Result<Vec<AllowancePeriod>, AppError>;
    /// Inserts the period and makes it current. Returns `None` when a period with
    /// the same start already exists for the user.
    async fn insert_allowance_period(&self, period: &NewAllowancePeriod, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError>;
    /// Applies the patch only if the stored version still equals `patch.expected_version`.
    async fn update_allowance_period(&self, id: &Uuid, patch: &AllowancePeriodPatch, user_id: &Uuid) -> Result<AllowancePeriod, AppError>;
    async fn set_current_allowance_period(&self, id: &Uuid, user_id: &Uuid) -> Result<AllowancePeriod, AppError>;
}

const ALLOWANCE_PERIOD_COLUMNS: &str = "id, user_id, period_start, period_end, total_amount, remaining_amount, version, created_at";

pub(crate) async fn lock_allowance_period(conn: &mut PgConnection, id: &Uuid, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
    let query = format!(
        "SELECT {} FROM allowance_period WHERE id = $1 AND user_id = $2 FOR UPDATE",
        ALLOWANCE_PERIOD_COLUMNS
    );
    let period = sqlx::query_as::<_, AllowancePeriod>(&query)
        .bind(id)
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(period)
}

pub(crate) async fn deduct_remaining(conn: &mut PgConnection, id: &Uuid, amount: i64) -> Result<AllowancePeriod, AppError> {
    let query = format!(
        r#"
        UPDATE allowance_period
        SET remaining_amount = remaining_amount - $1, version = version + 1
        WHERE id = $2
        RETURNING {}
        "#,
        ALLOWANCE_PERIOD_COLUMNS
    );
    let period = sqlx::query_as::<_, AllowancePeriod>(&query)
        .bind(amount)
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;

    Ok(period)
}

async fn mark_current(conn: &mut PgConnection, id: &Uuid, user_id: &Uuid) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO allowance_state (user_id, current_allowance_period_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE
        SET current_allowance_period_id = EXCLUDED.current_allowance_period_id,
            updated_at = now()
        "#,
    )
    .bind(user_id)
    .bind(id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

#[async_trait::async_trait]
impl AllowancePeriodRepository for PostgresRepository {
    async fn get_current_allowance_period(&self, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
        let period = sqlx::query_as::<_, AllowancePeriod>(
            r#"
            SELECT ap.id, ap.user_id, ap.period_start, ap.period_end, ap.total_amount,
                   ap.remaining_amount, ap.version, ap.created_at
            FROM allowance_state s
            JOIN allowance_period ap ON ap.id = s.current_allowance_period_id
            WHERE s.user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(period)
    }

    async fn get_allowance_period(&self, id: &Uuid, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
        let query = format!("SELECT {} FROM allowance_period WHERE id = $1 AND user_id = $2", ALLOWANCE_PERIOD_COLUMNS);
        let period = sqlx::query_as::<_, AllowancePeriod>(&query)
            .bind(id)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(period)
    }

    async fn find_allowance_period_by_start(&self, period_start: NaiveDate, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
        let query = format!(
            "SELECT {} FROM allowance_period WHERE user_id = $1 AND period_start = $2",
            ALLOWANCE_PERIOD_COLUMNS
        );
        let period = sqlx::query_as::<_, AllowancePeriod>(&query)
            .bind(user_id)
            .bind(period_start)
            .fetch_optional(&self.pool)
            .await?;

        Ok(period)
    }

    async fn list_allowance_periods(&self, user_id: &Uuid) -> Result<Vec<AllowancePeriod>, AppError> {
        let query = format!(
            "SELECT {} FROM allowance_period WHERE user_id = $1 ORDER BY period_start DESC",
            ALLOWANCE_PERIOD_COLUMNS
        );
        let periods = sqlx::query_as::<_, AllowancePeriod>(&query).bind(user_id).fetch_all(&self.pool).await?;

        Ok(periods)
    }

    async fn insert_allowance_period(&self, period: &NewAllowancePeriod, user_id: &Uuid) -> Result<Option<AllowancePeriod>, AppError> {
        let mut tx = self.pool.begin().await?;

        let query = format!(
            r#"
            INSERT INTO allowance_period (user_id, period_start, period_end, total_amount, remaining_amount)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (user_id, period_start) DO NOTHING
            RETURNING {}
            "#,
            ALLOWANCE_PERIOD_COLUMNS
        );
        let inserted = sqlx::query_as::<_, AllowancePeriod>(&query)
            .bind(user_id)
            .bind(period.period_start)
            .bind(period.period_end)
            .bind(period.total_amount)
            .fetch_optional(&mut *tx)
            .await?;

        if let Some(inserted) = &inserted {
            mark_current(&mut tx, &inserted.id, user_id).await?;
        }

        tx.commit().await?;

        Ok(inserted)
    }

    async fn update_allowance_period(&self, id: &Uuid, patch: &AllowancePeriodPatch, user_id: &Uuid) -> Result<AllowancePeriod, AppError> {
        let query = format!(
            r#"
            UPDATE allowance_period
            SET total_amount = COALESCE($1, total_amount),
                remaining_amount = COALESCE($2, remaining_amount),
                version = version + 1
            WHERE id = $3 AND user_id = $4 AND version = $5
            RETURNING {}
            "#,
            ALLOWANCE_PERIOD_COLUMNS
        );
        let updated = sqlx::query_as::<_, AllowancePeriod>(&query)
            .bind(patch.total_amount)
            .bind(patch.remaining_amount)
            .bind(id)
            .bind(user_id)
            .bind(patch.expected_version)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(period) => Ok(period),
            None => match self.get_allowance_period(id, user_id).await? {
                Some(_) => Err(AppError::ConcurrentModification),
                None => Err(AppError::NotFound("Allowance period not found".to_string())),
            },
        }
    }

    async fn set_current_allowance_period(&self, id: &Uuid, user_id: &Uuid) -> Result<AllowancePeriod, AppError> {
        let mut tx = self.pool.begin().await?;

        let period = lock_allowance_period(&mut tx, id, user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Allowance period not found".to_string()))?;
        mark_current(&mut tx, id, user_id).await?;

        tx.commit().await?;

        Ok(period)
    }
}

impl PostgresRepository {
    pub async fn list_user_ids(&self) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM users ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }
}
