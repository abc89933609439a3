use crate::database::postgres_repository::PostgresRepository;
use crate::error::app_error::AppError;
use crate::models::session::{Session, SessionUser};
use chrono::{DateTime, Utc};
use uuid::Uuid;

impl PostgresRepository {
    /// Opens a session for the user, dropping any of their sessions that have already expired.
    pub async fn create_session(&self, user_id: &Uuid, expires_at: DateTime<Utc>) -> Result<Session, AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_session WHERE user_id = $1 AND expires_at <= now()")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO user_session (user_id, expires_at)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(expires_at)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(session)
    }

    pub async fn get_active_session_user(&self, session_id: &Uuid, user_id: &Uuid) -> Result<Option<SessionUser>, AppError> {
        let user = sqlx::query_as::<_, SessionUser>(
            r#"
            SELECT u.id, u.name, u.email
            FROM user_session s
            JOIN users u ON u.id = s.user_id
            WHERE s.id = $1
              AND s.user_id = $2
              AND s.expires_at > now()
            "#,
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    pub async fn delete_session(&self, session_id: &Uuid, user_id: &Uuid) -> Result<(), AppError> {
        sqlx::query("DELETE FROM user_session WHERE id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Removes expired sessions for every user. Returns the number removed.
    pub async fn prune_expired_sessions(&self) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM user_session WHERE expires_at <= now()")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
