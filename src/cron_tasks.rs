use crate::Config;
use crate::database::allowance_period::AllowancePeriodRepository;
use crate::database::expense::ExpenseRepository;
use crate::database::postgres_repository::PostgresRepository;
use crate::database::weekly_period::WeeklyPeriodRepository;
use crate::db::init_pool;
use crate::error::app_error::AppError;
use crate::models::allowance_period::PeriodCreationSummary;
use crate::service::budget::BudgetService;
use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

/// Ensures every listed user has an allowance period for `today`. A failure for
/// one user is logged and does not stop the others.
pub async fn ensure_periods_for_users<R>(repo: &R, user_ids: &[Uuid], today: NaiveDate, config: &Config) -> PeriodCreationSummary
where
    R: AllowancePeriodRepository + WeeklyPeriodRepository + ExpenseRepository + Sync,
{
    let service = BudgetService::new(repo, config.budget.weekly_spend_mode);
    let mut summary = PeriodCreationSummary::default();

    for user_id in user_ids {
        summary.users_processed += 1;
        match service.ensure_allowance_period(today, config.budget.default_allowance_total, user_id).await {
            Ok((_, true)) => summary.periods_created += 1,
            Ok((_, false)) => {}
            Err(err) => warn!(user_id = %user_id, error = %err, "could not create allowance period"),
        }
    }

    info!(
        users_processed = summary.users_processed,
        periods_created = summary.periods_created,
        %today,
        "allowance period creation finished"
    );
    summary
}

pub async fn create_current_periods_with(repo: &PostgresRepository, config: &Config) -> Result<PeriodCreationSummary, AppError> {
    let user_ids = repo.list_user_ids().await?;
    Ok(ensure_periods_for_users(repo, &user_ids, config.budget.today(), config).await)
}

pub async fn create_current_periods(config: &Config) -> Result<PeriodCreationSummary, String> {
    let pool = init_pool(&config.database)
        .await
        .map_err(|err| format!("Failed to initialize database pool: {err}"))?;

    let repo = PostgresRepository { pool: pool.clone() };
    let result = create_current_periods_with(&repo, config)
        .await
        .map_err(|err| format!("Failed to create allowance periods: {err:?}"));

    pool.close().await;
    result
}

pub async fn prune_sessions(config: &Config) -> Result<u64, String> {
    let pool = init_pool(&config.database)
        .await
        .map_err(|err| format!("Failed to initialize database pool: {err}"))?;

    let repo = PostgresRepository { pool: pool.clone() };
    let result = repo
        .prune_expired_sessions()
        .await
        .map_err(|err| format!("Failed to prune sessions: {err:?}"));

    pool.close().await;
    result
}
