use crate::application::{
    AccountService, Executor, QuotaTracker, Scheduler, SchedulerDeps, SchedulerSettings,
};
use crate::infrastructure::{
    AppConfig, CredentialVault, HttpExecutor, PostgresAccountRepository, PostgresActionRepository,
    PostgresCampaignRepository, PostgresLimitsRepository, PostgresQuotaRepository,
};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub scheduler: Arc<Scheduler>,
    pub accounts: Arc<AccountService>,
    pub api_token: String,
}

/// Build full state from config + an existing pool, and start the scheduler.
///
/// Intended for embedding into a larger service that already manages a `PgPool`.
pub async fn build_state_with_pool(
    config: AppConfig,
    pool: PgPool,
    run_migrations: bool,
) -> anyhow::Result<AppState> {
    if run_migrations {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;
    }

    let vault = Arc::new(CredentialVault::new(&config.encryption_key).context("init vault")?);
    let executor: Arc<dyn Executor> = Arc::new(
        HttpExecutor::new(&config.executor_base_url, &config.executor_token)
            .context("init executor client")?,
    );

    let account_repo = Arc::new(PostgresAccountRepository::new(pool.clone()));
    let quota_repo = Arc::new(PostgresQuotaRepository::new(pool.clone()));
    let limits_repo = Arc::new(PostgresLimitsRepository::new(pool.clone()));

    let settings = SchedulerSettings::from_config(&config);
    let default_timezone = settings.default_timezone;

    let scheduler = Arc::new(Scheduler::new(
        SchedulerDeps {
            accounts: account_repo.clone(),
            campaigns: Arc::new(PostgresCampaignRepository::new(pool.clone())),
            actions: Arc::new(PostgresActionRepository::new(pool.clone())),
            quotas: quota_repo.clone(),
            limits: limits_repo.clone(),
            executor,
            vault: vault.clone(),
        },
        settings,
    ));
    scheduler.start().await.context("start scheduler")?;

    let accounts = Arc::new(AccountService::new(
        account_repo,
        limits_repo,
        QuotaTracker::new(quota_repo),
        vault,
        default_timezone,
    ));

    Ok(AppState {
        pool,
        scheduler,
        accounts,
        api_token: config.api_token,
    })
}

/// Build state for the standalone server.
///
/// Creates the `PgPool`, runs migrations, and wires repositories/services.
pub async fn build_state_from_env(config: AppConfig) -> anyhow::Result<AppState> {
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .context("connect database")?;
    build_state_with_pool(config, pool, true).await
}
