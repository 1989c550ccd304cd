use super::campaigns::{expand, CampaignRequest};
use super::executor::Executor;
use super::lane::{AccountLane, LaneContext, LaneExit};
use super::limits::LimitsResolver;
use super::quota::QuotaTracker;
use crate::domain::{Account, AccountStatus, Action, Campaign, CampaignStatus};
use crate::infrastructure::{
    AccountRepository, ActionRepository, AppConfig, CampaignRepository, CredentialVault,
    LimitsRepository, QuotaRepository, RepositoryError,
};
use chrono::Utc;
use chrono_tz::Tz;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, Mutex, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Persistence unavailable: {0}")]
    PersistenceUnavailable(String),
    #[error("Campaign not found: {0}")]
    CampaignNotFound(Uuid),
    #[error("Account not found: {0}")]
    AccountNotFound(Uuid),
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub global_concurrency: usize,
    /// In-flight actions without a heartbeat for this long are abandoned.
    pub in_flight_timeout: Duration,
    pub heartbeat_interval: Duration,
    pub maintenance_interval: Duration,
    pub rate_limit_cooldown: Duration,
    pub default_timezone: Tz,
    /// Fixes the jitter sequence; `None` seeds from entropy.
    pub jitter_seed: Option<u64>,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            global_concurrency: 32,
            in_flight_timeout: Duration::from_secs(300),
            heartbeat_interval: Duration::from_secs(15),
            maintenance_interval: Duration::from_secs(30),
            rate_limit_cooldown: Duration::from_secs(3600),
            default_timezone: Tz::UTC,
            jitter_seed: None,
        }
    }
}

impl SchedulerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let default_timezone = config.default_timezone.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                timezone = %config.default_timezone,
                "Unknown default timezone, falling back to UTC"
            );
            Tz::UTC
        });

        Self {
            global_concurrency: config.global_concurrency.max(1),
            in_flight_timeout: Duration::from_secs(config.in_flight_timeout_s),
            heartbeat_interval: Duration::from_secs(config.heartbeat_interval_s.max(1)),
            maintenance_interval: Duration::from_secs(config.maintenance_interval_s.max(1)),
            rate_limit_cooldown: Duration::from_secs(config.rate_limit_cooldown_s),
            default_timezone,
            jitter_seed: None,
        }
    }
}

/// Collaborators the scheduler is built from.
pub struct SchedulerDeps {
    pub accounts: Arc<dyn AccountRepository>,
    pub campaigns: Arc<dyn CampaignRepository>,
    pub actions: Arc<dyn ActionRepository>,
    pub quotas: Arc<dyn QuotaRepository>,
    pub limits: Arc<dyn LimitsRepository>,
    pub executor: Arc<dyn Executor>,
    pub vault: Arc<CredentialVault>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub recovered: usize,
    pub released: usize,
    pub lanes_ensured: usize,
}

struct LaneHandle {
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

#[derive(Default)]
struct LaneRegistry {
    lanes: HashMap<Uuid, LaneHandle>,
    /// Last dispatch per account, carried across lane restarts for pacing.
    last_dispatch: HashMap<Uuid, Instant>,
}

/// Lane bookkeeping shared between the scheduler, its lanes and the
/// maintenance loop. All lane starts go through `ensure_lane`.
#[derive(Clone)]
struct LanePool {
    ctx: Arc<LaneContext>,
    registry: Arc<Mutex<LaneRegistry>>,
    shutdown: watch::Receiver<bool>,
}

impl LanePool {
    async fn ensure_lane(&self, account_id: Uuid) {
        if *self.shutdown.borrow() {
            return;
        }

        let mut registry = self.registry.lock().await;
        if let Some(handle) = registry.lanes.get(&account_id) {
            if !handle.task.is_finished() {
                handle.wake.notify_one();
                return;
            }
        }

        let wake = Arc::new(Notify::new());
        let lane = AccountLane::new(
            account_id,
            self.ctx.clone(),
            wake.clone(),
            self.shutdown.clone(),
            registry.last_dispatch.get(&account_id).copied(),
        );
        let pool = self.clone();
        let task = tokio::spawn(async move { pool.drive(lane).await });

        registry.lanes.insert(account_id, LaneHandle { wake, task });
        info!(%account_id, "Started account lane");
    }

    async fn drive(self, mut lane: AccountLane) {
        let account_id = lane.account_id();

        loop {
            let result = lane.run().await;
            let mut registry = self.registry.lock().await;

            match result {
                Ok(LaneExit::Drained) => {
                    // Work may have been enqueued between the lane's last look
                    // and taking the lock; ensure_lane would have seen us alive.
                    if let Ok(Some(_)) = self.ctx.actions.next_wakeup(account_id).await {
                        drop(registry);
                        continue;
                    }
                    info!(%account_id, "Account lane drained");
                }
                Ok(exit) => info!(%account_id, ?exit, "Account lane stopped"),
                Err(e) => error!(%account_id, "Account lane failed: {}", e),
            }

            registry.lanes.remove(&account_id);
            if let Some(at) = lane.state().last_dispatch_at {
                registry.last_dispatch.insert(account_id, at);
            }
            return;
        }
    }

    async fn run_maintenance(&self) -> Result<MaintenanceReport, RepositoryError> {
        let now = Utc::now();
        let stale = chrono::Duration::from_std(self.ctx.settings.in_flight_timeout)
            .unwrap_or_else(|_| chrono::Duration::minutes(5));

        let recovered = self.ctx.actions.recover_abandoned(now - stale).await?;
        for action in &recovered {
            warn!(
                action_id = %action.id,
                account_id = %action.account_id,
                attempt_count = action.attempt_count,
                "Recovered abandoned in-flight action"
            );
        }

        let released = self.ctx.accounts.release_cooldowns(now).await?;
        for account_id in &released {
            info!(%account_id, "Rate-limit cool-down elapsed, account reactivated");
        }

        let with_work = self.ctx.actions.accounts_with_work().await?;
        for account_id in &with_work {
            self.ensure_lane(*account_id).await;
        }

        Ok(MaintenanceReport {
            recovered: recovered.len(),
            released: released.len(),
            lanes_ensured: with_work.len(),
        })
    }
}

/// Owns the account lanes and the campaign lifecycle.
pub struct Scheduler {
    pool: LanePool,
    accounts: Arc<dyn AccountRepository>,
    campaigns: Arc<dyn CampaignRepository>,
    shutdown_tx: watch::Sender<bool>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(deps: SchedulerDeps, settings: SchedulerSettings) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = Arc::new(LaneContext {
            accounts: deps.accounts.clone(),
            actions: deps.actions,
            quota: QuotaTracker::new(deps.quotas),
            limits: LimitsResolver::new(deps.limits),
            executor: deps.executor,
            vault: deps.vault,
            permits: Arc::new(Semaphore::new(settings.global_concurrency.max(1))),
            settings,
        });

        Self {
            pool: LanePool {
                ctx,
                registry: Arc::new(Mutex::new(LaneRegistry::default())),
                shutdown: shutdown_rx,
            },
            accounts: deps.accounts,
            campaigns: deps.campaigns,
            shutdown_tx,
            maintenance: Mutex::new(None),
        }
    }

    /// Verify the store, recover from any previous run and start the
    /// maintenance loop. Refuses to run lanes without a healthy store.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        self.pool
            .ctx
            .actions
            .ping()
            .await
            .map_err(|e| SchedulerError::PersistenceUnavailable(e.to_string()))?;

        let report = self.pool.run_maintenance().await?;
        info!(
            recovered = report.recovered,
            released = report.released,
            lanes = report.lanes_ensured,
            "Scheduler started"
        );

        let pool = self.pool.clone();
        let mut shutdown = self.pool.shutdown.clone();
        let period = self.pool.ctx.settings.maintenance_interval;
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                // The watch guard must not live across the maintenance await.
                let stopped = async {
                    let _ = shutdown.wait_for(|stop| *stop).await;
                };
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = pool.run_maintenance().await {
                            error!("Maintenance pass failed: {}", e);
                        }
                    }
                    _ = stopped => break,
                }
            }
        });

        *self.maintenance.lock().await = Some(task);
        Ok(())
    }

    /// One maintenance pass: recover abandoned actions, lift elapsed
    /// cool-downs, make sure every account with work has a lane.
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, SchedulerError> {
        Ok(self.pool.run_maintenance().await?)
    }

    pub async fn submit_campaign(
        &self,
        tenant_id: Uuid,
        request: CampaignRequest,
    ) -> Result<Campaign, SchedulerError> {
        let batch = request.validate().map_err(SchedulerError::Validation)?;

        let mut owned: Vec<Account> = Vec::with_capacity(batch.account_ids.len());
        for account_id in &batch.account_ids {
            match self.accounts.get_by_id(*account_id).await {
                Ok(account) if account.tenant_id == tenant_id => owned.push(account),
                Ok(_) | Err(RepositoryError::NotFound(_)) => {
                    return Err(SchedulerError::Validation(format!(
                        "unknown account {}",
                        account_id
                    )))
                }
                Err(e) => return Err(e.into()),
            }
        }

        let eligible: Vec<Uuid> = owned
            .iter()
            .filter(|a| a.accepts_work())
            .map(|a| a.id)
            .collect();
        if eligible.is_empty() {
            return Err(SchedulerError::Validation(
                "no eligible accounts: every selected account is disabled".to_string(),
            ));
        }

        let (mut campaign, actions) = expand(tenant_id, &batch, &eligible, Utc::now());
        self.campaigns.create_with_actions(&campaign, &actions).await?;
        self.campaigns
            .transition(campaign.id, &[CampaignStatus::Pending], CampaignStatus::Running)
            .await?;
        campaign.status = CampaignStatus::Running;

        info!(
            campaign_id = %campaign.id,
            %tenant_id,
            action_type = %campaign.action_type,
            total = campaign.total,
            accounts = eligible.len(),
            "Campaign submitted"
        );

        for account in owned.iter().filter(|a| a.status == AccountStatus::Active) {
            self.pool.ensure_lane(account.id).await;
        }

        Ok(campaign)
    }

    /// Cancel every not-yet-dispatched action. In-flight actions finish
    /// normally and still count towards `sent`/`failed`.
    pub async fn cancel_campaign(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Campaign, SchedulerError> {
        let campaign = self.get_campaign(tenant_id, campaign_id).await?;
        if campaign.status.is_terminal() {
            return Err(SchedulerError::InvalidState(format!(
                "campaign is already {}",
                campaign.status
            )));
        }

        let cancelled = self.campaigns.cancel(campaign_id, Utc::now()).await?;
        info!(%campaign_id, cancelled, "Campaign cancelled");

        self.get_campaign(tenant_id, campaign_id).await
    }

    pub async fn pause_campaign(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Campaign, SchedulerError> {
        let campaign = self.get_campaign(tenant_id, campaign_id).await?;
        let paused = self
            .campaigns
            .transition(
                campaign_id,
                &[CampaignStatus::Pending, CampaignStatus::Running],
                CampaignStatus::Paused,
            )
            .await?;
        if !paused {
            return Err(SchedulerError::InvalidState(format!(
                "cannot pause a {} campaign",
                campaign.status
            )));
        }

        info!(%campaign_id, "Campaign paused");
        self.get_campaign(tenant_id, campaign_id).await
    }

    pub async fn resume_campaign(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Campaign, SchedulerError> {
        let campaign = self.get_campaign(tenant_id, campaign_id).await?;
        let resumed = self
            .campaigns
            .transition(campaign_id, &[CampaignStatus::Paused], CampaignStatus::Running)
            .await?;
        if !resumed {
            return Err(SchedulerError::InvalidState(format!(
                "cannot resume a {} campaign",
                campaign.status
            )));
        }

        info!(%campaign_id, "Campaign resumed");
        let accounts: HashSet<Uuid> = campaign.account_ids.iter().copied().collect();
        for account_id in accounts {
            self.pool.ensure_lane(account_id).await;
        }

        self.get_campaign(tenant_id, campaign_id).await
    }

    pub async fn get_campaign(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
    ) -> Result<Campaign, SchedulerError> {
        match self.campaigns.get_by_id(campaign_id).await {
            Ok(campaign) if campaign.tenant_id == tenant_id => Ok(campaign),
            Ok(_) | Err(RepositoryError::NotFound(_)) => {
                Err(SchedulerError::CampaignNotFound(campaign_id))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_campaigns(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, SchedulerError> {
        Ok(self
            .campaigns
            .list_by_tenant(tenant_id, limit, offset)
            .await?)
    }

    pub async fn list_campaign_actions(
        &self,
        tenant_id: Uuid,
        campaign_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Action>, SchedulerError> {
        self.get_campaign(tenant_id, campaign_id).await?;
        Ok(self
            .pool
            .ctx
            .actions
            .list_by_campaign(campaign_id, limit, offset)
            .await?)
    }

    /// Operator override of an account's status. Reactivating starts its lane;
    /// `rate_limited` is only ever set by the platform signal.
    pub async fn set_account_status(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        status: AccountStatus,
    ) -> Result<Account, SchedulerError> {
        if status == AccountStatus::RateLimited {
            return Err(SchedulerError::Validation(
                "rate_limited is set by the platform, not by operators".to_string(),
            ));
        }

        let account = match self.accounts.get_by_id(account_id).await {
            Ok(account) if account.tenant_id == tenant_id => account,
            Ok(_) | Err(RepositoryError::NotFound(_)) => {
                return Err(SchedulerError::AccountNotFound(account_id))
            }
            Err(e) => return Err(e.into()),
        };

        self.accounts.update_status(account.id, status, None).await?;
        info!(%account_id, from = %account.status, to = %status, "Account status changed");

        if status == AccountStatus::Active {
            self.pool.ensure_lane(account_id).await;
        } else if let Some(handle) = self.pool.registry.lock().await.lanes.get(&account_id) {
            // let an idle lane notice the change now
            handle.wake.notify_one();
        }

        Ok(Account {
            status,
            rate_limited_until: None,
            ..account
        })
    }

    /// Accounts that currently have a running lane.
    pub async fn active_lanes(&self) -> Vec<Uuid> {
        let registry = self.pool.registry.lock().await;
        registry
            .lanes
            .iter()
            .filter(|(_, handle)| !handle.task.is_finished())
            .map(|(id, _)| *id)
            .collect()
    }

    /// Stop dispatching and wait for every lane to exit. Calls already
    /// in progress run to completion first.
    pub async fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            warn!("Scheduler shutdown signal had no listeners");
        }

        let handles: Vec<(Uuid, LaneHandle)> =
            self.pool.registry.lock().await.lanes.drain().collect();
        for (account_id, handle) in handles {
            if let Err(e) = handle.task.await {
                error!(%account_id, "Account lane task panicked: {}", e);
            }
        }

        if let Some(task) = self.maintenance.lock().await.take() {
            let _ = task.await;
        }
        info!("Scheduler stopped");
    }
}
