use super::executor::{AccountCredentials, ExecutionRequest, Executor, Outcome};
use super::jitter::{JitterPolicy, JitterProfile};
use super::limits::LimitsResolver;
use super::quota::QuotaTracker;
use super::scheduler::SchedulerSettings;
use crate::domain::{
    next_day_start, parse_timezone, quota_day, Account, AccountStatus, Action, ActionLimits,
    Resolution,
};
use crate::infrastructure::{AccountRepository, ActionRepository, CredentialVault, RepositoryError};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify, Semaphore};
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Upper bound on one idle wait, so status changes made behind the
/// scheduler's back are still noticed.
const MAX_IDLE: Duration = Duration::from_secs(60);

/// Everything a lane needs, shared by all lanes of one scheduler.
pub struct LaneContext {
    pub accounts: Arc<dyn AccountRepository>,
    pub actions: Arc<dyn ActionRepository>,
    pub quota: QuotaTracker,
    pub limits: LimitsResolver,
    pub executor: Arc<dyn Executor>,
    pub vault: Arc<CredentialVault>,
    /// Global cap on concurrent executor calls across all lanes.
    pub permits: Arc<Semaphore>,
    pub settings: SchedulerSettings,
}

/// Why a lane stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaneExit {
    Drained,
    AccountUnavailable(AccountStatus),
    RateLimited,
    Shutdown,
}

/// Runtime pacing state. Only `last_dispatch_at` outlives the lane; the rest
/// is rebuilt from the queue on restart.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountLaneState {
    pub last_dispatch_at: Option<Instant>,
    pub next_eligible_at: Option<Instant>,
    pub in_flight: bool,
}

/// Serial executor for one account: at most one action in flight, paced by
/// the jitter policy and gated by the daily quota.
pub struct AccountLane {
    account_id: Uuid,
    ctx: Arc<LaneContext>,
    jitter: JitterPolicy,
    wake: Arc<Notify>,
    shutdown: watch::Receiver<bool>,
    state: AccountLaneState,
}

impl AccountLane {
    pub fn new(
        account_id: Uuid,
        ctx: Arc<LaneContext>,
        wake: Arc<Notify>,
        shutdown: watch::Receiver<bool>,
        last_dispatch_at: Option<Instant>,
    ) -> Self {
        let jitter = match ctx.settings.jitter_seed {
            Some(seed) => JitterPolicy::with_seed(seed ^ account_id.as_u128() as u64),
            None => JitterPolicy::from_entropy(),
        };

        Self {
            account_id,
            ctx,
            jitter,
            wake,
            shutdown,
            state: AccountLaneState {
                last_dispatch_at,
                ..Default::default()
            },
        }
    }

    pub fn account_id(&self) -> Uuid {
        self.account_id
    }

    pub fn state(&self) -> AccountLaneState {
        self.state
    }

    /// Work the account's queue until it drains, the account stops accepting
    /// work, or the scheduler shuts down.
    pub async fn run(&mut self) -> Result<LaneExit, RepositoryError> {
        loop {
            if *self.shutdown.borrow() {
                return Ok(LaneExit::Shutdown);
            }

            let account = self.ctx.accounts.get_by_id(self.account_id).await?;
            if account.status != AccountStatus::Active {
                return Ok(LaneExit::AccountUnavailable(account.status));
            }

            match self.ctx.actions.next_ready(self.account_id, Utc::now()).await? {
                Some(action) => {
                    if let Some(exit) = self.dispatch(&account, action).await? {
                        return Ok(exit);
                    }
                }
                None => match self.ctx.actions.next_wakeup(self.account_id).await? {
                    None => return Ok(LaneExit::Drained),
                    Some(at) => {
                        let wait = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                        let wake = self.wake.clone();
                        let idle = async move {
                            tokio::select! {
                                _ = sleep(wait.min(MAX_IDLE)) => {}
                                _ = wake.notified() => {}
                            }
                        };
                        if or_shutdown(&mut self.shutdown, idle).await.is_none() {
                            return Ok(LaneExit::Shutdown);
                        }
                    }
                },
            }
        }
    }

    async fn dispatch(
        &mut self,
        account: &Account,
        action: Action,
    ) -> Result<Option<LaneExit>, RepositoryError> {
        let secret = match self.ctx.vault.open(&account.credentials_sealed) {
            Ok(secret) => secret,
            Err(e) => {
                error!(
                    account_id = %account.id,
                    "Cannot open account credentials, disabling account: {}", e
                );
                self.ctx
                    .accounts
                    .update_status(account.id, AccountStatus::Disabled, None)
                    .await?;
                return Ok(Some(LaneExit::AccountUnavailable(AccountStatus::Disabled)));
            }
        };

        let limits = self.ctx.limits.resolve(account, action.action_type).await?;

        if action.attempt_count >= limits.max_attempts {
            let reason = format!(
                "{} (gave up after {} attempts)",
                action.last_error.as_deref().unwrap_or("attempts exhausted"),
                action.attempt_count
            );
            self.ctx
                .actions
                .fail_waiting(action.id, &reason, Utc::now())
                .await?;
            warn!(action_id = %action.id, "Action exhausted its attempts before dispatch");
            return Ok(None);
        }

        let tz = self.timezone(account);
        let Some(mut day) = self.reserve_or_defer(&action, &limits, tz).await? else {
            return Ok(None);
        };

        // Pace against the previous dispatch on this account.
        let delay = self
            .jitter
            .next_delay(&JitterProfile::from_limits(&limits));
        let eligible_at = self.state.last_dispatch_at.map(|last| last + delay);
        self.state.next_eligible_at = eligible_at;
        if let Some(at) = eligible_at {
            if let Some(exit) = self.pace_until(at).await? {
                self.ctx.quota.refund(account.id, action.action_type, day).await;
                return Ok(Some(exit));
            }

            // The wait crossed local midnight: charge the new day instead.
            if let Some(today) = rolled_over(day, Utc::now(), tz) {
                self.ctx.quota.refund(account.id, action.action_type, day).await;
                match self.reserve_or_defer(&action, &limits, tz).await? {
                    Some(reserved) => day = reserved,
                    None => return Ok(None),
                }
                debug!(account_id = %account.id, %today, "Quota day rolled over while pacing");
            }
        }

        let permit = match or_shutdown(
            &mut self.shutdown,
            self.ctx.permits.clone().acquire_owned(),
        )
        .await
        {
            Some(Ok(permit)) => permit,
            _ => {
                self.ctx.quota.refund(account.id, action.action_type, day).await;
                return Ok(Some(LaneExit::Shutdown));
            }
        };

        // The account may have been disabled while we waited.
        if let Some(exit) = self.unavailable().await? {
            drop(permit);
            self.ctx.quota.refund(account.id, action.action_type, day).await;
            info!(
                account_id = %account.id,
                action_id = %action.id,
                "Account no longer active, stopping before dispatch"
            );
            return Ok(Some(exit));
        }

        // Cancelled, paused or already taken while we were waiting.
        if !self.ctx.actions.mark_in_flight(action.id, Utc::now()).await? {
            drop(permit);
            self.ctx.quota.refund(account.id, action.action_type, day).await;
            debug!(action_id = %action.id, "Action no longer dispatchable");
            return Ok(None);
        }

        let request = ExecutionRequest {
            action_id: action.id,
            platform: account.platform,
            action_type: action.action_type,
            payload: action.payload.clone(),
            credentials: AccountCredentials {
                account_id: account.id,
                handle: account.handle.clone(),
                secret,
                proxy: account.proxy.clone(),
            },
        };

        self.state.in_flight = true;
        let result = self
            .execute_with_heartbeat(action.id, request, limits.executor_timeout())
            .await;
        self.state.in_flight = false;
        self.state.last_dispatch_at = Some(Instant::now());
        drop(permit);

        self.record(account, &action, &limits, day, result).await
    }

    /// Reserve a quota unit for today in the account's timezone. When the
    /// day is used up the action is deferred to the next local midnight and
    /// `None` is returned.
    async fn reserve_or_defer(
        &self,
        action: &Action,
        limits: &ActionLimits,
        tz: Tz,
    ) -> Result<Option<NaiveDate>, RepositoryError> {
        let now = Utc::now();
        let day = quota_day(now, tz);
        let reservation = self
            .ctx
            .quota
            .try_reserve(self.account_id, action.action_type, day, limits.daily_max)
            .await?;

        if reservation.allowed {
            return Ok(Some(day));
        }

        let resume_at = next_day_start(now, tz);
        self.ctx.actions.defer_for_quota(action.id, resume_at).await?;
        info!(
            account_id = %self.account_id,
            action_id = %action.id,
            action_type = %action.action_type,
            %resume_at,
            "Daily quota reached, deferring action"
        );
        Ok(None)
    }

    /// Sleep until `at`. A wake-up re-reads the account so an operator
    /// disable cuts the wait short.
    async fn pace_until(&mut self, at: Instant) -> Result<Option<LaneExit>, RepositoryError> {
        loop {
            let wake = self.wake.clone();
            let pause = async move {
                tokio::select! {
                    _ = sleep_until(at) => true,
                    _ = wake.notified() => false,
                }
            };

            match or_shutdown(&mut self.shutdown, pause).await {
                None => return Ok(Some(LaneExit::Shutdown)),
                Some(true) => return Ok(None),
                Some(false) => {
                    if let Some(exit) = self.unavailable().await? {
                        return Ok(Some(exit));
                    }
                }
            }
        }
    }

    async fn unavailable(&self) -> Result<Option<LaneExit>, RepositoryError> {
        let account = self.ctx.accounts.get_by_id(self.account_id).await?;
        Ok((account.status != AccountStatus::Active)
            .then_some(LaneExit::AccountUnavailable(account.status)))
    }

    /// Runs the executor under the per-call timeout, refreshing the action's
    /// heartbeat meanwhile. `None` means the call timed out.
    async fn execute_with_heartbeat(
        &self,
        action_id: Uuid,
        request: ExecutionRequest,
        timeout: Duration,
    ) -> Option<Outcome> {
        let ctx = self.ctx.clone();
        let call = ctx.executor.execute(request);
        tokio::pin!(call);
        let deadline = sleep(timeout);
        tokio::pin!(deadline);

        let mut beat = interval(ctx.settings.heartbeat_interval.max(Duration::from_secs(1)));
        beat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        beat.tick().await;

        loop {
            tokio::select! {
                outcome = &mut call => return Some(outcome),
                _ = &mut deadline => return None,
                _ = beat.tick() => {
                    if let Err(e) = ctx.actions.heartbeat(action_id, Utc::now()).await {
                        warn!(%action_id, "Heartbeat failed: {}", e);
                    }
                }
            }
        }
    }

    async fn record(
        &self,
        account: &Account,
        action: &Action,
        limits: &ActionLimits,
        day: NaiveDate,
        result: Option<Outcome>,
    ) -> Result<Option<LaneExit>, RepositoryError> {
        let now = Utc::now();

        match result {
            Some(Outcome::Success) => {
                self.ctx
                    .actions
                    .mark_completed(action.id, &Resolution::Completed, now)
                    .await?;
                info!(
                    account_id = %account.id,
                    action_id = %action.id,
                    action_type = %action.action_type,
                    "Action completed"
                );
                Ok(None)
            }
            Some(Outcome::Failed(reason)) => {
                warn!(
                    account_id = %account.id,
                    action_id = %action.id,
                    target = %action.payload.target,
                    "Action failed: {}", reason
                );
                self.ctx
                    .actions
                    .mark_completed(action.id, &Resolution::Failed(reason), now)
                    .await?;
                Ok(None)
            }
            Some(Outcome::RateLimited) => {
                self.ctx
                    .actions
                    .requeue(action.id, now, Some("platform rate limited"), false)
                    .await?;
                self.ctx.quota.refund(account.id, action.action_type, day).await;

                let cooldown = chrono::Duration::from_std(self.ctx.settings.rate_limit_cooldown)
                    .unwrap_or_else(|_| chrono::Duration::hours(1));
                let until = now + cooldown;
                self.ctx
                    .accounts
                    .update_status(account.id, AccountStatus::RateLimited, Some(until))
                    .await?;
                warn!(
                    account_id = %account.id,
                    %until,
                    "Platform rate limited the account, stopping lane"
                );
                Ok(Some(LaneExit::RateLimited))
            }
            None => {
                let attempts = action.attempt_count + 1;
                if attempts >= limits.max_attempts {
                    let reason = format!("executor timed out after {} attempts", attempts);
                    warn!(action_id = %action.id, "{}", reason);
                    self.ctx
                        .actions
                        .mark_completed(action.id, &Resolution::Failed(reason), now)
                        .await?;
                } else {
                    let reason = format!(
                        "executor timed out after {}s",
                        limits.executor_timeout().as_secs()
                    );
                    warn!(action_id = %action.id, attempt = attempts, "{}, will retry", reason);
                    self.ctx
                        .actions
                        .requeue(action.id, now, Some(&reason), true)
                        .await?;
                }
                Ok(None)
            }
        }
    }

    fn timezone(&self, account: &Account) -> Tz {
        parse_timezone(&account.timezone).unwrap_or(self.ctx.settings.default_timezone)
    }
}

/// The current quota day, if it differs from the one a unit was reserved on.
fn rolled_over(reserved: NaiveDate, now: DateTime<Utc>, tz: Tz) -> Option<NaiveDate> {
    let today = quota_day(now, tz);
    (today != reserved).then_some(today)
}

/// Drive `fut` unless shutdown is signalled first.
async fn or_shutdown<F: Future>(shutdown: &mut watch::Receiver<bool>, fut: F) -> Option<F::Output> {
    if *shutdown.borrow() {
        return None;
    }
    tokio::select! {
        out = fut => Some(out),
        _ = shutdown.wait_for(|stop| *stop) => None,
    }
}
