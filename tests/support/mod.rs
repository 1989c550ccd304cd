#![allow(dead_code)]

use action_lanes::application::{
    CampaignRequest, ExecutionRequest, Executor, Outcome, Scheduler, SchedulerDeps,
    SchedulerSettings,
};
use action_lanes::domain::{
    Account, AccountStatus, Action, ActionLimits, ActionStatus, ActionType, Campaign,
    CampaignStatus, LimitOverride, Platform, QuotaCounter, Reservation, Resolution,
};
use action_lanes::infrastructure::{
    AccountRepository, ActionRepository, CampaignRepository, CredentialVault, LimitsRepository,
    QuotaRepository, RepositoryError,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

pub const TEST_KEY: &str = "YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXoxMjM0NTY=";

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, Account>,
    campaigns: HashMap<Uuid, Campaign>,
    /// Insertion order doubles as the queue sequence.
    actions: Vec<Action>,
    quotas: HashMap<(Uuid, ActionType, NaiveDate), QuotaCounter>,
    limits: Vec<LimitOverride>,
}

impl Inner {
    fn position(&self, action_id: Uuid) -> Option<usize> {
        self.actions.iter().position(|a| a.id == action_id)
    }

    fn campaign_running(&self, campaign_id: Uuid) -> bool {
        self.campaigns
            .get(&campaign_id)
            .is_some_and(|c| c.status == CampaignStatus::Running)
    }

    fn dispatchable(&self, action: &Action) -> bool {
        action.status.is_waiting() && self.campaign_running(action.campaign_id)
    }

    fn settle(
        &mut self,
        action_id: Uuid,
        from: &[ActionStatus],
        resolution: &Resolution,
        count_attempt: bool,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(idx) = self.position(action_id) else {
            return false;
        };
        let action = &mut self.actions[idx];
        if !from.contains(&action.status) {
            return false;
        }

        action.status = resolution.status();
        if let Some(reason) = resolution.error() {
            action.last_error = Some(reason.to_string());
        }
        if count_attempt {
            action.attempt_count += 1;
        }
        action.heartbeat_at = None;
        action.completed_at = Some(now);
        action.updated_at = now;
        let campaign_id = action.campaign_id;

        if let Some(campaign) = self.campaigns.get_mut(&campaign_id) {
            match resolution {
                Resolution::Completed => campaign.sent += 1,
                Resolution::Failed(_) => campaign.failed += 1,
            }
            let open = matches!(
                campaign.status,
                CampaignStatus::Running | CampaignStatus::Paused
            );
            if open && campaign.sent + campaign.failed + campaign.cancelled >= campaign.total {
                campaign.status = CampaignStatus::Completed;
                campaign.completed_at = Some(now);
            }
            campaign.updated_at = now;
        }
        true
    }
}

/// In-memory stand-in for the Postgres repositories, with the same
/// conditional-update semantics.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
    unhealthy: Arc<AtomicBool>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.unhealthy.store(!healthy, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.unhealthy.load(Ordering::SeqCst) {
            return Err(RepositoryError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }

    pub fn insert_account(&self, account: Account) {
        self.inner.lock().unwrap().accounts.insert(account.id, account);
    }

    pub fn account(&self, id: Uuid) -> Account {
        self.inner.lock().unwrap().accounts[&id].clone()
    }

    pub fn campaign(&self, id: Uuid) -> Campaign {
        self.inner.lock().unwrap().campaigns[&id].clone()
    }

    pub fn actions_of(&self, campaign_id: Uuid) -> Vec<Action> {
        self.inner
            .lock()
            .unwrap()
            .actions
            .iter()
            .filter(|a| a.campaign_id == campaign_id)
            .cloned()
            .collect()
    }

    pub fn statuses(&self, campaign_id: Uuid) -> Vec<ActionStatus> {
        self.actions_of(campaign_id).iter().map(|a| a.status).collect()
    }

    pub fn action(&self, id: Uuid) -> Action {
        let inner = self.inner.lock().unwrap();
        let idx = inner.position(id).expect("action exists");
        inner.actions[idx].clone()
    }

    pub fn quota(&self, account_id: Uuid, action_type: ActionType) -> Vec<QuotaCounter> {
        self.inner
            .lock()
            .unwrap()
            .quotas
            .values()
            .filter(|q| q.account_id == account_id && q.action_type == action_type)
            .cloned()
            .collect()
    }

    pub fn in_flight_count(&self, account_id: Uuid) -> usize {
        self.inner
            .lock()
            .unwrap()
            .actions
            .iter()
            .filter(|a| a.account_id == account_id && a.status == ActionStatus::InFlight)
            .count()
    }

    /// Simulate a crash mid-call: the action is left in flight with an old heartbeat.
    pub fn strand_in_flight(&self, action_id: Uuid, heartbeat_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        let idx = inner.position(action_id).expect("action exists");
        inner.actions[idx].status = ActionStatus::InFlight;
        inner.actions[idx].heartbeat_at = Some(heartbeat_at);
        inner.actions[idx].updated_at = heartbeat_at;
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        self.check()?;
        self.insert_account(account.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .accounts
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, RepositoryError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let mut accounts: Vec<Account> = inner
            .accounts
            .values()
            .filter(|a| a.tenant_id == tenant_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: AccountStatus,
        rate_limited_until: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let account = inner
            .accounts
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(format!("Account {}", id)))?;
        account.status = status;
        account.rate_limited_until = rate_limited_until;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn release_cooldowns(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let mut released = Vec::new();
        for account in inner.accounts.values_mut() {
            let elapsed = account.rate_limited_until.is_some_and(|until| until <= now);
            if account.status == AccountStatus::RateLimited && elapsed {
                account.status = AccountStatus::Active;
                account.rate_limited_until = None;
                released.push(account.id);
            }
        }
        Ok(released)
    }
}

#[async_trait]
impl CampaignRepository for InMemoryStore {
    async fn create_with_actions(
        &self,
        campaign: &Campaign,
        actions: &[Action],
    ) -> Result<(), RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.campaigns.insert(campaign.id, campaign.clone());
        inner.actions.extend(actions.iter().cloned());
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Campaign, RepositoryError> {
        self.check()?;
        self.inner
            .lock()
            .unwrap()
            .campaigns
            .get(&id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("Campaign {}", id)))
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, RepositoryError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let mut campaigns: Vec<Campaign> = inner
            .campaigns
            .values()
            .filter(|c| c.tenant_id == tenant_id)
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(campaigns
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        match inner.campaigns.get_mut(&id) {
            Some(campaign) if from.contains(&campaign.status) => {
                campaign.status = to;
                campaign.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> Result<i32, RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if !inner.campaigns.contains_key(&id) {
            return Err(RepositoryError::NotFound(format!("Campaign {}", id)));
        }

        let mut cancelled = 0;
        for action in inner.actions.iter_mut() {
            if action.campaign_id == id && action.status.is_waiting() {
                action.status = ActionStatus::Cancelled;
                action.completed_at = Some(now);
                action.updated_at = now;
                cancelled += 1;
            }
        }

        if let Some(campaign) = inner.campaigns.get_mut(&id) {
            campaign.cancelled += cancelled;
            if !campaign.status.is_terminal() {
                campaign.status = CampaignStatus::Cancelled;
            }
            campaign.completed_at.get_or_insert(now);
            campaign.updated_at = now;
        }
        Ok(cancelled)
    }
}

#[async_trait]
impl ActionRepository for InMemoryStore {
    async fn ping(&self) -> Result<(), RepositoryError> {
        self.check()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Action, RepositoryError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        inner
            .position(id)
            .map(|idx| inner.actions[idx].clone())
            .ok_or_else(|| RepositoryError::NotFound(format!("Action {}", id)))
    }

    async fn next_ready(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Action>, RepositoryError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .actions
            .iter()
            .find(|a| {
                a.account_id == account_id
                    && a.scheduled_not_before <= now
                    && inner.dispatchable(a)
            })
            .cloned())
    }

    async fn next_wakeup(&self, account_id: Uuid) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .actions
            .iter()
            .filter(|a| a.account_id == account_id && inner.dispatchable(a))
            .map(|a| a.scheduled_not_before)
            .min())
    }

    async fn mark_in_flight(&self, action_id: Uuid, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let Some(idx) = inner.position(action_id) else {
            return Ok(false);
        };
        let account_id = inner.actions[idx].account_id;
        if !inner.dispatchable(&inner.actions[idx]) {
            return Ok(false);
        }
        // mirrors the partial unique index on in-flight actions
        let busy = inner
            .actions
            .iter()
            .any(|a| a.account_id == account_id && a.status == ActionStatus::InFlight);
        if busy {
            return Ok(false);
        }

        let action = &mut inner.actions[idx];
        action.status = ActionStatus::InFlight;
        action.heartbeat_at = Some(now);
        action.updated_at = now;
        Ok(true)
    }

    async fn heartbeat(&self, action_id: Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(idx) = inner.position(action_id) {
            if inner.actions[idx].status == ActionStatus::InFlight {
                inner.actions[idx].heartbeat_at = Some(now);
            }
        }
        Ok(())
    }

    async fn mark_completed(
        &self,
        action_id: Uuid,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.check()?;
        Ok(self.inner.lock().unwrap().settle(
            action_id,
            &[ActionStatus::InFlight],
            resolution,
            true,
            now,
        ))
    }

    async fn fail_waiting(
        &self,
        action_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.check()?;
        Ok(self.inner.lock().unwrap().settle(
            action_id,
            &[ActionStatus::Pending, ActionStatus::SkippedQuota],
            &Resolution::Failed(reason.to_string()),
            false,
            now,
        ))
    }

    async fn defer_for_quota(
        &self,
        action_id: Uuid,
        not_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let Some(idx) = inner.position(action_id) else {
            return Ok(false);
        };
        let action = &mut inner.actions[idx];
        if !action.status.is_waiting() {
            return Ok(false);
        }
        action.status = ActionStatus::SkippedQuota;
        action.scheduled_not_before = not_before;
        action.updated_at = Utc::now();
        Ok(true)
    }

    async fn requeue(
        &self,
        action_id: Uuid,
        not_before: DateTime<Utc>,
        error: Option<&str>,
        count_attempt: bool,
    ) -> Result<bool, RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let Some(idx) = inner.position(action_id) else {
            return Ok(false);
        };
        let action = &mut inner.actions[idx];
        if action.status != ActionStatus::InFlight {
            return Ok(false);
        }
        action.status = ActionStatus::Pending;
        action.scheduled_not_before = not_before;
        if let Some(error) = error {
            action.last_error = Some(error.to_string());
        }
        if count_attempt {
            action.attempt_count += 1;
        }
        action.heartbeat_at = None;
        action.updated_at = Utc::now();
        Ok(true)
    }

    async fn recover_abandoned(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Action>, RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        let mut recovered = Vec::new();
        for action in inner.actions.iter_mut() {
            let last_seen = action.heartbeat_at.unwrap_or(action.updated_at);
            if action.status == ActionStatus::InFlight && last_seen < stale_before {
                action.status = ActionStatus::Pending;
                action.attempt_count += 1;
                action.last_error = Some("abandoned in flight".to_string());
                action.heartbeat_at = None;
                action.updated_at = Utc::now();
                recovered.push(action.clone());
            }
        }
        Ok(recovered)
    }

    async fn list_by_campaign(
        &self,
        campaign_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Action>, RepositoryError> {
        self.check()?;
        Ok(self
            .actions_of(campaign_id)
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn accounts_with_work(&self) -> Result<Vec<Uuid>, RepositoryError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let ids: HashSet<Uuid> = inner
            .actions
            .iter()
            .filter(|a| inner.dispatchable(a))
            .filter(|a| {
                inner
                    .accounts
                    .get(&a.account_id)
                    .is_some_and(|acc| acc.status == AccountStatus::Active)
            })
            .map(|a| a.account_id)
            .collect();
        Ok(ids.into_iter().collect())
    }
}

#[async_trait]
impl QuotaRepository for InMemoryStore {
    async fn try_reserve(
        &self,
        account_id: Uuid,
        action_type: ActionType,
        day: NaiveDate,
        max: i32,
    ) -> Result<Reservation, RepositoryError> {
        self.check()?;
        if max <= 0 {
            return Ok(Reservation::denied());
        }
        let mut inner = self.inner.lock().unwrap();
        let counter = inner
            .quotas
            .entry((account_id, action_type, day))
            .or_insert(QuotaCounter {
                account_id,
                action_type,
                day,
                count: 0,
                max,
            });
        if counter.count >= max {
            return Ok(Reservation::denied());
        }
        counter.count += 1;
        counter.max = max;
        Ok(Reservation::granted(max - counter.count))
    }

    async fn release(
        &self,
        account_id: Uuid,
        action_type: ActionType,
        day: NaiveDate,
    ) -> Result<(), RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        if let Some(counter) = inner.quotas.get_mut(&(account_id, action_type, day)) {
            if counter.count > 0 {
                counter.count -= 1;
            }
        }
        Ok(())
    }

    async fn usage_for_day(
        &self,
        account_id: Uuid,
        day: NaiveDate,
    ) -> Result<Vec<QuotaCounter>, RepositoryError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let mut usage: Vec<QuotaCounter> = inner
            .quotas
            .values()
            .filter(|q| q.account_id == account_id && q.day == day)
            .cloned()
            .collect();
        usage.sort_by_key(|q| q.action_type.to_string());
        Ok(usage)
    }
}

#[async_trait]
impl LimitsRepository for InMemoryStore {
    async fn upsert(&self, limit: &LimitOverride) -> Result<(), RepositoryError> {
        self.check()?;
        let mut inner = self.inner.lock().unwrap();
        inner.limits.retain(|l| {
            !(l.tenant_id == limit.tenant_id
                && l.account_id == limit.account_id
                && l.action_type == limit.action_type)
        });
        inner.limits.push(limit.clone());
        Ok(())
    }

    async fn find(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<ActionLimits>, RepositoryError> {
        self.check()?;
        let inner = self.inner.lock().unwrap();
        let scoped = |acc: Option<Uuid>| {
            inner
                .limits
                .iter()
                .find(|l| {
                    l.tenant_id == tenant_id
                        && l.action_type == action_type
                        && l.account_id == acc
                })
                .map(|l| l.limits)
        };
        Ok(scoped(Some(account_id)).or_else(|| scoped(None)))
    }
}

/// What the scripted executor does for one call.
#[derive(Clone)]
pub enum Step {
    Succeed,
    Fail(String),
    RateLimit,
    /// Never answers; only the lane's timeout ends the call.
    Hang,
    /// Succeeds once the notify fires.
    Gated(Arc<Notify>),
}

struct ConcurrencyGuard {
    executor: Arc<ScriptedExecutorState>,
    account_id: Uuid,
}

impl Drop for ConcurrencyGuard {
    fn drop(&mut self) {
        let mut running = self.executor.running.lock().unwrap();
        if let Some(n) = running.get_mut(&self.account_id) {
            *n -= 1;
        }
    }
}

#[derive(Default)]
struct ScriptedExecutorState {
    script: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(Uuid, String)>>,
    call_times: Mutex<Vec<tokio::time::Instant>>,
    running: Mutex<HashMap<Uuid, usize>>,
    peak_per_account: Mutex<usize>,
    secrets: Mutex<HashSet<String>>,
}

/// Executor driven by a per-target script; unscripted targets succeed.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    state: Arc<ScriptedExecutorState>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue steps for a target; each call consumes one, then it succeeds.
    pub fn script(&self, target: &str, steps: Vec<Step>) {
        self.state
            .script
            .lock()
            .unwrap()
            .entry(target.to_string())
            .or_default()
            .extend(steps);
    }

    /// Every call for this target behaves the same.
    pub fn always(&self, target: &str, step: Step, times: usize) {
        self.script(target, vec![step; times]);
    }

    pub fn calls(&self) -> Vec<(Uuid, String)> {
        self.state.calls.lock().unwrap().clone()
    }

    /// Tokio clock reading at the start of each call, in call order.
    pub fn call_times(&self) -> Vec<tokio::time::Instant> {
        self.state.call_times.lock().unwrap().clone()
    }

    pub fn targets_for(&self, account_id: Uuid) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|(acc, _)| *acc == account_id)
            .map(|(_, target)| target)
            .collect()
    }

    pub fn peak_per_account(&self) -> usize {
        *self.state.peak_per_account.lock().unwrap()
    }

    pub fn saw_secret(&self, secret: &str) -> bool {
        self.state.secrets.lock().unwrap().contains(secret)
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Outcome {
        let account_id = request.credentials.account_id;
        let target = request.payload.target.clone();

        self.state
            .calls
            .lock()
            .unwrap()
            .push((account_id, target.clone()));
        self.state
            .call_times
            .lock()
            .unwrap()
            .push(tokio::time::Instant::now());
        self.state
            .secrets
            .lock()
            .unwrap()
            .insert(request.credentials.secret.clone());

        {
            let mut running = self.state.running.lock().unwrap();
            let n = running.entry(account_id).or_insert(0);
            *n += 1;
            let mut peak = self.state.peak_per_account.lock().unwrap();
            *peak = (*peak).max(*n);
        }
        let _guard = ConcurrencyGuard {
            executor: self.state.clone(),
            account_id,
        };

        let step = self
            .state
            .script
            .lock()
            .unwrap()
            .get_mut(&target)
            .and_then(|steps| steps.pop_front())
            .unwrap_or(Step::Succeed);

        match step {
            Step::Succeed => Outcome::Success,
            Step::Fail(reason) => Outcome::Failed(reason),
            Step::RateLimit => Outcome::RateLimited,
            Step::Hang => std::future::pending().await,
            Step::Gated(gate) => {
                gate.notified().await;
                Outcome::Success
            }
        }
    }
}

pub fn fast_limits(action_type: ActionType) -> ActionLimits {
    ActionLimits {
        min_interval_s: 0,
        max_interval_s: 0,
        ..ActionLimits::default_for(action_type)
    }
}

pub fn test_settings() -> SchedulerSettings {
    SchedulerSettings {
        global_concurrency: 8,
        heartbeat_interval: Duration::from_secs(1),
        maintenance_interval: Duration::from_secs(3600),
        jitter_seed: Some(11),
        ..SchedulerSettings::default()
    }
}

pub struct Harness {
    pub store: InMemoryStore,
    pub executor: ScriptedExecutor,
    pub vault: Arc<CredentialVault>,
    pub scheduler: Scheduler,
    pub tenant_id: Uuid,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: SchedulerSettings) -> Self {
        let store = InMemoryStore::new();
        let executor = ScriptedExecutor::new();
        let vault = Arc::new(CredentialVault::new(TEST_KEY).unwrap());

        let scheduler = Scheduler::new(
            SchedulerDeps {
                accounts: Arc::new(store.clone()),
                campaigns: Arc::new(store.clone()),
                actions: Arc::new(store.clone()),
                quotas: Arc::new(store.clone()),
                limits: Arc::new(store.clone()),
                executor: Arc::new(executor.clone()),
                vault: vault.clone(),
            },
            settings,
        );

        Self {
            store,
            executor,
            vault,
            scheduler,
            tenant_id: Uuid::new_v4(),
        }
    }

    /// Register an active account for the harness tenant whose limits for
    /// `action_type` have no pacing delay.
    pub fn account(&self, handle: &str, action_type: ActionType) -> Account {
        let sealed = self.vault.seal(&format!("secret-{handle}")).unwrap();
        let account = Account::new(
            self.tenant_id,
            Platform::Instagram,
            handle.to_string(),
            "UTC".to_string(),
            None,
            sealed,
        );
        self.store.insert_account(account.clone());
        self.limits(Some(account.id), action_type, fast_limits(action_type));
        account
    }

    pub fn limits(&self, account_id: Option<Uuid>, action_type: ActionType, limits: ActionLimits) {
        let limit = LimitOverride {
            tenant_id: self.tenant_id,
            account_id,
            action_type,
            limits,
        };
        let mut inner = self.store.inner.lock().unwrap();
        inner.limits.retain(|l| {
            !(l.tenant_id == limit.tenant_id
                && l.account_id == limit.account_id
                && l.action_type == limit.action_type)
        });
        inner.limits.push(limit);
    }

    /// Wait until the account's lane has exited and left the registry.
    pub async fn wait_lane_stopped(&self, account_id: Uuid) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
        while self.scheduler.active_lanes().await.contains(&account_id) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "lane for {account_id} never stopped"
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn submit(
        &self,
        action_type: ActionType,
        accounts: &[Uuid],
        targets: &[&str],
    ) -> Campaign {
        self.scheduler
            .submit_campaign(
                self.tenant_id,
                CampaignRequest {
                    action_type,
                    account_ids: accounts.to_vec(),
                    targets: targets.iter().map(|t| t.to_string()).collect(),
                    content: action_type
                        .requires_content()
                        .then(|| "hello from the test".to_string()),
                },
            )
            .await
            .expect("campaign accepted")
    }
}

/// Poll `check` until it holds, failing the test after a generous deadline.
/// Uses tokio's clock, so it also works with paused time.
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(30);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

pub fn assert_conserved(campaign: &Campaign) {
    assert_eq!(
        campaign.sent + campaign.failed + campaign.pending() + campaign.cancelled,
        campaign.total,
        "counters out of balance: {campaign:?}"
    );
    assert!(campaign.pending() >= 0, "negative pending: {campaign:?}");
}
