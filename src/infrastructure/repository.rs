use crate::domain::{
    Account, AccountStatus, Action, ActionLimits, ActionType, Campaign, CampaignStatus,
    LimitOverride, QuotaCounter, Reservation, Resolution,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl RepositoryError {
    /// Connectivity problems, as opposed to bad rows or missing records.
    pub fn is_unavailable(&self) -> bool {
        match self {
            RepositoryError::Unavailable(_) => true,
            RepositoryError::DatabaseError(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError>;
    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, RepositoryError>;
    async fn update_status(
        &self,
        id: Uuid,
        status: AccountStatus,
        rate_limited_until: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError>;
    /// Reactivate rate-limited accounts whose cool-down has ended; returns their ids.
    async fn release_cooldowns(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, RepositoryError>;
}

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    /// Persist the campaign and enqueue its actions in one transaction, in slice order.
    async fn create_with_actions(
        &self,
        campaign: &Campaign,
        actions: &[Action],
    ) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Campaign, RepositoryError>;
    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, RepositoryError>;
    /// Move to `to` only if the current status is one of `from`.
    async fn transition(
        &self,
        id: Uuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool, RepositoryError>;
    /// Cancel every still-waiting action and the campaign itself. Returns how
    /// many actions were cancelled by this call.
    async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> Result<i32, RepositoryError>;
}

/// The durable action queue. Every mutation is conditional on the current
/// status so that replays and races resolve to no-ops (`Ok(false)`).
#[async_trait]
pub trait ActionRepository: Send + Sync {
    async fn ping(&self) -> Result<(), RepositoryError>;
    async fn get_by_id(&self, id: Uuid) -> Result<Action, RepositoryError>;
    /// Oldest waiting action of a running campaign whose `scheduled_not_before <= now`.
    async fn next_ready(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Action>, RepositoryError>;
    /// Earliest `scheduled_not_before` among dispatchable waiting actions;
    /// `None` means the account's queue is drained.
    async fn next_wakeup(&self, account_id: Uuid) -> Result<Option<DateTime<Utc>>, RepositoryError>;
    async fn mark_in_flight(&self, action_id: Uuid, now: DateTime<Utc>) -> Result<bool, RepositoryError>;
    async fn heartbeat(&self, action_id: Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError>;
    /// `in_flight -> completed | failed`, counting the attempt and bumping the
    /// campaign counter in the same statement.
    async fn mark_completed(
        &self,
        action_id: Uuid,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    /// Fail a waiting action without dispatching it (attempt budget exhausted).
    async fn fail_waiting(
        &self,
        action_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    async fn defer_for_quota(
        &self,
        action_id: Uuid,
        not_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError>;
    /// `in_flight -> pending`.
    async fn requeue(
        &self,
        action_id: Uuid,
        not_before: DateTime<Utc>,
        error: Option<&str>,
        count_attempt: bool,
    ) -> Result<bool, RepositoryError>;
    /// Return in-flight actions with no heartbeat since `stale_before` to `pending`.
    async fn recover_abandoned(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Action>, RepositoryError>;
    async fn list_by_campaign(
        &self,
        campaign_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Action>, RepositoryError>;
    /// Active accounts holding dispatchable work.
    async fn accounts_with_work(&self) -> Result<Vec<Uuid>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuotaRepository: Send + Sync {
    /// Atomically increment the counter if `count < max`.
    async fn try_reserve(
        &self,
        account_id: Uuid,
        action_type: ActionType,
        day: NaiveDate,
        max: i32,
    ) -> Result<Reservation, RepositoryError>;
    /// Give back a reservation that was never used. Never drops below zero.
    async fn release(
        &self,
        account_id: Uuid,
        action_type: ActionType,
        day: NaiveDate,
    ) -> Result<(), RepositoryError>;
    async fn usage_for_day(
        &self,
        account_id: Uuid,
        day: NaiveDate,
    ) -> Result<Vec<QuotaCounter>, RepositoryError>;
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LimitsRepository: Send + Sync {
    async fn upsert(&self, limit: &LimitOverride) -> Result<(), RepositoryError>;
    /// Most specific override: the account's own, else the tenant-wide one.
    async fn find(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<ActionLimits>, RepositoryError>;
}

pub(crate) fn parse_column<T: FromStr>(value: &str, what: &str) -> Result<T, RepositoryError> {
    T::from_str(value)
        .map_err(|_| RepositoryError::InvalidData(format!("Unknown {}: {}", what, value)))
}

pub struct PostgresAccountRepository {
    pool: PgPool,
}

impl PostgresAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for PostgresAccountRepository {
    async fn create(&self, account: &Account) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, tenant_id, platform, handle, status, proxy, timezone,
                                  credentials_sealed, rate_limited_until, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(account.id)
        .bind(account.tenant_id)
        .bind(account.platform.to_string())
        .bind(&account.handle)
        .bind(account.status.to_string())
        .bind(&account.proxy)
        .bind(&account.timezone)
        .bind(&account.credentials_sealed)
        .bind(account.rate_limited_until)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Account, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, platform, handle, status, proxy, timezone,
                   credentials_sealed, rate_limited_until, created_at, updated_at
            FROM accounts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Account {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_account(&row)
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, platform, handle, status, proxy, timezone,
                   credentials_sealed, rate_limited_until, created_at, updated_at
            FROM accounts
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: AccountStatus,
        rate_limited_until: Option<DateTime<Utc>>,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET status = $1, rate_limited_until = $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(status.to_string())
        .bind(rate_limited_until)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("Account {}", id)));
        }
        Ok(())
    }

    async fn release_cooldowns(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, RepositoryError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            UPDATE accounts
            SET status = 'active', rate_limited_until = NULL, updated_at = $1
            WHERE status = 'rate_limited'
              AND rate_limited_until IS NOT NULL
              AND rate_limited_until <= $1
            RETURNING id
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

fn row_to_account(row: &sqlx::postgres::PgRow) -> Result<Account, RepositoryError> {
    let platform: String = row.try_get("platform")?;
    let status: String = row.try_get("status")?;

    Ok(Account {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        platform: parse_column(&platform, "platform")?,
        handle: row.try_get("handle")?,
        status: parse_column(&status, "account status")?,
        proxy: row.try_get("proxy")?,
        timezone: row.try_get("timezone")?,
        credentials_sealed: row.try_get("credentials_sealed")?,
        rate_limited_until: row.try_get("rate_limited_until")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub struct PostgresCampaignRepository {
    pool: PgPool,
}

impl PostgresCampaignRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CampaignRepository for PostgresCampaignRepository {
    async fn create_with_actions(
        &self,
        campaign: &Campaign,
        actions: &[Action],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO campaigns (id, tenant_id, action_type, account_ids, content, status,
                                   total, sent, failed, cancelled, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(campaign.id)
        .bind(campaign.tenant_id)
        .bind(campaign.action_type.to_string())
        .bind(&campaign.account_ids)
        .bind(&campaign.content)
        .bind(campaign.status.to_string())
        .bind(campaign.total)
        .bind(campaign.sent)
        .bind(campaign.failed)
        .bind(campaign.cancelled)
        .bind(campaign.created_at)
        .bind(campaign.updated_at)
        .execute(&mut *tx)
        .await?;

        let ids: Vec<Uuid> = actions.iter().map(|a| a.id).collect();
        let account_ids: Vec<Uuid> = actions.iter().map(|a| a.account_id).collect();
        let targets: Vec<String> = actions.iter().map(|a| a.payload.target.clone()).collect();
        let not_before: Vec<DateTime<Utc>> =
            actions.iter().map(|a| a.scheduled_not_before).collect();

        // WITH ORDINALITY + ORDER BY keeps `seq` in slice order, which is the FIFO order.
        sqlx::query(
            r#"
            INSERT INTO actions (id, campaign_id, account_id, action_type, target, content, status,
                                 scheduled_not_before, attempt_count, created_at, updated_at)
            SELECT t.id, $5, t.account_id, $6, t.target, $7, 'pending', t.not_before, 0, $8, $8
            FROM UNNEST($1::uuid[], $2::uuid[], $3::text[], $4::timestamptz[])
                 WITH ORDINALITY AS t(id, account_id, target, not_before, ord)
            ORDER BY t.ord
            "#,
        )
        .bind(&ids)
        .bind(&account_ids)
        .bind(&targets)
        .bind(&not_before)
        .bind(campaign.id)
        .bind(campaign.action_type.to_string())
        .bind(&campaign.content)
        .bind(campaign.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Campaign, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, tenant_id, action_type, account_ids, content, status,
                   total, sent, failed, cancelled, created_at, updated_at, completed_at
            FROM campaigns
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Campaign {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_campaign(&row)
    }

    async fn list_by_tenant(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, tenant_id, action_type, account_ids, content, status,
                   total, sent, failed, cancelled, created_at, updated_at, completed_at
            FROM campaigns
            WHERE tenant_id = $1
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(tenant_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_campaign).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[CampaignStatus],
        to: CampaignStatus,
    ) -> Result<bool, RepositoryError> {
        let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();

        let result = sqlx::query(
            r#"
            UPDATE campaigns
            SET status = $1, updated_at = $2
            WHERE id = $3 AND status = ANY($4)
            "#,
        )
        .bind(to.to_string())
        .bind(Utc::now())
        .bind(id)
        .bind(&from)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn cancel(&self, id: Uuid, now: DateTime<Utc>) -> Result<i32, RepositoryError> {
        let cancelled: Option<i32> = sqlx::query_scalar(
            r#"
            WITH withdrawn AS (
                UPDATE actions
                SET status = 'cancelled', completed_at = $2, updated_at = $2
                WHERE campaign_id = $1 AND status IN ('pending', 'skipped_quota')
                RETURNING id
            ), tally AS (
                SELECT COUNT(*)::int AS n FROM withdrawn
            )
            UPDATE campaigns c
            SET cancelled = c.cancelled + tally.n,
                status = CASE WHEN c.status IN ('completed', 'cancelled') THEN c.status ELSE 'cancelled' END,
                completed_at = COALESCE(c.completed_at, $2),
                updated_at = $2
            FROM tally
            WHERE c.id = $1
            RETURNING tally.n
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        cancelled.ok_or_else(|| RepositoryError::NotFound(format!("Campaign {}", id)))
    }
}

fn row_to_campaign(row: &sqlx::postgres::PgRow) -> Result<Campaign, RepositoryError> {
    let action_type: String = row.try_get("action_type")?;
    let status: String = row.try_get("status")?;

    Ok(Campaign {
        id: row.try_get("id")?,
        tenant_id: row.try_get("tenant_id")?,
        action_type: parse_column(&action_type, "action type")?,
        account_ids: row.try_get("account_ids")?,
        content: row.try_get("content")?,
        status: parse_column(&status, "campaign status")?,
        total: row.try_get("total")?,
        sent: row.try_get("sent")?,
        failed: row.try_get("failed")?,
        cancelled: row.try_get("cancelled")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_column_reports_the_offending_value() {
        let parsed: Result<CampaignStatus, _> = parse_column("archived", "campaign status");
        match parsed {
            Err(RepositoryError::InvalidData(msg)) => {
                assert_eq!(msg, "Unknown campaign status: archived")
            }
            other => panic!("unexpected: {other:?}"),
        }

        let ok: ActionType = parse_column("upvote", "action type").unwrap();
        assert_eq!(ok, ActionType::Upvote);
    }

    #[test]
    fn pool_timeouts_count_as_unavailable() {
        assert!(RepositoryError::DatabaseError(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(RepositoryError::Unavailable("down".into()).is_unavailable());
        assert!(!RepositoryError::NotFound("x".into()).is_unavailable());
        assert!(!RepositoryError::DatabaseError(sqlx::Error::RowNotFound).is_unavailable());
    }
}
