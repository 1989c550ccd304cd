use crate::domain::{Action, ActionPayload, Resolution};
use crate::infrastructure::repository::{parse_column, ActionRepository, RepositoryError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PostgresActionRepository {
    pool: PgPool,
}

impl PostgresActionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Move an action from one of `from` into a terminal status and bump the
    /// matching campaign counter. The campaign flips to `completed` in the same
    /// statement once every action is settled.
    async fn settle(
        &self,
        action_id: Uuid,
        from: &[&str],
        resolution: &Resolution,
        count_attempt: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let from: Vec<String> = from.iter().map(|s| s.to_string()).collect();
        let (sent, failed) = match resolution {
            Resolution::Completed => (1i32, 0i32),
            Resolution::Failed(_) => (0, 1),
        };

        let settled: bool = sqlx::query_scalar(
            r#"
            WITH settled AS (
                UPDATE actions
                SET status = $2,
                    last_error = COALESCE($3, last_error),
                    attempt_count = attempt_count + $4,
                    heartbeat_at = NULL,
                    completed_at = $5,
                    updated_at = $5
                WHERE id = $1 AND status = ANY($6)
                RETURNING campaign_id
            ), tallied AS (
                UPDATE campaigns c
                SET sent = c.sent + $7,
                    failed = c.failed + $8,
                    status = CASE
                        WHEN c.status IN ('running', 'paused')
                             AND c.sent + $7 + c.failed + $8 + c.cancelled >= c.total
                        THEN 'completed'
                        ELSE c.status
                    END,
                    completed_at = CASE
                        WHEN c.status IN ('running', 'paused')
                             AND c.sent + $7 + c.failed + $8 + c.cancelled >= c.total
                        THEN $5
                        ELSE c.completed_at
                    END,
                    updated_at = $5
                FROM settled
                WHERE c.id = settled.campaign_id
                RETURNING c.id
            )
            SELECT EXISTS (SELECT 1 FROM settled)
            "#,
        )
        .bind(action_id)
        .bind(resolution.status().to_string())
        .bind(resolution.error())
        .bind(if count_attempt { 1i32 } else { 0i32 })
        .bind(now)
        .bind(&from)
        .bind(sent)
        .bind(failed)
        .fetch_one(&self.pool)
        .await?;

        Ok(settled)
    }
}

#[async_trait]
impl ActionRepository for PostgresActionRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Action, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT id, campaign_id, account_id, action_type, target, content, status,
                   scheduled_not_before, attempt_count, last_error, heartbeat_at,
                   created_at, updated_at, completed_at
            FROM actions
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => RepositoryError::NotFound(format!("Action {}", id)),
            _ => RepositoryError::DatabaseError(e),
        })?;

        row_to_action(&row)
    }

    async fn next_ready(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Action>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT a.id, a.campaign_id, a.account_id, a.action_type, a.target, a.content, a.status,
                   a.scheduled_not_before, a.attempt_count, a.last_error, a.heartbeat_at,
                   a.created_at, a.updated_at, a.completed_at
            FROM actions a
            JOIN campaigns c ON c.id = a.campaign_id
            WHERE a.account_id = $1
              AND a.status IN ('pending', 'skipped_quota')
              AND a.scheduled_not_before <= $2
              AND c.status = 'running'
            ORDER BY a.seq
            LIMIT 1
            "#,
        )
        .bind(account_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_action).transpose()
    }

    async fn next_wakeup(&self, account_id: Uuid) -> Result<Option<DateTime<Utc>>, RepositoryError> {
        let wakeup: Option<DateTime<Utc>> = sqlx::query_scalar(
            r#"
            SELECT MIN(a.scheduled_not_before)
            FROM actions a
            JOIN campaigns c ON c.id = a.campaign_id
            WHERE a.account_id = $1
              AND a.status IN ('pending', 'skipped_quota')
              AND c.status = 'running'
            "#,
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(wakeup)
    }

    async fn mark_in_flight(&self, action_id: Uuid, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE actions a
            SET status = 'in_flight', heartbeat_at = $2, updated_at = $2
            FROM campaigns c
            WHERE a.id = $1
              AND a.campaign_id = c.id
              AND c.status = 'running'
              AND a.status IN ('pending', 'skipped_quota')
            "#,
        )
        .bind(action_id)
        .bind(now)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) => Ok(done.rows_affected() == 1),
            // another action of the same account already holds the in-flight slot
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn heartbeat(&self, action_id: Uuid, now: DateTime<Utc>) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE actions
            SET heartbeat_at = $2
            WHERE id = $1 AND status = 'in_flight'
            "#,
        )
        .bind(action_id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_completed(
        &self,
        action_id: Uuid,
        resolution: &Resolution,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        self.settle(action_id, &["in_flight"], resolution, true, now)
            .await
    }

    async fn fail_waiting(
        &self,
        action_id: Uuid,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let resolution = Resolution::Failed(reason.to_string());
        self.settle(
            action_id,
            &["pending", "skipped_quota"],
            &resolution,
            false,
            now,
        )
        .await
    }

    async fn defer_for_quota(
        &self,
        action_id: Uuid,
        not_before: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE actions
            SET status = 'skipped_quota', scheduled_not_before = $2, updated_at = $3
            WHERE id = $1 AND status IN ('pending', 'skipped_quota')
            "#,
        )
        .bind(action_id)
        .bind(not_before)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn requeue(
        &self,
        action_id: Uuid,
        not_before: DateTime<Utc>,
        error: Option<&str>,
        count_attempt: bool,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE actions
            SET status = 'pending',
                scheduled_not_before = $2,
                last_error = COALESCE($3, last_error),
                attempt_count = attempt_count + $4,
                heartbeat_at = NULL,
                updated_at = $5
            WHERE id = $1 AND status = 'in_flight'
            "#,
        )
        .bind(action_id)
        .bind(not_before)
        .bind(error)
        .bind(if count_attempt { 1i32 } else { 0i32 })
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn recover_abandoned(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<Action>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            UPDATE actions
            SET status = 'pending',
                attempt_count = attempt_count + 1,
                last_error = 'abandoned in flight',
                heartbeat_at = NULL,
                updated_at = NOW()
            WHERE status = 'in_flight'
              AND COALESCE(heartbeat_at, updated_at) < $1
            RETURNING id, campaign_id, account_id, action_type, target, content, status,
                      scheduled_not_before, attempt_count, last_error, heartbeat_at,
                      created_at, updated_at, completed_at
            "#,
        )
        .bind(stale_before)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_action).collect()
    }

    async fn list_by_campaign(
        &self,
        campaign_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Action>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT id, campaign_id, account_id, action_type, target, content, status,
                   scheduled_not_before, attempt_count, last_error, heartbeat_at,
                   created_at, updated_at, completed_at
            FROM actions
            WHERE campaign_id = $1
            ORDER BY seq
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(campaign_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_action).collect()
    }

    async fn accounts_with_work(&self) -> Result<Vec<Uuid>, RepositoryError> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT a.account_id
            FROM actions a
            JOIN campaigns c ON c.id = a.campaign_id
            JOIN accounts acc ON acc.id = a.account_id
            WHERE a.status IN ('pending', 'skipped_quota')
              AND c.status = 'running'
              AND acc.status = 'active'
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }
}

fn row_to_action(row: &sqlx::postgres::PgRow) -> Result<Action, RepositoryError> {
    let action_type: String = row.try_get("action_type")?;
    let status: String = row.try_get("status")?;

    Ok(Action {
        id: row.try_get("id")?,
        campaign_id: row.try_get("campaign_id")?,
        account_id: row.try_get("account_id")?,
        action_type: parse_column(&action_type, "action type")?,
        payload: ActionPayload {
            target: row.try_get("target")?,
            content: row.try_get("content")?,
        },
        status: parse_column(&status, "action status")?,
        scheduled_not_before: row.try_get("scheduled_not_before")?,
        attempt_count: row.try_get("attempt_count")?,
        last_error: row.try_get("last_error")?,
        heartbeat_at: row.try_get("heartbeat_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        completed_at: row.try_get("completed_at")?,
    })
}
