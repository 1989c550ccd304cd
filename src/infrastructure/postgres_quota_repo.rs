use crate::domain::{ActionLimits, ActionType, LimitOverride, QuotaCounter, Reservation};
use crate::infrastructure::repository::{
    parse_column, LimitsRepository, QuotaRepository, RepositoryError,
};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

pub struct PostgresQuotaRepository {
    pool: PgPool,
}

impl PostgresQuotaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuotaRepository for PostgresQuotaRepository {
    async fn try_reserve(
        &self,
        account_id: Uuid,
        action_type: ActionType,
        day: NaiveDate,
        max: i32,
    ) -> Result<Reservation, RepositoryError> {
        // The conflict arm only fires while count < max.
        let row = sqlx::query(
            r#"
            INSERT INTO quota_counters (account_id, action_type, day, count, max, updated_at)
            SELECT $1, $2, $3, 1, $4::int, $5
            WHERE $4::int > 0
            ON CONFLICT (account_id, action_type, day) DO UPDATE
            SET count = quota_counters.count + 1,
                max = EXCLUDED.max,
                updated_at = EXCLUDED.updated_at
            WHERE quota_counters.count < EXCLUDED.max
            RETURNING count, max
            "#,
        )
        .bind(account_id)
        .bind(action_type.to_string())
        .bind(day)
        .bind(max)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let count: i32 = row.try_get("count")?;
                let max: i32 = row.try_get("max")?;
                Ok(Reservation::granted(max - count))
            }
            None => Ok(Reservation::denied()),
        }
    }

    async fn release(
        &self,
        account_id: Uuid,
        action_type: ActionType,
        day: NaiveDate,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE quota_counters
            SET count = count - 1, updated_at = $4
            WHERE account_id = $1 AND action_type = $2 AND day = $3 AND count > 0
            "#,
        )
        .bind(account_id)
        .bind(action_type.to_string())
        .bind(day)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn usage_for_day(
        &self,
        account_id: Uuid,
        day: NaiveDate,
    ) -> Result<Vec<QuotaCounter>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, action_type, day, count, max
            FROM quota_counters
            WHERE account_id = $1 AND day = $2
            ORDER BY action_type
            "#,
        )
        .bind(account_id)
        .bind(day)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| -> Result<QuotaCounter, RepositoryError> {
                let action_type: String = row.try_get("action_type")?;
                Ok(QuotaCounter {
                    account_id: row.try_get("account_id")?,
                    action_type: parse_column(&action_type, "action type")?,
                    day: row.try_get("day")?,
                    count: row.try_get("count")?,
                    max: row.try_get("max")?,
                })
            })
            .collect()
    }
}

pub struct PostgresLimitsRepository {
    pool: PgPool,
}

impl PostgresLimitsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LimitsRepository for PostgresLimitsRepository {
    async fn upsert(&self, limit: &LimitOverride) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO action_limits (tenant_id, account_id, action_type, daily_max,
                                       min_interval_s, max_interval_s, max_attempts,
                                       executor_timeout_s, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (tenant_id, (COALESCE(account_id, '00000000-0000-0000-0000-000000000000'::uuid)), action_type)
            DO UPDATE SET
                daily_max = EXCLUDED.daily_max,
                min_interval_s = EXCLUDED.min_interval_s,
                max_interval_s = EXCLUDED.max_interval_s,
                max_attempts = EXCLUDED.max_attempts,
                executor_timeout_s = EXCLUDED.executor_timeout_s,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(limit.tenant_id)
        .bind(limit.account_id)
        .bind(limit.action_type.to_string())
        .bind(limit.limits.daily_max)
        .bind(limit.limits.min_interval_s)
        .bind(limit.limits.max_interval_s)
        .bind(limit.limits.max_attempts)
        .bind(limit.limits.executor_timeout_s)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        action_type: ActionType,
    ) -> Result<Option<ActionLimits>, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT daily_max, min_interval_s, max_interval_s, max_attempts, executor_timeout_s
            FROM action_limits
            WHERE tenant_id = $1
              AND action_type = $3
              AND (account_id = $2 OR account_id IS NULL)
            ORDER BY account_id NULLS LAST
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(account_id)
        .bind(action_type.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<ActionLimits, RepositoryError> {
            Ok(ActionLimits {
                daily_max: row.try_get("daily_max")?,
                min_interval_s: row.try_get("min_interval_s")?,
                max_interval_s: row.try_get("max_interval_s")?,
                max_attempts: row.try_get("max_attempts")?,
                executor_timeout_s: row.try_get("executor_timeout_s")?,
            })
        })
        .transpose()
    }
}
