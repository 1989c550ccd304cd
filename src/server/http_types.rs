use crate::application::AccountOverview;
use crate::domain::{Account, Action, Campaign, LimitOverride, QuotaCounter};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

pub(super) const MAX_PAGINATION_LIMIT: i64 = 1000;

#[derive(Serialize, ToSchema)]
pub(super) struct HealthResponse {
    pub(super) status: String,
    pub(super) active_lanes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) error: Option<String>,
}

#[derive(Deserialize, Debug, IntoParams, ToSchema)]
pub(super) struct PaginationParams {
    #[serde(default = "default_limit")]
    #[param(default = 100, maximum = 1000)]
    pub(super) limit: i64,
    #[serde(default)]
    #[param(default = 0)]
    pub(super) offset: i64,
}

pub(super) fn default_limit() -> i64 {
    100
}

impl PaginationParams {
    pub(super) fn clamped(&self) -> (i64, i64) {
        (
            self.limit.clamp(1, MAX_PAGINATION_LIMIT),
            self.offset.max(0),
        )
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct RegisterAccountRequest {
    #[schema(example = "instagram")]
    pub(super) platform: String,
    #[schema(example = "acme_growth")]
    pub(super) handle: String,
    /// Session material forwarded to the executor; stored encrypted.
    pub(super) credentials: String,
    pub(super) proxy: Option<String>,
    #[schema(example = "Europe/Berlin")]
    pub(super) timezone: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub(super) struct SetAccountStatusRequest {
    #[schema(example = "disabled")]
    pub(super) status: String,
}

#[derive(Serialize, ToSchema)]
pub(super) struct AccountResponse {
    pub(super) id: Uuid,
    pub(super) tenant_id: Uuid,
    pub(super) platform: String,
    pub(super) handle: String,
    pub(super) status: String,
    pub(super) proxy: Option<String>,
    pub(super) timezone: String,
    #[schema(format = "date-time")]
    pub(super) rate_limited_until: Option<DateTime<Utc>>,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: DateTime<Utc>,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            id: account.id,
            tenant_id: account.tenant_id,
            platform: account.platform.to_string(),
            handle: account.handle,
            status: account.status.to_string(),
            proxy: account.proxy,
            timezone: account.timezone,
            rate_limited_until: account.rate_limited_until,
            created_at: account.created_at,
            updated_at: account.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct QuotaUsageResponse {
    pub(super) action_type: String,
    pub(super) count: i32,
    pub(super) max: i32,
    pub(super) remaining: i32,
}

impl From<QuotaCounter> for QuotaUsageResponse {
    fn from(counter: QuotaCounter) -> Self {
        Self {
            action_type: counter.action_type.to_string(),
            count: counter.count,
            max: counter.max,
            remaining: counter.remaining(),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct AccountOverviewResponse {
    pub(super) account: AccountResponse,
    pub(super) quota_day: NaiveDate,
    pub(super) usage: Vec<QuotaUsageResponse>,
}

impl From<AccountOverview> for AccountOverviewResponse {
    fn from(overview: AccountOverview) -> Self {
        Self {
            account: overview.account.into(),
            quota_day: overview.quota_day,
            usage: overview.usage.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct SetLimitsRequest {
    /// Omit to set the tenant-wide default.
    pub(super) account_id: Option<Uuid>,
    #[schema(example = "follow")]
    pub(super) action_type: String,
    #[schema(example = 100)]
    pub(super) daily_max: i32,
    #[schema(example = 45)]
    pub(super) min_interval_s: i32,
    #[schema(example = 120)]
    pub(super) max_interval_s: i32,
    #[schema(example = 3)]
    pub(super) max_attempts: i32,
    #[schema(example = 30)]
    pub(super) executor_timeout_s: i32,
}

#[derive(Serialize, ToSchema)]
pub(super) struct LimitsResponse {
    pub(super) tenant_id: Uuid,
    pub(super) account_id: Option<Uuid>,
    pub(super) action_type: String,
    pub(super) daily_max: i32,
    pub(super) min_interval_s: i32,
    pub(super) max_interval_s: i32,
    pub(super) max_attempts: i32,
    pub(super) executor_timeout_s: i32,
}

impl From<LimitOverride> for LimitsResponse {
    fn from(limit: LimitOverride) -> Self {
        Self {
            tenant_id: limit.tenant_id,
            account_id: limit.account_id,
            action_type: limit.action_type.to_string(),
            daily_max: limit.limits.daily_max,
            min_interval_s: limit.limits.min_interval_s,
            max_interval_s: limit.limits.max_interval_s,
            max_attempts: limit.limits.max_attempts,
            executor_timeout_s: limit.limits.executor_timeout_s,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub(super) struct CreateCampaignRequest {
    #[schema(example = "follow")]
    pub(super) action_type: String,
    pub(super) account_id: Option<Uuid>,
    #[serde(default)]
    pub(super) account_pool: Vec<Uuid>,
    pub(super) targets: Vec<String>,
    pub(super) content: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub(super) struct CampaignResponse {
    pub(super) id: Uuid,
    pub(super) tenant_id: Uuid,
    pub(super) action_type: String,
    pub(super) status: String,
    pub(super) account_ids: Vec<Uuid>,
    pub(super) total: i32,
    pub(super) sent: i32,
    pub(super) failed: i32,
    pub(super) cancelled: i32,
    pub(super) pending: i32,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: DateTime<Utc>,
    #[schema(format = "date-time")]
    pub(super) completed_at: Option<DateTime<Utc>>,
}

impl From<Campaign> for CampaignResponse {
    fn from(campaign: Campaign) -> Self {
        Self {
            pending: campaign.pending(),
            id: campaign.id,
            tenant_id: campaign.tenant_id,
            action_type: campaign.action_type.to_string(),
            status: campaign.status.to_string(),
            account_ids: campaign.account_ids,
            total: campaign.total,
            sent: campaign.sent,
            failed: campaign.failed,
            cancelled: campaign.cancelled,
            created_at: campaign.created_at,
            updated_at: campaign.updated_at,
            completed_at: campaign.completed_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub(super) struct ActionResponse {
    pub(super) id: Uuid,
    pub(super) account_id: Uuid,
    pub(super) action_type: String,
    pub(super) target: String,
    pub(super) status: String,
    pub(super) scheduled_not_before: DateTime<Utc>,
    pub(super) attempt_count: i32,
    pub(super) last_error: Option<String>,
    #[schema(format = "date-time")]
    pub(super) completed_at: Option<DateTime<Utc>>,
}

impl From<Action> for ActionResponse {
    fn from(action: Action) -> Self {
        Self {
            id: action.id,
            account_id: action.account_id,
            action_type: action.action_type.to_string(),
            target: action.payload.target,
            status: action.status.to_string(),
            scheduled_not_before: action.scheduled_not_before,
            attempt_count: action.attempt_count,
            last_error: action.last_error,
            completed_at: action.completed_at,
        }
    }
}
