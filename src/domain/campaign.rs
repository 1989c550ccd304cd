use super::ActionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub action_type: ActionType,
    pub account_ids: Vec<Uuid>,
    pub content: Option<String>,
    pub status: CampaignStatus,
    pub total: i32,
    pub sent: i32,
    pub failed: i32,
    pub cancelled: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CampaignStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Cancelled,
}

impl CampaignStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Cancelled)
    }
}

impl Campaign {
    pub fn new(
        tenant_id: Uuid,
        action_type: ActionType,
        account_ids: Vec<Uuid>,
        content: Option<String>,
        total: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            action_type,
            account_ids,
            content,
            status: CampaignStatus::Pending,
            total,
            sent: 0,
            failed: 0,
            cancelled: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Actions not yet settled, including in-flight and quota-deferred ones.
    /// `sent + failed + pending + cancelled == total` holds by construction.
    pub fn pending(&self) -> i32 {
        self.total - self.sent - self.failed - self.cancelled
    }

    pub fn is_settled(&self) -> bool {
        self.pending() == 0
    }
}
