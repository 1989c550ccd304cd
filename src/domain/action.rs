use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionType {
    Follow,
    Unfollow,
    Dm,
    Post,
    Upvote,
    CommentMention,
    JoinGroup,
    Save,
}

impl ActionType {
    pub const ALL: [ActionType; 8] = [
        ActionType::Follow,
        ActionType::Unfollow,
        ActionType::Dm,
        ActionType::Post,
        ActionType::Upvote,
        ActionType::CommentMention,
        ActionType::JoinGroup,
        ActionType::Save,
    ];

    /// Whether the payload must carry text to deliver (message, post body, comment).
    pub fn requires_content(&self) -> bool {
        matches!(
            self,
            ActionType::Dm | ActionType::Post | ActionType::CommentMention
        )
    }
}

/// `pending -> in_flight -> completed | failed`, with `skipped_quota` as a
/// waiting detour and `cancelled` reachable from any waiting state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    InFlight,
    Completed,
    Failed,
    SkippedQuota,
    Cancelled,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ActionStatus::Completed | ActionStatus::Failed | ActionStatus::Cancelled
        )
    }

    /// Not yet dispatched; eligible once `scheduled_not_before` passes.
    pub fn is_waiting(&self) -> bool {
        matches!(self, ActionStatus::Pending | ActionStatus::SkippedQuota)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionPayload {
    pub target: String,
    pub content: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Action {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub account_id: Uuid,
    pub action_type: ActionType,
    pub payload: ActionPayload,
    pub status: ActionStatus,
    pub scheduled_not_before: DateTime<Utc>,
    pub attempt_count: i32,
    pub last_error: Option<String>,
    pub heartbeat_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Action {
    pub fn new(
        campaign_id: Uuid,
        account_id: Uuid,
        action_type: ActionType,
        payload: ActionPayload,
        scheduled_not_before: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            campaign_id,
            account_id,
            action_type,
            payload,
            status: ActionStatus::Pending,
            scheduled_not_before,
            attempt_count: 0,
            last_error: None,
            heartbeat_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

/// Final disposition written by `mark_completed`.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Completed,
    Failed(String),
}

impl Resolution {
    pub fn status(&self) -> ActionStatus {
        match self {
            Resolution::Completed => ActionStatus::Completed,
            Resolution::Failed(_) => ActionStatus::Failed,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Resolution::Completed => None,
            Resolution::Failed(reason) => Some(reason.as_str()),
        }
    }
}
