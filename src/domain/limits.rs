use super::ActionType;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Pacing and retry limits for one action type on one account.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Validate)]
#[validate(schema(function = "validate_interval"))]
pub struct ActionLimits {
    #[validate(range(min = 0, max = 100000))]
    pub daily_max: i32,
    #[validate(range(min = 0, max = 86400))]
    pub min_interval_s: i32,
    #[validate(range(min = 0, max = 86400))]
    pub max_interval_s: i32,
    #[validate(range(min = 1, max = 20))]
    pub max_attempts: i32,
    #[validate(range(min = 1, max = 600))]
    pub executor_timeout_s: i32,
}

fn validate_interval(limits: &ActionLimits) -> Result<(), ValidationError> {
    if limits.min_interval_s > limits.max_interval_s {
        let mut err = ValidationError::new("min_interval_exceeds_max");
        err.message = Some("min_interval_s must not exceed max_interval_s".into());
        return Err(err);
    }
    Ok(())
}

impl ActionLimits {
    /// Built-in limits used when neither the account nor its tenant has an override.
    pub fn default_for(action_type: ActionType) -> Self {
        let (daily_max, min_interval_s, max_interval_s) = match action_type {
            ActionType::Follow | ActionType::Unfollow => (100, 45, 120),
            ActionType::Dm => (50, 60, 180),
            ActionType::Post => (10, 300, 900),
            ActionType::Upvote | ActionType::Save => (200, 20, 60),
            ActionType::CommentMention => (30, 90, 240),
            ActionType::JoinGroup => (20, 120, 300),
        };

        Self {
            daily_max,
            min_interval_s,
            max_interval_s,
            max_attempts: 3,
            executor_timeout_s: 30,
        }
    }

    pub fn executor_timeout(&self) -> Duration {
        Duration::from_secs(self.executor_timeout_s.max(1) as u64)
    }
}

/// A persisted override. `account_id == None` applies to every account of the tenant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LimitOverride {
    pub tenant_id: Uuid,
    pub account_id: Option<Uuid>,
    pub action_type: ActionType,
    pub limits: ActionLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid_for_every_action_type() {
        for action_type in ActionType::ALL {
            let limits = ActionLimits::default_for(action_type);
            assert!(limits.validate().is_ok(), "{action_type} defaults invalid");
        }
    }

    #[test]
    fn inverted_interval_is_rejected() {
        let limits = ActionLimits {
            min_interval_s: 30,
            max_interval_s: 10,
            ..ActionLimits::default_for(ActionType::Follow)
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn equal_interval_is_a_fixed_delay_and_allowed() {
        let limits = ActionLimits {
            min_interval_s: 15,
            max_interval_s: 15,
            ..ActionLimits::default_for(ActionType::Upvote)
        };
        assert!(limits.validate().is_ok());
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let limits = ActionLimits {
            max_attempts: 0,
            ..ActionLimits::default_for(ActionType::Dm)
        };
        assert!(limits.validate().is_err());
    }
}
