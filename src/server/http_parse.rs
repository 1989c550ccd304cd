use crate::domain::{AccountStatus, ActionType, Platform};
use std::str::FromStr;

pub(super) fn parse_platform(platform: &str) -> Option<Platform> {
    Platform::from_str(platform.trim()).ok()
}

pub(super) fn parse_action_type(action_type: &str) -> Option<ActionType> {
    ActionType::from_str(action_type.trim()).ok()
}

pub(super) fn parse_account_status(status: &str) -> Option<AccountStatus> {
    AccountStatus::from_str(status.trim()).ok()
}

pub(super) fn allowed_action_types() -> Vec<String> {
    ActionType::ALL.iter().map(|t| t.to_string()).collect()
}
