use crate::domain::{Action, ActionPayload, ActionType, Campaign};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use uuid::Uuid;

pub const MAX_TARGETS: usize = 10_000;
pub const MAX_TARGET_LEN: usize = 512;
pub const MAX_CONTENT_LEN: usize = 10_000;

/// A batch as submitted by the dashboard, before any account lookups.
#[derive(Debug, Clone)]
pub struct CampaignRequest {
    pub action_type: ActionType,
    /// Single account or a pool to spread the targets over.
    pub account_ids: Vec<Uuid>,
    pub targets: Vec<String>,
    pub content: Option<String>,
}

/// Shape-checked request: targets trimmed and kept one per submitted entry,
/// accounts de-duplicated, content present when the action needs it.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedCampaign {
    pub action_type: ActionType,
    pub account_ids: Vec<Uuid>,
    pub targets: Vec<String>,
    pub content: Option<String>,
}

impl CampaignRequest {
    pub fn validate(&self) -> Result<ValidatedCampaign, String> {
        if self.targets.is_empty() {
            return Err("targets must not be empty".to_string());
        }
        if self.targets.len() > MAX_TARGETS {
            return Err(format!("at most {} targets per campaign", MAX_TARGETS));
        }
        if self.account_ids.is_empty() {
            return Err("an account_id or account_pool is required".to_string());
        }

        let mut seen_accounts = HashSet::new();
        let account_ids: Vec<Uuid> = self
            .account_ids
            .iter()
            .copied()
            .filter(|id| seen_accounts.insert(*id))
            .collect();

        let mut targets = Vec::with_capacity(self.targets.len());
        for raw in &self.targets {
            let target = raw.trim();
            if target.is_empty() {
                return Err("targets must not contain blank entries".to_string());
            }
            if target.len() > MAX_TARGET_LEN {
                return Err(format!(
                    "target exceeds {} characters: {}...",
                    MAX_TARGET_LEN,
                    target.chars().take(32).collect::<String>()
                ));
            }
            targets.push(target.to_string());
        }

        let content = self
            .content
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        if self.action_type.requires_content() && content.is_none() {
            return Err(format!("{} campaigns require content", self.action_type));
        }
        if content.as_ref().is_some_and(|c| c.len() > MAX_CONTENT_LEN) {
            return Err(format!("content exceeds {} characters", MAX_CONTENT_LEN));
        }

        Ok(ValidatedCampaign {
            action_type: self.action_type,
            account_ids,
            targets,
            content,
        })
    }
}

/// Expand a validated batch into its campaign row and one action per target,
/// assigned round-robin over `eligible` accounts. Actions come back in
/// submission order, which is also their queue order.
pub fn expand(
    tenant_id: Uuid,
    batch: &ValidatedCampaign,
    eligible: &[Uuid],
    now: DateTime<Utc>,
) -> (Campaign, Vec<Action>) {
    let mut campaign = Campaign::new(
        tenant_id,
        batch.action_type,
        eligible.to_vec(),
        batch.content.clone(),
        batch.targets.len() as i32,
    );
    campaign.created_at = now;
    campaign.updated_at = now;

    let actions = batch
        .targets
        .iter()
        .zip(eligible.iter().cycle())
        .map(|(target, account_id)| {
            let mut action = Action::new(
                campaign.id,
                *account_id,
                batch.action_type,
                ActionPayload {
                    target: target.clone(),
                    content: batch.content.clone(),
                },
                now,
            );
            action.created_at = now;
            action.updated_at = now;
            action
        })
        .collect();

    (campaign, actions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(action_type: ActionType, targets: &[&str]) -> CampaignRequest {
        CampaignRequest {
            action_type,
            account_ids: vec![Uuid::new_v4()],
            targets: targets.iter().map(|t| t.to_string()).collect(),
            content: None,
        }
    }

    #[test]
    fn empty_targets_are_rejected() {
        assert!(request(ActionType::Follow, &[]).validate().is_err());
    }

    #[test]
    fn missing_accounts_are_rejected() {
        let mut req = request(ActionType::Follow, &["a"]);
        req.account_ids.clear();
        assert!(req.validate().is_err());
    }

    #[test]
    fn dm_without_content_is_rejected() {
        let err = request(ActionType::Dm, &["alice"]).validate().unwrap_err();
        assert_eq!(err, "dm campaigns require content");

        let mut req = request(ActionType::Dm, &["alice"]);
        req.content = Some("   ".to_string());
        assert!(req.validate().is_err());

        req.content = Some(" hi there ".to_string());
        assert_eq!(req.validate().unwrap().content.as_deref(), Some("hi there"));
    }

    #[test]
    fn blank_target_is_rejected() {
        assert!(request(ActionType::Upvote, &["t3_abc", "  "])
            .validate()
            .is_err());
    }

    #[test]
    fn repeated_targets_each_keep_their_entry() {
        let batch = request(ActionType::Follow, &["carol", " alice", "carol", "bob", "alice "])
            .validate()
            .unwrap();
        assert_eq!(batch.targets, vec!["carol", "alice", "carol", "bob", "alice"]);

        let (campaign, actions) = expand(Uuid::new_v4(), &batch, &batch.account_ids, Utc::now());
        assert_eq!(campaign.total, 5);
        assert_eq!(actions.len(), 5);
    }

    #[test]
    fn repeated_accounts_collapse_into_one_pool_entry() {
        let a = Uuid::new_v4();
        let mut req = request(ActionType::Follow, &["x"]);
        req.account_ids = vec![a, a];
        assert_eq!(req.validate().unwrap().account_ids, vec![a]);
    }

    #[test]
    fn too_many_targets_are_rejected() {
        let targets: Vec<String> = (0..=MAX_TARGETS).map(|i| format!("user{i}")).collect();
        let req = CampaignRequest {
            action_type: ActionType::Follow,
            account_ids: vec![Uuid::new_v4()],
            targets,
            content: None,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn expansion_round_robins_over_accounts() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let batch = ValidatedCampaign {
            action_type: ActionType::Dm,
            account_ids: vec![a, b],
            targets: (1..=5).map(|i| format!("user{i}")).collect(),
            content: Some("hello".to_string()),
        };
        let now = Utc::now();

        let (campaign, actions) = expand(Uuid::new_v4(), &batch, &[a, b], now);

        assert_eq!(campaign.total, 5);
        assert_eq!(campaign.pending(), 5);
        let owners: Vec<Uuid> = actions.iter().map(|x| x.account_id).collect();
        assert_eq!(owners, vec![a, b, a, b, a]);
        assert!(actions.iter().all(|x| x.campaign_id == campaign.id));
        assert!(actions.iter().all(|x| x.scheduled_not_before == now));
        assert_eq!(actions[3].payload.target, "user4");
        assert_eq!(actions[3].payload.content.as_deref(), Some("hello"));
    }

    #[test]
    fn single_account_takes_everything() {
        let a = Uuid::new_v4();
        let batch = request(ActionType::Save, &["p1", "p2", "p3"])
            .validate()
            .unwrap();

        let (_, actions) = expand(Uuid::new_v4(), &batch, &[a], Utc::now());
        assert!(actions.iter().all(|x| x.account_id == a));
    }
}
