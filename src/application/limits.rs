use crate::domain::{Account, ActionLimits, ActionType};
use crate::infrastructure::{LimitsRepository, RepositoryError};
use std::sync::Arc;

/// Resolves effective limits: account override, then tenant override, then
/// the built-in defaults for the action type.
#[derive(Clone)]
pub struct LimitsResolver {
    repo: Arc<dyn LimitsRepository>,
}

impl LimitsResolver {
    pub fn new(repo: Arc<dyn LimitsRepository>) -> Self {
        Self { repo }
    }

    pub async fn resolve(
        &self,
        account: &Account,
        action_type: ActionType,
    ) -> Result<ActionLimits, RepositoryError> {
        let found = self
            .repo
            .find(account.tenant_id, account.id, action_type)
            .await?;
        Ok(found.unwrap_or_else(|| ActionLimits::default_for(action_type)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Platform;
    use crate::infrastructure::MockLimitsRepository;

    fn account() -> Account {
        Account::new(
            uuid::Uuid::new_v4(),
            Platform::Reddit,
            "lanes_test".to_string(),
            "UTC".to_string(),
            None,
            vec![0; 16],
        )
    }

    #[tokio::test]
    async fn falls_back_to_defaults() {
        let mut repo = MockLimitsRepository::new();
        repo.expect_find().returning(|_, _, _| Ok(None));

        let resolver = LimitsResolver::new(Arc::new(repo));
        let limits = resolver
            .resolve(&account(), ActionType::Upvote)
            .await
            .unwrap();

        assert_eq!(limits, ActionLimits::default_for(ActionType::Upvote));
    }

    #[tokio::test]
    async fn override_wins_over_defaults() {
        let custom = ActionLimits {
            daily_max: 2,
            ..ActionLimits::default_for(ActionType::Follow)
        };
        let mut repo = MockLimitsRepository::new();
        repo.expect_find().returning(move |_, _, _| Ok(Some(custom)));

        let resolver = LimitsResolver::new(Arc::new(repo));
        let limits = resolver
            .resolve(&account(), ActionType::Follow)
            .await
            .unwrap();

        assert_eq!(limits.daily_max, 2);
    }
}
