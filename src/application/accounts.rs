use super::limits::LimitsResolver;
use super::quota::QuotaTracker;
use crate::domain::{
    parse_timezone, quota_day, Account, ActionLimits, ActionType, LimitOverride, Platform,
    QuotaCounter,
};
use crate::infrastructure::{
    AccountRepository, CredentialVault, EncryptionError, LimitsRepository, RepositoryError,
};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[derive(Error, Debug)]
pub enum AccountError {
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Account not found: {0}")]
    NotFound(Uuid),
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
    #[error("Encryption error: {0}")]
    Encryption(#[from] EncryptionError),
}

#[derive(Debug, Clone)]
pub struct RegisterAccount {
    pub platform: Platform,
    pub handle: String,
    /// Opaque session material for the executor; sealed before storage.
    pub credentials: String,
    pub proxy: Option<String>,
    pub timezone: Option<String>,
}

/// An account with today's quota usage, as the dashboard shows it.
#[derive(Debug, Clone, Serialize)]
pub struct AccountOverview {
    pub account: Account,
    pub quota_day: NaiveDate,
    pub usage: Vec<QuotaCounter>,
}

pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    limits_repo: Arc<dyn LimitsRepository>,
    limits: LimitsResolver,
    quota: QuotaTracker,
    vault: Arc<CredentialVault>,
    default_timezone: Tz,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        limits_repo: Arc<dyn LimitsRepository>,
        quota: QuotaTracker,
        vault: Arc<CredentialVault>,
        default_timezone: Tz,
    ) -> Self {
        Self {
            accounts,
            limits: LimitsResolver::new(limits_repo.clone()),
            limits_repo,
            quota,
            vault,
            default_timezone,
        }
    }

    pub async fn register(
        &self,
        tenant_id: Uuid,
        request: RegisterAccount,
    ) -> Result<Account, AccountError> {
        let handle = request.handle.trim();
        if handle.is_empty() {
            return Err(AccountError::Validation("handle must not be empty".to_string()));
        }
        if request.credentials.is_empty() {
            return Err(AccountError::Validation(
                "credentials must not be empty".to_string(),
            ));
        }

        let timezone = match request.timezone.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => parse_timezone(name)
                .ok_or_else(|| AccountError::Validation(format!("unknown timezone: {}", name)))?,
            _ => self.default_timezone,
        };

        let sealed = self.vault.seal(&request.credentials)?;
        let proxy = request
            .proxy
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());

        let account = Account::new(
            tenant_id,
            request.platform,
            handle.to_string(),
            timezone.name().to_string(),
            proxy,
            sealed,
        );
        self.accounts.create(&account).await?;

        info!(
            account_id = %account.id,
            %tenant_id,
            platform = %account.platform,
            "Registered account"
        );
        Ok(account)
    }

    pub async fn get(&self, tenant_id: Uuid, account_id: Uuid) -> Result<Account, AccountError> {
        match self.accounts.get_by_id(account_id).await {
            Ok(account) if account.tenant_id == tenant_id => Ok(account),
            Ok(_) | Err(RepositoryError::NotFound(_)) => Err(AccountError::NotFound(account_id)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn overview(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
    ) -> Result<AccountOverview, AccountError> {
        let account = self.get(tenant_id, account_id).await?;
        let tz = parse_timezone(&account.timezone).unwrap_or(self.default_timezone);
        let day = quota_day(Utc::now(), tz);
        let usage = self.quota.usage(account.id, day).await?;

        Ok(AccountOverview {
            account,
            quota_day: day,
            usage,
        })
    }

    pub async fn list(
        &self,
        tenant_id: Uuid,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Account>, AccountError> {
        Ok(self.accounts.list_by_tenant(tenant_id, limit, offset).await?)
    }

    /// Store an override for the tenant, or for one of its accounts when
    /// `account_id` is given.
    pub async fn set_limits(
        &self,
        tenant_id: Uuid,
        account_id: Option<Uuid>,
        action_type: ActionType,
        limits: ActionLimits,
    ) -> Result<LimitOverride, AccountError> {
        limits
            .validate()
            .map_err(|e| AccountError::Validation(e.to_string()))?;

        if let Some(id) = account_id {
            self.get(tenant_id, id).await?;
        }

        let limit = LimitOverride {
            tenant_id,
            account_id,
            action_type,
            limits,
        };
        self.limits_repo.upsert(&limit).await?;

        info!(
            %tenant_id,
            account_id = ?account_id,
            %action_type,
            daily_max = limits.daily_max,
            "Updated action limits"
        );
        Ok(limit)
    }

    pub async fn effective_limits(
        &self,
        tenant_id: Uuid,
        account_id: Uuid,
        action_type: ActionType,
    ) -> Result<ActionLimits, AccountError> {
        let account = self.get(tenant_id, account_id).await?;
        Ok(self.limits.resolve(&account, action_type).await?)
    }
}
