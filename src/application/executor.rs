use crate::domain::{ActionPayload, ActionType, Platform};
use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

/// Decrypted account material handed to the executor for a single call.
#[derive(Clone, Serialize)]
pub struct AccountCredentials {
    pub account_id: Uuid,
    pub handle: String,
    pub secret: String,
    pub proxy: Option<String>,
}

impl std::fmt::Debug for AccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccountCredentials")
            .field("account_id", &self.account_id)
            .field("handle", &self.handle)
            .field("secret", &"<redacted>")
            .field("proxy", &self.proxy)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRequest {
    pub action_id: Uuid,
    pub platform: Platform,
    pub action_type: ActionType,
    pub payload: ActionPayload,
    pub credentials: AccountCredentials,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Permanent failure for this action; never retried.
    Failed(String),
    /// The platform pushed back on the account as a whole.
    RateLimited,
}

/// Performs one action against the target platform.
///
/// Implementations must not retry past a `RateLimited` answer; the lane owns
/// the retry and cool-down decision. Hanging calls are bounded by the lane's
/// timeout, so implementations need no timeout of their own.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest) -> Outcome;
}
