use crate::application::executor::{ExecutionRequest, Executor, Outcome};
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

#[derive(Error, Debug)]
pub enum HttpExecutorError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
/// Longest failure reason kept as the action's `last_error`, in characters.
const MAX_REASON_LEN: usize = 512;

/// What a single HTTP answer means for the action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Success,
    RateLimited,
    Rejected,
    Retry,
}

fn classify_status(status: StatusCode) -> Verdict {
    if status.is_success() {
        Verdict::Success
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Verdict::RateLimited
    } else if status.is_client_error() {
        Verdict::Rejected
    } else {
        Verdict::Retry
    }
}

fn rejection_reason(status: StatusCode, body: &str) -> String {
    let body = body.trim();
    if body.is_empty() {
        return format!("executor rejected action ({})", status);
    }
    if body.chars().count() <= MAX_REASON_LEN {
        return body.to_string();
    }
    let mut reason: String = body.chars().take(MAX_REASON_LEN).collect();
    reason.push_str("...");
    reason
}

/// Executor that forwards each action to the platform integration service
/// at `POST {base_url}/execute`.
pub struct HttpExecutor {
    client: Client,
    base_url: String,
}

impl HttpExecutor {
    pub fn new(base_url: &str, token: &str) -> Result<Self, HttpExecutorError> {
        let mut headers = header::HeaderMap::new();
        if !token.is_empty() {
            let auth_value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| {
                    HttpExecutorError::InvalidConfig(format!("Invalid executor token: {}", e))
                })?;
            headers.insert(header::AUTHORIZATION, auth_value);
        }
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| {
                HttpExecutorError::InvalidConfig(format!("Failed to create HTTP client: {}", e))
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Executor for HttpExecutor {
    async fn execute(&self, request: ExecutionRequest) -> Outcome {
        let url = format!("{}/execute", self.base_url);
        let mut last_error = String::from("max retries exceeded");

        for attempt in 0..MAX_RETRIES {
            match self.client.post(&url).json(&request).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    match classify_status(status) {
                        Verdict::Success => return Outcome::Success,
                        Verdict::RateLimited => return Outcome::RateLimited,
                        Verdict::Rejected => {
                            let body = resp.text().await.unwrap_or_default();
                            return Outcome::Failed(rejection_reason(status, &body));
                        }
                        Verdict::Retry => {
                            last_error = format!("executor returned {}", status);
                        }
                    }
                }
                Err(e) => {
                    last_error = e.to_string();
                }
            }

            if attempt < MAX_RETRIES - 1 {
                warn!(
                    action_id = %request.action_id,
                    attempt = attempt + 1,
                    error = %last_error,
                    "Executor call failed, retrying"
                );
                let backoff = INITIAL_BACKOFF_MS * 2_u64.pow(attempt);
                sleep(Duration::from_millis(backoff)).await;
            }
        }

        Outcome::Failed(last_error)
    }
}
