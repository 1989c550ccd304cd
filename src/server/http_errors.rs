use crate::application::{AccountError, SchedulerError};
use crate::infrastructure::RepositoryError;
use axum::http::StatusCode;

fn repository_error(err: &RepositoryError, fallback: &str) -> (StatusCode, serde_json::Value) {
    if err.is_unavailable() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({ "error": "Store unavailable, please retry" }),
        );
    }
    match err {
        RepositoryError::NotFound(_) => {
            (StatusCode::NOT_FOUND, serde_json::json!({ "error": "Not found" }))
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": fallback }),
        ),
    }
}

pub(super) fn map_scheduler_error(err: &SchedulerError) -> (StatusCode, serde_json::Value) {
    match err {
        SchedulerError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        SchedulerError::CampaignNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Campaign not found" }),
        ),
        SchedulerError::AccountNotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Account not found" }),
        ),
        SchedulerError::InvalidState(msg) => {
            (StatusCode::CONFLICT, serde_json::json!({ "error": msg }))
        }
        SchedulerError::PersistenceUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({ "error": "Store unavailable, please retry" }),
        ),
        SchedulerError::Repository(e) => repository_error(e, "Scheduler request failed"),
    }
}

pub(super) fn map_account_error(err: &AccountError) -> (StatusCode, serde_json::Value) {
    match err {
        AccountError::Validation(msg) => {
            (StatusCode::BAD_REQUEST, serde_json::json!({ "error": msg }))
        }
        AccountError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            serde_json::json!({ "error": "Account not found" }),
        ),
        AccountError::Repository(e) => repository_error(e, "Account request failed"),
        AccountError::Encryption(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": "Failed to secure credentials" }),
        ),
    }
}
