use axum::http::{header, header::HeaderMap};
use uuid::Uuid;

pub(super) const TENANT_HEADER: &str = "x-tenant-id";

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

/// An empty expected token leaves the API open (local development).
pub(super) fn is_authorized(headers: &HeaderMap, expected_token: &str) -> bool {
    expected_token.is_empty() || extract_bearer_token(headers) == Some(expected_token)
}

pub(super) fn extract_tenant_id(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}
