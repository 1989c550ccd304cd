use super::http_auth::{extract_tenant_id, is_authorized};
use super::http_errors::{map_account_error, map_scheduler_error};
use super::http_parse::{
    allowed_action_types, parse_account_status, parse_action_type, parse_platform,
};
use super::http_types::{
    AccountOverviewResponse, AccountResponse, ActionResponse, CampaignResponse,
    CreateCampaignRequest, HealthResponse, LimitsResponse, PaginationParams,
    RegisterAccountRequest, SetAccountStatusRequest, SetLimitsRequest,
};
use super::state::AppState;
use crate::application::{CampaignRequest, RegisterAccount};
use crate::domain::ActionLimits;
use axum::{
    extract::{Path, Query, State},
    http::{header::HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

type JsonResponse = (StatusCode, Json<serde_json::Value>);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/accounts", post(register_account).get(list_accounts))
        .route("/accounts/:id", get(get_account))
        .route("/accounts/:id/status", post(set_account_status))
        .route("/limits", put(set_limits))
        .route("/campaigns", post(create_campaign).get(list_campaigns))
        .route("/campaigns/:id", get(get_campaign))
        .route("/campaigns/:id/actions", get(list_campaign_actions))
        .route("/campaigns/:id/cancel", post(cancel_campaign))
        .route("/campaigns/:id/pause", post(pause_campaign))
        .route("/campaigns/:id/resume", post(resume_campaign))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        register_account,
        list_accounts,
        get_account,
        set_account_status,
        set_limits,
        create_campaign,
        list_campaigns,
        get_campaign,
        list_campaign_actions,
        cancel_campaign,
        pause_campaign,
        resume_campaign,
    ),
    components(
        schemas(
            HealthResponse,
            RegisterAccountRequest,
            SetAccountStatusRequest,
            AccountResponse,
            AccountOverviewResponse,
            SetLimitsRequest,
            LimitsResponse,
            CreateCampaignRequest,
            CampaignResponse,
            ActionResponse,
        )
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Accounts", description = "External account registry and limits"),
        (name = "Campaigns", description = "Campaign submission and lifecycle"),
    ),
    info(
        title = "Action Lanes API",
        version = "0.1.0",
        description = "Quota-aware, paced execution of bulk social-network actions",
        license(name = "MIT")
    )
)]
struct ApiDoc;

/// Bearer check plus the tenant the request acts for.
fn authorize(state: &AppState, headers: &HeaderMap) -> Result<Uuid, JsonResponse> {
    if !is_authorized(headers, &state.api_token) {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "Unauthorized" })),
        ));
    }
    extract_tenant_id(headers).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "Missing or invalid X-Tenant-Id header" })),
        )
    })
}

fn error_response((status, body): (StatusCode, serde_json::Value)) -> JsonResponse {
    (status, Json(body))
}

/// Health check endpoint
///
/// Verifies database connectivity and reports how many lanes are running.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Service is unhealthy", body = HealthResponse)
    )
)]
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let active_lanes = state.scheduler.active_lanes().await.len();

    match sqlx::query("SELECT 1").fetch_one(&state.pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "healthy".to_string(),
                active_lanes,
                error: None,
            }),
        ),
        Err(e) => {
            error!(error = %e, "Health check failed: DB connectivity issue");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    active_lanes,
                    error: Some("Database connectivity failed".to_string()),
                }),
            )
        }
    }
}

/// Register an external account
#[utoipa::path(
    post,
    path = "/accounts",
    tag = "Accounts",
    request_body = RegisterAccountRequest,
    responses(
        (status = 201, description = "Account registered", body = AccountResponse),
        (status = 400, description = "Invalid platform, handle or timezone", body = Object),
        (status = 401, description = "Unauthorized", body = Object)
    )
)]
async fn register_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<RegisterAccountRequest>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };

    let Some(platform) = parse_platform(&req.platform) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid platform",
                "allowed": ["instagram", "pinterest", "reddit", "x", "whatsapp", "facebook", "linkedin"]
            })),
        );
    };

    let request = RegisterAccount {
        platform,
        handle: req.handle,
        credentials: req.credentials,
        proxy: req.proxy,
        timezone: req.timezone,
    };

    match state.accounts.register(tenant_id, request).await {
        Ok(account) => (
            StatusCode::CREATED,
            Json(serde_json::json!(AccountResponse::from(account))),
        ),
        Err(e) => {
            warn!(error = %e, "Failed to register account");
            error_response(map_account_error(&e))
        }
    }
}

#[utoipa::path(
    get,
    path = "/accounts",
    tag = "Accounts",
    params(PaginationParams),
    responses(
        (status = 200, description = "Accounts of the tenant", body = [AccountResponse]),
        (status = 401, description = "Unauthorized", body = Object)
    )
)]
async fn list_accounts(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };
    let (limit, offset) = params.clamped();

    match state.accounts.list(tenant_id, limit, offset).await {
        Ok(accounts) => {
            let body: Vec<AccountResponse> = accounts.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(body)))
        }
        Err(e) => {
            error!(error = %e, "Failed to list accounts");
            error_response(map_account_error(&e))
        }
    }
}

/// Account details with today's quota usage
#[utoipa::path(
    get,
    path = "/accounts/{id}",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account overview", body = AccountOverviewResponse),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn get_account(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };

    match state.accounts.overview(tenant_id, account_id).await {
        Ok(overview) => (
            StatusCode::OK,
            Json(serde_json::json!(AccountOverviewResponse::from(overview))),
        ),
        Err(e) => error_response(map_account_error(&e)),
    }
}

/// Enable or disable an account
///
/// Reactivating an account also clears a rate-limit cool-down and restarts
/// its lane.
#[utoipa::path(
    post,
    path = "/accounts/{id}/status",
    tag = "Accounts",
    params(("id" = Uuid, Path, description = "Account ID")),
    request_body = SetAccountStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = AccountResponse),
        (status = 400, description = "Invalid status", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn set_account_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(account_id): Path<Uuid>,
    Json(req): Json<SetAccountStatusRequest>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };

    let Some(status) = parse_account_status(&req.status) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid status",
                "allowed": ["active", "disabled"]
            })),
        );
    };

    match state
        .scheduler
        .set_account_status(tenant_id, account_id, status)
        .await
    {
        Ok(account) => (
            StatusCode::OK,
            Json(serde_json::json!(AccountResponse::from(account))),
        ),
        Err(e) => {
            warn!(error = %e, %account_id, "Failed to change account status");
            error_response(map_scheduler_error(&e))
        }
    }
}

/// Set pacing and quota limits for the tenant or one account
#[utoipa::path(
    put,
    path = "/limits",
    tag = "Accounts",
    request_body = SetLimitsRequest,
    responses(
        (status = 200, description = "Limits stored", body = LimitsResponse),
        (status = 400, description = "Invalid limits", body = Object),
        (status = 404, description = "Account not found", body = Object)
    )
)]
async fn set_limits(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<SetLimitsRequest>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };

    let Some(action_type) = parse_action_type(&req.action_type) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid action type",
                "allowed": allowed_action_types()
            })),
        );
    };

    let limits = ActionLimits {
        daily_max: req.daily_max,
        min_interval_s: req.min_interval_s,
        max_interval_s: req.max_interval_s,
        max_attempts: req.max_attempts,
        executor_timeout_s: req.executor_timeout_s,
    };

    match state
        .accounts
        .set_limits(tenant_id, req.account_id, action_type, limits)
        .await
    {
        Ok(limit) => (
            StatusCode::OK,
            Json(serde_json::json!(LimitsResponse::from(limit))),
        ),
        Err(e) => error_response(map_account_error(&e)),
    }
}

/// Submit a campaign
///
/// Validates the batch, stores it and enqueues one action per target,
/// spread round-robin over the eligible accounts.
#[utoipa::path(
    post,
    path = "/campaigns",
    tag = "Campaigns",
    request_body = CreateCampaignRequest,
    responses(
        (status = 201, description = "Campaign accepted", body = CampaignResponse),
        (status = 400, description = "Invalid campaign", body = Object),
        (status = 503, description = "Store unavailable", body = Object)
    )
)]
async fn create_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CreateCampaignRequest>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };

    let Some(action_type) = parse_action_type(&req.action_type) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "Invalid action type",
                "allowed": allowed_action_types()
            })),
        );
    };

    let mut account_ids: Vec<Uuid> = req.account_id.into_iter().collect();
    account_ids.extend(req.account_pool);

    let request = CampaignRequest {
        action_type,
        account_ids,
        targets: req.targets,
        content: req.content,
    };

    match state.scheduler.submit_campaign(tenant_id, request).await {
        Ok(campaign) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "campaign_id": campaign.id,
                "campaign": CampaignResponse::from(campaign),
            })),
        ),
        Err(e) => {
            warn!(error = %e, %tenant_id, "Campaign rejected");
            error_response(map_scheduler_error(&e))
        }
    }
}

#[utoipa::path(
    get,
    path = "/campaigns",
    tag = "Campaigns",
    params(PaginationParams),
    responses(
        (status = 200, description = "Campaigns of the tenant, newest first", body = [CampaignResponse])
    )
)]
async fn list_campaigns(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };
    let (limit, offset) = params.clamped();

    match state.scheduler.list_campaigns(tenant_id, limit, offset).await {
        Ok(campaigns) => {
            let body: Vec<CampaignResponse> = campaigns.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(body)))
        }
        Err(e) => {
            error!(error = %e, "Failed to list campaigns");
            error_response(map_scheduler_error(&e))
        }
    }
}

/// Campaign status and counters
#[utoipa::path(
    get,
    path = "/campaigns/{id}",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign", body = CampaignResponse),
        (status = 404, description = "Campaign not found", body = Object)
    )
)]
async fn get_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };

    match state.scheduler.get_campaign(tenant_id, campaign_id).await {
        Ok(campaign) => (
            StatusCode::OK,
            Json(serde_json::json!(CampaignResponse::from(campaign))),
        ),
        Err(e) => error_response(map_scheduler_error(&e)),
    }
}

#[utoipa::path(
    get,
    path = "/campaigns/{id}/actions",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID"), PaginationParams),
    responses(
        (status = 200, description = "Actions in queue order", body = [ActionResponse]),
        (status = 404, description = "Campaign not found", body = Object)
    )
)]
async fn list_campaign_actions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
    Query(params): Query<PaginationParams>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };
    let (limit, offset) = params.clamped();

    match state
        .scheduler
        .list_campaign_actions(tenant_id, campaign_id, limit, offset)
        .await
    {
        Ok(actions) => {
            let body: Vec<ActionResponse> = actions.into_iter().map(Into::into).collect();
            (StatusCode::OK, Json(serde_json::json!(body)))
        }
        Err(e) => error_response(map_scheduler_error(&e)),
    }
}

#[utoipa::path(
    post,
    path = "/campaigns/{id}/cancel",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign cancelled", body = CampaignResponse),
        (status = 404, description = "Campaign not found", body = Object),
        (status = 409, description = "Campaign already finished", body = Object)
    )
)]
async fn cancel_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };

    match state.scheduler.cancel_campaign(tenant_id, campaign_id).await {
        Ok(campaign) => (
            StatusCode::OK,
            Json(serde_json::json!(CampaignResponse::from(campaign))),
        ),
        Err(e) => error_response(map_scheduler_error(&e)),
    }
}

#[utoipa::path(
    post,
    path = "/campaigns/{id}/pause",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign paused", body = CampaignResponse),
        (status = 404, description = "Campaign not found", body = Object),
        (status = 409, description = "Campaign cannot be paused", body = Object)
    )
)]
async fn pause_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };

    match state.scheduler.pause_campaign(tenant_id, campaign_id).await {
        Ok(campaign) => (
            StatusCode::OK,
            Json(serde_json::json!(CampaignResponse::from(campaign))),
        ),
        Err(e) => error_response(map_scheduler_error(&e)),
    }
}

#[utoipa::path(
    post,
    path = "/campaigns/{id}/resume",
    tag = "Campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign resumed", body = CampaignResponse),
        (status = 404, description = "Campaign not found", body = Object),
        (status = 409, description = "Campaign is not paused", body = Object)
    )
)]
async fn resume_campaign(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(campaign_id): Path<Uuid>,
) -> impl IntoResponse {
    let tenant_id = match authorize(&state, &headers) {
        Ok(tenant_id) => tenant_id,
        Err(resp) => return resp,
    };

    match state.scheduler.resume_campaign(tenant_id, campaign_id).await {
        Ok(campaign) => (
            StatusCode::OK,
            Json(serde_json::json!(CampaignResponse::from(campaign))),
        ),
        Err(e) => error_response(map_scheduler_error(&e)),
    }
}
