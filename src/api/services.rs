use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use tracing::{debug, info, warn};

use super::{
    auth::AuthenticatedUser,
    error::ApiError,
    models::{
        AccountView, BucketsQuery, BucketsResponse, DeleteAccountResponse, HealthResponse,
        LastRefreshResponse, UpdateAccountRequest,
    },
    state::AppState,
    utils::{read_json_body, verify_cron_secret},
};
use crate::accounts::NewAccount;

/// Fast read path (GET /buckets/cached)
///
/// Serves the stored snapshot immediately and starts a background
/// aggregation whose result only the next read will see. Without a
/// snapshot the aggregation runs inline.
pub async fn get_cached_buckets(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.accounts.existing_user_accounts(&user_id).await?;

    if let Some(snapshot) = state.snapshots.read_cached(&user_id).await {
        let aggregator = state.aggregator.clone();
        let background_user = user_id.clone();
        tokio::spawn(async move {
            if let Err(e) = aggregator.list_buckets(&background_user, &accounts, false).await {
                warn!(user_id = %background_user, error = %e, "Background refresh failed");
            }
        });

        debug!(user_id = %user_id, buckets = snapshot.buckets.len(), "Served cached bucket list");
        return Ok(Json(BucketsResponse {
            data: snapshot.buckets,
            cached: true,
            last_refreshed: Some(snapshot.captured_at),
            warnings: snapshot.warnings,
        }));
    }

    let listing = state.aggregator.list_buckets(&user_id, &accounts, false).await?;
    Ok(Json(BucketsResponse {
        data: listing.buckets,
        cached: false,
        last_refreshed: Some(listing.captured_at),
        warnings: listing.warnings,
    }))
}

/// Full read path (GET /buckets?refresh=true)
pub async fn get_buckets(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Query(query): Query<BucketsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let accounts = state.accounts.existing_user_accounts(&user_id).await?;
    let listing = state
        .aggregator
        .list_buckets(&user_id, &accounts, query.force_refresh())
        .await?;

    Ok(Json(BucketsResponse {
        data: listing.buckets,
        cached: false,
        last_refreshed: Some(listing.captured_at),
        warnings: listing.warnings,
    }))
}

/// GET /last-refresh
pub async fn get_last_refresh(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> impl IntoResponse {
    let last_api_refresh = state.snapshots.last_api_refresh(&user_id).await;
    let cron_summary = state.scheduler.last_summary().await;

    Json(LastRefreshResponse {
        last_api_refresh,
        last_cron_refresh: cron_summary.as_ref().map(|s| s.timestamp),
        cron_summary,
    })
}

/// Manual global refresh (POST /refresh)
///
/// The secret is checked before anything else; a rejected call leaves no
/// trace in the summary.
pub async fn trigger_refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if !verify_cron_secret(&headers, state.config.refresh.cron_secret.as_deref()) {
        warn!("Rejected manual refresh with bad secret");
        return Err(ApiError::Unauthorized("invalid cron secret"));
    }

    info!("Manual global refresh triggered");
    let summary = state.scheduler.run_global_refresh().await?;
    Ok(Json(summary))
}

/// GET /accounts
pub async fn list_accounts(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<impl IntoResponse, ApiError> {
    let accounts: Vec<AccountView> = state
        .accounts
        .list_accounts(&user_id)
        .await?
        .into_iter()
        .map(AccountView::from)
        .collect();
    Ok(Json(accounts))
}

/// POST /accounts
pub async fn create_account(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let input: NewAccount = read_json_body(&headers, body, state.max_payload_bytes()).await?;
    let account = state.accounts.add_account(&user_id, input).await?;
    Ok((StatusCode::CREATED, Json(AccountView::from(account))))
}

/// PATCH /accounts/{account_id}
pub async fn update_account(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let update: UpdateAccountRequest = read_json_body(&headers, body, state.max_payload_bytes()).await?;
    if update.name.is_none() && update.is_active.is_none() {
        return Err(ApiError::InvalidPayload("nothing to update".into()));
    }

    let mut account = None;
    if let Some(name) = update.name {
        account = Some(state.accounts.rename_account(&user_id, &account_id, &name).await?);
    }
    if let Some(active) = update.is_active {
        account = Some(state.accounts.set_active(&user_id, &account_id, active).await?);
    }

    let account = account.ok_or_else(|| ApiError::Internal("account update produced no result".into()))?;
    Ok(Json(AccountView::from(account)))
}

/// DELETE /accounts/{account_id}
pub async fn delete_account(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(account_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted_cache_entries = state.accounts.delete_account(&user_id, &account_id).await?;
    Ok(Json(DeleteAccountResponse { deleted_cache_entries }))
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        refresh: state.scheduler.state(),
        metrics: state.metrics.snapshot(),
    })
}
