use std::future::Future;
use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, patch, post},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::{services, state::AppState};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(services::health))
        .route("/buckets", get(services::get_buckets))
        .route("/buckets/cached", get(services::get_cached_buckets))
        .route("/last-refresh", get(services::get_last_refresh))
        .route("/refresh", post(services::trigger_refresh))
        .route(
            "/accounts",
            get(services::list_accounts).post(services::create_account),
        )
        .route(
            "/accounts/{account_id}",
            patch(services::update_account).delete(services::delete_account),
        )
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}

/// Serve the API until `shutdown` resolves
pub async fn run<F>(address: SocketAddr, state: AppState, shutdown: F) -> Result<(), AnyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "bucketwatch API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
