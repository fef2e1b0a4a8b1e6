pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use blacklist_core::config::ServerConfig;
use blacklist_core::store::AddressStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Routes exposed on the external port.
pub fn public_router<S: AddressStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/", get(routes::health::root))
        .route("/health", get(routes::health::health::<S>))
        .route("/ip/add", post(routes::ip::add_ip::<S>))
        .route("/ip/blacklist", get(routes::ip::blacklist::<S>))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Routes exposed on the internal port, all behind `X-Internal-Token`.
pub fn internal_router<S: AddressStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/internal/reactivate", post(routes::internal::reactivate::<S>))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::internal_token_middleware::<S>,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Both routers on one service. Used by integration tests and single-port
/// deployments behind a proxy.
pub fn build_router<S: AddressStore>(state: AppState<S>) -> Router {
    public_router(state.clone()).merge(internal_router(state))
}

/// Bind the public and internal listeners from `config` and serve until
/// `shutdown` is cancelled.
pub async fn serve<S: AddressStore>(
    state: AppState<S>,
    config: &ServerConfig,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let public = TcpListener::bind((config.host.as_str(), config.external_port)).await?;
    let internal = TcpListener::bind((config.host.as_str(), config.internal_port)).await?;
    serve_on(state, public, internal, shutdown).await
}

/// Serve on pre-bound listeners, so callers can use port 0 and read the
/// assigned ports before starting.
pub async fn serve_on<S: AddressStore>(
    state: AppState<S>,
    public: TcpListener,
    internal: TcpListener,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    tracing::info!(addr = %public.local_addr()?, "public API listening");
    tracing::info!(addr = %internal.local_addr()?, "internal API listening");

    let public_server = axum::serve(public, public_router(state.clone()))
        .with_graceful_shutdown(shutdown.clone().cancelled_owned());
    let internal_server = axum::serve(internal, internal_router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned());

    tokio::try_join!(
        async { public_server.await },
        async { internal_server.await },
    )?;
    tracing::info!("HTTP servers stopped");
    Ok(())
}
