/*
 * Responsibility
 * - Config読み込み → 依存生成 (auth filter / identity circuit / upstream) → Router 組み立て
 * - Middleware の適用 (auth / CORS / request-id / trace / timeout)
 * - axum::serve() で起動
 */
use std::panic;

use anyhow::Result;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::error::AppError;
use crate::middleware;
use crate::services::auth::build_auth_stack;
use crate::services::upstream::UpstreamClient;
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,edge_gateway=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook() {
    // Handler panics are turned into 500s by the HTTP layer; the hook only records them.
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        tracing::error!(?info, "panic");
        default_hook(info);
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook();

    tracing::info!(
        "starting gateway in {:?} mode on {}",
        config.app_env,
        config.addr
    );

    let state = build_state(&config)?;
    let app = build_router(state, &config);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway stopped");
    Ok(())
}

pub fn build_state(config: &Config) -> Result<AppState, AppError> {
    let auth = build_auth_stack(config)?;

    let upstream =
        UpstreamClient::new(config.upstream_url.clone(), config.upstream_timeout).map_err(|e| {
            tracing::error!(error = %e, "failed to build upstream client");
            AppError::Internal
        })?;

    Ok(AppState::new(auth.filter, upstream, auth.identity_circuit))
}

pub fn build_router(state: AppState, config: &Config) -> Router {
    let router = api::routes(&state).with_state(state);

    // Identity lookups run sequentially before the upstream call.
    let request_timeout = config.upstream_timeout + config.circuit.call_timeout * 4;

    let router = middleware::cors::apply(router, config);
    middleware::http::apply(router, request_timeout)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
