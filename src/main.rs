//! Affiliate commerce core HTTP server.
//!
//! Owns process wiring only: config load, store connect, seeding, router
//! assembly, and graceful shutdown. All business logic lives in the
//! library crate.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use affiliate_core::{
    ai_oracle::StubOracle,
    api::{ops, orders, realtime},
    auth::{api as auth_api, auth_middleware, JwtHandler},
    config::Config,
    lifecycle, middleware as app_middleware, observability,
    realtime::RealtimeHub,
    state::AppState,
};

const RSS_WARNING_KB: u64 = 512 * 1024;

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "affiliate_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn public_router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(auth_api::login))
        .route("/api/auth/register", post(auth_api::register))
        .route("/api/auth/refresh", post(auth_api::refresh))
        .route("/api/orders/claim", post(orders::claim_order_slot))
        .route("/api/realtime/stream", get(realtime::stream))
}

fn protected_router(jwt: Arc<JwtHandler>) -> Router<AppState> {
    Router::new()
        .route("/api/auth/register-ops", post(auth_api::register_ops))
        .route("/api/auth/register-brand", post(auth_api::register_brand))
        .route("/api/auth/me", get(auth_api::me))
        .route("/api/auth/profile", axum::routing::put(auth_api::update_profile))
        .route("/api/orders/user/:user_id", get(orders::list_orders_for_user))
        .route("/api/orders", post(orders::create_order))
        .route(
            "/api/orders/:id/proof/:type",
            get(orders::get_order_proof).post(orders::submit_order_proof),
        )
        .route(
            "/api/orders/:id/proof/:type/public",
            get(orders::get_order_proof_public),
        )
        .route("/api/ops/verify", post(ops::verify_proof))
        .route("/api/ops/orders/settle", post(ops::settle_order))
        .route("/api/ops/orders/unsettle", post(ops::unsettle_order))
        .route("/api/ops/campaigns", post(ops::create_campaign))
        .route("/api/ops/campaigns/assign", post(ops::assign_campaign))
        .route("/api/ops/deals/publish", post(ops::publish_deal))
        .route("/api/ops/brands/connect", post(ops::connect_brand))
        .route_layer(axum_mw::from_fn_with_state(jwt, auth_middleware))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = Config::from_env().context("failed to load configuration")?;
    let pool = lifecycle::connect_store(&config).await?;
    lifecycle::run_seeding_stages(&pool, &config).context("seeding stage failed")?;

    let jwt = Arc::new(JwtHandler::new(
        config.jwt_access_secret.clone(),
        config.jwt_refresh_secret.clone(),
    ));
    let hub = RealtimeHub::new();
    let oracle: Arc<dyn affiliate_core::ai_oracle::ProofOracle> =
        Arc::new(StubOracle::new(config.ai_proof_confidence_threshold));

    let port = config.port;
    let availability_interval = Duration::from_secs(config.availability_check_interval_seconds);
    let drain_seconds = config.shutdown_drain_seconds;

    let state = AppState {
        pool,
        config: Arc::new(config),
        jwt: jwt.clone(),
        hub,
        oracle,
    };

    let monitor = observability::spawn_availability_monitor(availability_interval, RSS_WARNING_KB);

    let app = Router::new()
        .merge(public_router())
        .merge(protected_router(jwt))
        .layer(axum_mw::from_fn(app_middleware::request_logging_simple))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind port {port}"))?;
    tracing::info!(port, "affiliate-core-server listening");

    tracing::info!(drain_seconds, "serving with bounded drain deadline on shutdown");
    lifecycle::serve_with_drain_deadline(
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(lifecycle::shutdown_signal()),
        drain_seconds,
    )
    .await?;

    monitor.abort();
    tracing::info!("shutdown complete");
    Ok(())
}
