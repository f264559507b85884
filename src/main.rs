use std::{net::SocketAddr, sync::Arc};

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod auth;
mod bookings;
mod config;
mod db;
mod errors;
mod housekeeping;
mod middleware;
mod models;
mod payments;
mod routes;
mod state;
mod store;

use payments::stripe::StripeGateway;
use state::{AppState, Stores};
use store::postgres::PgStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ───────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── Config ────────────────────────────────────────────────
    let config = config::Config::from_env()?;
    tracing::info!(env = %config.app_env, "Starting concierge backend");
    if config.stripe_secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY not set; checkout is disabled");
    }

    // ── Database ──────────────────────────────────────────────
    let pool = db::connect(&config).await?;
    db::run_migrations(&pool).await?;

    // ── Services ──────────────────────────────────────────────
    let pg = Arc::new(PgStore::new(pool));
    let gateway = Arc::new(StripeGateway::new(&config.stripe_api_base, &config.stripe_secret_key)?);
    let stores = Stores {
        identity: pg.clone(),
        profiles: pg.clone(),
        services: pg.clone(),
        bookings: pg,
    };
    let app_state = AppState::new(config, stores, gateway);

    // ── Background jobs ───────────────────────────────────────
    housekeeping::spawn_session_sweep(app_state.auth.clone(), app_state.config.session_sweep_minutes);

    // Read address before moving state into the router
    let addr: SocketAddr = format!(
        "{}:{}",
        app_state.config.backend_host,
        app_state.config.backend_port
    )
    .parse()?;

    // ── Router ────────────────────────────────────────────────
    let app = routes::app(app_state);
    tracing::info!(%addr, "Listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
