mod abuse;
mod ai;
mod cache;
mod config;
mod credits;
mod db;
mod errors;
mod llm_client;
mod models;
mod routes;
mod state;

use anyhow::{Context, Result};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use std::sync::Arc;

use crate::abuse::redis_store::RedisAbuseStore;
use crate::abuse::store::{AbuseStore, PgAbuseStore};
use crate::abuse::AbuseGuard;
use crate::cache::CacheRegistry;
use crate::config::{AbuseBackend, Config};
use crate::credits::store::PgUsageStore;
use crate::credits::CreditLedger;
use crate::db::{connect_redis, create_pool};
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume guard API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL (usage ledger always lives here)
    let db = create_pool(&config.database_url).await?;
    let ledger = CreditLedger::new(
        Arc::new(PgUsageStore::new(db.clone())),
        config.free_monthly_credits,
    );
    info!(
        "Credit ledger initialized ({} free credits/month)",
        config.free_monthly_credits
    );

    // Abuse store: Postgres by default, Redis when ABUSE_STORE=redis
    let abuse_store: Arc<dyn AbuseStore> = match config.abuse_backend {
        AbuseBackend::Postgres => Arc::new(PgAbuseStore::new(db.clone())),
        AbuseBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("REDIS_URL is required when ABUSE_STORE=redis")?;
            Arc::new(RedisAbuseStore::new(connect_redis(url).await?))
        }
    };
    info!("Abuse guard initialized ({:?} store)", config.abuse_backend);
    let guard = AbuseGuard::new(abuse_store, config.abuse.clone());

    // Initialize LLM client
    let llm = LlmClient::new(config.anthropic_api_key.clone());
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    // Build app state
    let state = AppState {
        ledger,
        guard,
        caches: Arc::new(CacheRegistry::new()),
        ai: Arc::new(llm),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the web app's domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    // Peer address feeds the client fingerprint when no proxy header is present
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
