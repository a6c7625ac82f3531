use axum::{
    Router,
    routing::{any, delete, get, post, put},
};
use engine::{Catalog, RewardEngine};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod middleware;
mod models;
mod routes;
mod websocket;

use config::ServerConfig;
use models::{BroadcastLog, InMemoryStorage};
use routes::{admin, daily, events, leaderboard, links, spin, stickers, store, users, wheel};
use websocket::{NotificationManager, create_notification_manager, websocket_handler};

// Shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RewardEngine>,
    pub storage: InMemoryStorage,
    pub notification_manager: NotificationManager,
    pub config: Arc<ServerConfig>,
    pub broadcasts: BroadcastLog,
}

impl AppState {
    pub fn new(engine: RewardEngine, config: ServerConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            storage: InMemoryStorage::new(),
            notification_manager: create_notification_manager(),
            config: Arc::new(config),
            broadcasts: BroadcastLog::default(),
        }
    }
}

pub fn app(state: AppState) -> Router {
    let player = Router::new()
        .route("/auth", post(users::login))
        .route("/me", get(users::get_profile))
        .route("/spin", post(spin::spin))
        .route("/wheel", get(wheel::get_wheel))
        .route("/wheel/spin", post(wheel::spin_wheel))
        .route("/daily", get(daily::get_daily))
        .route("/daily/claim", post(daily::claim_daily))
        .route("/stickers", get(stickers::get_stickers))
        .route("/stickers/open", post(stickers::open_pack))
        .route("/stickers/trade", post(stickers::trade_duplicates))
        .route("/redeem/{token}", post(links::redeem))
        .route("/leaderboard", get(leaderboard::get_leaderboard))
        .route("/events", get(events::get_events))
        .route("/store", get(store::get_store));

    let operator = Router::new()
        .route(
            "/reward-links",
            post(admin::create_link).get(admin::list_links),
        )
        .route("/reward-links/{token}", delete(admin::disable_link))
        .route("/leaderboard/reset", post(admin::reset_leaderboard))
        .route("/leaderboard/reward", post(admin::reward_top))
        .route(
            "/catalog",
            put(admin::replace_catalog).get(admin::get_catalog),
        )
        .route("/catalog/reload", post(admin::reload_catalog))
        .route("/store/confirm", post(admin::confirm_purchase))
        .route(
            "/broadcast",
            post(admin::broadcast).get(admin::list_broadcasts),
        );

    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/notifications", any(websocket_handler))
        .nest("/api", player)
        .nest("/admin", operator)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,http_server=debug,engine=debug")),
        )
        .init();

    let config = ServerConfig::from_env();

    let mut builder = RewardEngine::builder();
    if let Some(path) = &config.catalog_path {
        builder = builder.catalog(Catalog::from_json_file(path)?);
        tracing::info!("Catalog loaded from {}", path.display());
    } else {
        tracing::info!("Using the stock catalog");
    }
    let engine = builder.build()?;

    let bind_addr = config.bind_addr.clone();
    if config.admin_secret.is_none() {
        tracing::warn!("ADMIN_SECRET not set, admin routes are disabled");
    }
    let state = AppState::new(engine, config);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Server running on http://{}", bind_addr);
    axum::serve(listener, app(state)).await?;

    Ok(())
}

// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

// Root endpoint
async fn root() -> &'static str {
    "Reward Engine API - POST /api/auth to get a session, then /api/spin, /api/wheel/spin, /api/daily/claim, /api/stickers/open; WebSocket /notifications for level-ups and events"
}
