mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod models;
mod routes;
mod service;

use std::sync::Arc;

use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderValue, Method,
};
use config::Config;
use db::{
    cache::{connect_redis, StatusCache},
    db::DBClient,
    gigdb::GigStore,
    memorydb::InMemoryGigStore,
};
use dotenv::dotenv;
use routes::create_router;
use service::{
    completion_service::CompletionService,
    escrow_service::{EscrowRelease, InMemoryEscrow, LedgerEscrow},
    gig_service::GigService,
    notification_service::NotificationService,
};
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct AppState {
    pub env: Config,
    pub gig_service: GigService,
    pub completion_service: CompletionService,
    pub notification_service: NotificationService,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn GigStore>,
        escrow: Arc<dyn EscrowRelease>,
        cache: StatusCache,
    ) -> Self {
        let notification_service = NotificationService::new(EVENT_CHANNEL_CAPACITY);
        let gig_service = GigService::new(store.clone(), notification_service.clone(), cache.clone());
        let completion_service = CompletionService::new(
            store,
            escrow,
            notification_service.clone(),
            cache,
            config.completion_policy(),
        );

        Self {
            env: config,
            gig_service,
            completion_service,
            notification_service,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::DEBUG)
        .init();

    dotenv().ok();

    let config = Config::init()?;

    let (store, escrow, redis_client): (Arc<dyn GigStore>, Arc<dyn EscrowRelease>, _) =
        match &config.database_url {
            Some(database_url) => {
                let pool = PgPoolOptions::new()
                    .max_connections(20)
                    .min_connections(2)
                    .connect(database_url)
                    .await?;
                tracing::info!("✅ Connection to the database is successful!");

                sqlx::migrate!("./migrations").run(&pool).await?;
                tracing::info!("✅ Migrations applied");

                let db_client = match &config.redis_url {
                    Some(redis_url) => DBClient::with_redis(pool, redis_url).await,
                    None => DBClient::new(pool),
                };
                let redis_client = db_client.redis_client.clone();
                let db_client = Arc::new(db_client);

                (
                    db_client.clone() as Arc<dyn GigStore>,
                    Arc::new(LedgerEscrow::new(db_client)) as Arc<dyn EscrowRelease>,
                    redis_client,
                )
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL not set - gigs are kept in memory only");
                let redis_client = match &config.redis_url {
                    Some(redis_url) => connect_redis(redis_url).await,
                    None => None,
                };
                (
                    Arc::new(InMemoryGigStore::new()) as Arc<dyn GigStore>,
                    Arc::new(InMemoryEscrow::new()) as Arc<dyn EscrowRelease>,
                    redis_client,
                )
            }
        };

    let cache = StatusCache::from_redis(redis_client, config.status_cache_ttl_secs);
    tracing::info!("📊 Status cache backend: {}", cache.backend_name());

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT]);

    let app_state = Arc::new(AppState::new(config.clone(), store, escrow, cache));
    tracing::info!(
        "🔐 Completion policy: initiator_confirms = {}",
        app_state.completion_service.policy().initiator_confirms
    );

    let app = create_router(app_state.clone()).layer(cors);

    // Start background jobs
    let app_state_clone = app_state.clone();
    tokio::spawn(async move {
        service::background_jobs::start_escrow_reconciliation_job(app_state_clone).await;
    });

    let app_state_clone = app_state.clone();
    tokio::spawn(async move {
        service::background_jobs::start_confirmation_reminder_job(app_state_clone).await;
    });

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!("🚀 Server is running on http://localhost:{}", config.port);

    axum::serve(listener, app).await?;

    Ok(())
}
