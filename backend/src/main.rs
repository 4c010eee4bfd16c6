//! GardenWatch monitor server
//!
//! Serves the cron trigger routes and the insights endpoint.

use sqlx::postgres::PgPoolOptions;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gardenwatch::{
    clock::SystemClock,
    create_app,
    external::{WeatherClient, WebPushClient},
    repository::PgStore,
    AppState, Config, Engine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "gardenwatch_server=debug,gardenwatch=debug,tower_http=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting GardenWatch Monitor");
    tracing::info!("Environment: {}", config.environment);

    if config.cron.secret.is_empty() {
        tracing::warn!("cron.secret is empty; every cron request will be rejected");
    }

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    // External clients share the per-call timeout
    let unit_timeout = Duration::from_secs(config.monitor.unit_timeout_secs);
    let weather = WeatherClient::new(config.weather.api_endpoint.clone(), unit_timeout)?;
    let push = WebPushClient::new(
        config.push.relay_url.clone(),
        config.push.api_key.clone(),
        config.push.ttl_secs,
        unit_timeout,
    )?;

    let store = Arc::new(PgStore::new(db_pool.clone()));
    let engine = Engine {
        store: store.clone(),
        notifications: store,
        metrics: Arc::new(weather),
        push: Arc::new(push),
        clock: Arc::new(SystemClock),
    };

    // Create application state
    let state = AppState {
        db: db_pool,
        config: Arc::new(config.clone()),
        engine,
    };

    let app = create_app(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
