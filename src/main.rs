use axum::{
    routing::{get, post},
    Router,
};
use lead_enrichment_api::config::Config;
use lead_enrichment_api::db::Database;
use lead_enrichment_api::enrichment_log::EnrichmentLogStore;
use lead_enrichment_api::events::{run_dispatcher, EventBus};
use lead_enrichment_api::handlers::{self, AppState};
use lead_enrichment_api::workflow::Workflow;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_governor::{
    governor::GovernorConfigBuilder, key_extractor::SmartIpKeyExtractor, GovernorLayer,
};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lead_enrichment_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    // Initialize database connection pool
    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");

    // Event bus and workflow dispatcher
    let (bus, rx) = EventBus::new(db.pool.clone());
    let workflow = Arc::new(Workflow::new(db.pool.clone(), &config, bus.clone()));
    {
        let bus = bus.clone();
        let concurrency = config.worker_concurrency;
        tokio::spawn(async move {
            run_dispatcher(bus, rx, concurrency, move |job| {
                workflow.clone().handle_event(job)
            })
            .await;
        });
    }
    tracing::info!(
        "Event dispatcher started ({} workers)",
        config.worker_concurrency
    );

    // Re-enqueue events a previous process left unfinished
    let recovered = bus.recover_pending().await?;
    if recovered > 0 {
        tracing::info!("Recovered {} unfinished event(s)", recovered);
    }

    // Double-submit guard (1 minute TTL, 10k max entries)
    let recent_submission_cache = Cache::builder()
        .time_to_live(Duration::from_secs(60))
        .max_capacity(10_000)
        .build();
    tracing::info!("Submission deduplication cache initialized");

    // Build application state
    let app_state = Arc::new(AppState {
        db: db.pool.clone(),
        logs: EnrichmentLogStore::new(db.pool.clone()),
        bus,
        recent_submission_cache,
    });

    // Configure rate limiter: 10 requests/second per IP, burst of 20
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(10)
            .burst_size(20)
            .key_extractor(SmartIpKeyExtractor)
            .finish()
            .unwrap(),
    );

    // Build protected routes with security layers
    let protected_routes = Router::new()
        .route("/api/v1/submissions", post(handlers::create_submission))
        .route("/api/v1/leads/:id", get(handlers::get_lead))
        .route("/api/v1/leads/:id/costs", get(handlers::get_lead_costs))
        .layer(
            ServiceBuilder::new()
                // Request size limit: 5MB max payload
                .layer(RequestBodyLimitLayer::new(5 * 1024 * 1024))
                // Rate limiting: 10 req/sec per IP, burst of 20
                .layer(GovernorLayer {
                    config: governor_conf,
                }),
        );

    // Health check bypasses rate limiting
    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(protected_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
