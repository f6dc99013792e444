//! # cleanordirty: is the shared dishwasher clean?
//!
//! A small REST service that keeps one record per shared dishwasher: a name,
//! a free-text status (normally `clean` or `dirty`) and a logical clock. Each
//! dishwasher is addressed by a short public code that is minted by a URL
//! shortening service when the record is created, so the code doubles as a
//! shareable link.
//!
//! ## Request flow
//!
//! Handlers in [`api::handlers`] read the raw request body, turn it into a
//! typed request with the field rules in [`dishwashers`], and call the
//! [`db::handlers::Dishwashers`] repository inside a transaction:
//!
//! - **Create** inserts the row, asks the configured [`minter::CodeMinter`]
//!   for a code for the row's canonical URL, stores the code and commits. If
//!   minting fails the transaction is dropped and nothing is stored.
//! - **Update** locks the row and applies the change only if the client's
//!   `last_updated` is strictly newer than the stored one (last writer wins).
//!   Stale writes are discarded and the stored record is returned.
//! - **Get** and **Delete** look records up by code.
//!
//! Errors are mapped to status codes by [`errors::Error`]; error bodies are a
//! bare JSON string.
//!
//! ## Running
//!
//! Configuration comes from `config.yaml` plus `CLEANORDIRTY_*` environment
//! variables (see [`config`]). Migrations in `migrations/` run at startup.

pub mod api;
pub mod config;
pub mod db;
pub mod dishwashers;
pub mod errors;
pub mod minter;
pub mod openapi;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

use crate::config::CorsOrigin;
use crate::db::handlers::Dishwashers;
use crate::minter::CodeMinter;
use crate::openapi::ApiDoc;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::{
    Json, Router,
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

/// Application state shared across all request handlers.
///
/// ```ignore
/// let state = AppState::builder()
///     .db(pool)
///     .config(config)
///     .minter(minter)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub db: PgPool,
    pub config: Config,
    pub minter: Arc<dyn CodeMinter>,
}

/// Get the database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

fn pool_options(settings: &config::PoolSettings) -> PgPoolOptions {
    let secs = |s: u64| (s > 0).then(|| Duration::from_secs(s));

    PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .min_connections(settings.min_connections)
        .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
        .idle_timeout(secs(settings.idle_timeout_secs))
        .max_lifetime(secs(settings.max_lifetime_secs))
}

/// Remove rows that never got a code. Creation is transactional, so these
/// only come from manual edits or an interrupted older deployment.
async fn purge_uncoded_rows(pool: &PgPool) -> anyhow::Result<()> {
    let mut conn = pool.acquire().await?;
    let purged = Dishwashers::new(&mut conn).purge_uncoded().await?;
    if purged > 0 {
        warn!(purged, "Removed dishwashers that had no code");
    }
    Ok(())
}

/// Connect (unless a pool is supplied), migrate and repair the database.
async fn setup_database(config: &Config, pool: Option<PgPool>) -> anyhow::Result<PgPool> {
    let pool = match pool {
        Some(pool) => pool,
        None => {
            info!("Connecting to database");
            pool_options(&config.database.pool).connect(&config.database.url).await?
        }
    };

    migrator().run(&pool).await?;
    purge_uncoded_rows(&pool).await?;

    Ok(pool)
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.cors;

    // tower-http rejects `*` inside an origin list
    let allow_origin = if cors_config.allowed_origins.iter().any(|o| matches!(o, CorsOrigin::Wildcard)) {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            if let CorsOrigin::Url(url) = origin {
                origins.push(url.origin().ascii_serialization().parse::<HeaderValue>()?);
            }
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

// Unrouted requests still get a JSON string body
async fn route_not_found() -> (StatusCode, Json<&'static str>) {
    (StatusCode::NOT_FOUND, Json("not found"))
}

async fn method_not_allowed() -> (StatusCode, Json<&'static str>) {
    (StatusCode::METHOD_NOT_ALLOWED, Json("method not allowed"))
}

/// Build the application router with all endpoints and middleware.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    use api::handlers::dishwashers;

    let api_routes = Router::new()
        .route("/dishwashers", post(dishwashers::create_dishwasher))
        .route(
            "/dishwashers/{code}",
            get(dishwashers::get_dishwasher).delete(dishwashers::delete_dishwasher),
        )
        .route("/dishwashers/update/{code}", post(dishwashers::update_dishwasher))
        .route("/dishwashers/delete/{code}", post(dishwashers::delete_dishwasher_via_post))
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(route_not_found)
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()))
        .nest("/api/v1", api_routes)
        .method_not_allowed_fallback(method_not_allowed)
        .fallback(route_not_found)
        .layer(create_cors_layer(&state.config)?);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(move || async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Owns the router and database pool for the lifetime of the process.
///
/// 1. [`Application::new`] connects, migrates, repairs and builds the router
/// 2. [`Application::serve`] listens until the shutdown future resolves, then
///    closes the pool and flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
    pool: PgPool,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        Self::new_with_pool(config, None).await
    }

    /// Like [`Application::new`], reusing `pool` when given instead of
    /// connecting to `database.url`.
    pub async fn new_with_pool(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        debug!("Starting with configuration: {:#?}", config);

        let pool = setup_database(&config, pool).await?;
        let minter = minter::from_config(&config.minter)?;
        info!(minter = minter.name(), "Code minter ready");

        let app_state = AppState::builder().db(pool.clone()).config(config.clone()).minter(minter).build();
        let router = build_router(&app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!("Listening on http://{}, public URL {}", bind_addr, self.config.public_url);

        axum::serve(listener, self.router).with_graceful_shutdown(shutdown).await?;

        info!("Closing database connections...");
        self.pool.close().await;

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
