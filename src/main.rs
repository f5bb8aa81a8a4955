//! Coworker Gifting Backend
//!
//! REST backend for campaign-based coworker gifting with SQLite persistence,
//! Google sign-in and JWT sessions.

mod api;
mod auth;
mod config;
mod csv_import;
mod db;
mod errors;
mod models;
mod seed;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::oauth::GoogleOAuth;
use auth::JwtKeys;
use config::{Config, LogFormat, DEFAULT_JWT_SECRET};
use db::Repository;

/// Multipart framing allowance on top of the CSV size limit.
const UPLOAD_OVERHEAD_BYTES: usize = 64 * 1024;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtKeys>,
    pub oauth: Option<Arc<GoogleOAuth>>,
}

impl AppState {
    pub fn new(repo: Repository, config: Config) -> Self {
        let jwt = Arc::new(JwtKeys::new(&config.jwt_secret, config.jwt_ttl_hours));
        let oauth = config.oauth.clone().map(|c| Arc::new(GoogleOAuth::new(c)));
        Self {
            repo: Arc::new(repo),
            config: Arc::new(config),
            jwt,
            oauth,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let (pretty, json) = match config.log_format {
        LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty)
        .with(json)
        .init();

    tracing::info!("Starting Gifting Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("Environment: {:?}", config.environment);

    if config.jwt_secret == DEFAULT_JWT_SECRET {
        tracing::warn!("Using the default JWT secret (GIFTING_JWT_SECRET). Do not use in production!");
    }
    if config.oauth.is_none() {
        tracing::warn!("Google OAuth is not configured. Only dev-login can issue tokens.");
    }

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Repository::new(pool);

    if config.seed {
        tracing::info!("Seeding sample data...");
        seed::seed(&repo).await?;
    }

    let bind_addr = config.bind_addr;
    let state = AppState::new(repo, config);

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.frontend_url);
    let keys = state.jwt.clone();

    let upload_limit = ServiceBuilder::new()
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            csv_import::MAX_CSV_BYTES + UPLOAD_OVERHEAD_BYTES,
        ));

    // Routes requiring a session token
    let protected_routes = Router::new()
        .route("/auth/me", get(api::me))
        // Campaigns
        .route(
            "/campaigns",
            get(api::list_campaigns).post(api::create_campaign),
        )
        .route("/campaigns/{id}", get(api::get_campaign))
        .route("/campaigns/{id}/status", get(api::campaign_status))
        // Participants
        .route("/campaigns/{id}/participants", get(api::list_participants))
        .route(
            "/campaigns/{id}/participants/import",
            post(api::import_participants).layer(upload_limit),
        )
        // Gifts
        .route(
            "/campaigns/{id}/gifts",
            get(api::list_gifts).post(api::create_gift),
        )
        .route("/campaigns/{id}/gifts/received", get(api::list_received_gifts))
        .route(
            "/campaigns/{id}/gifts/{gift_id}",
            put(api::update_gift).delete(api::delete_gift),
        )
        // Reports
        .route("/campaigns/{id}/reports/summary", get(api::report_summary))
        // Apply JWT auth middleware
        .layer(middleware::from_fn(move |req, next| {
            auth::jwt_auth_layer(keys.clone(), req, next)
        }));

    // No auth required
    let mut public_routes = Router::new()
        .route("/health", get(api::health_check))
        .route("/auth/login", get(api::login))
        .route("/auth/callback", get(api::callback));
    if !state.config.is_production() {
        public_routes = public_routes.route("/auth/dev-login", post(api::dev_login));
    }

    Router::new()
        .nest("/api/v1", protected_routes.merge(public_routes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    match HeaderValue::from_str(frontend_url) {
        Ok(origin) => cors.allow_origin(AllowOrigin::exact(origin)),
        Err(_) => {
            tracing::warn!("Invalid frontend URL {:?}; CORS will reject all origins", frontend_url);
            cors.allow_origin(AllowOrigin::list(Vec::<HeaderValue>::new()))
        }
    }
}
