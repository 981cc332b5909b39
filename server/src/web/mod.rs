//! HTTP server
//!
//! REST API under `/api` and uploaded files under `/static`.

pub mod api;
pub mod auth;
pub mod reply;
pub mod state;

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::uploads::STATIC_PREFIX;
use state::AppState;

/// Configuration for the web server
pub struct WebConfig {
    pub addr: String,
    /// Request body limit, uploads included
    pub max_body_bytes: usize,
}

/// Start the web server
pub async fn serve(state: AppState, config: WebConfig) -> Result<()> {
    let app = create_router(state, config.max_body_bytes);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.addr))?;
    tracing::info!("Starting web server on http://{}", config.addr);

    axum::serve(listener, app).await?;
    Ok(())
}

/// Create the router with all routes
pub fn create_router(state: AppState, max_body_bytes: usize) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Accounts
        .route("/register", post(api::register))
        .route("/activate/:token", post(api::activate))
        .route("/login", post(api::login))
        .route("/logout", post(api::logout))
        .route("/profile", get(api::get_profile))
        .route("/profile/picture", post(api::upload_profile_picture))
        // Pages
        .route("/pages", get(api::list_pages).post(api::create_page))
        .route("/pages/:nameslug", get(api::find_page))
        .route(
            "/pages/:nameslug/photos",
            get(api::page_photos).post(api::upload_page_photo),
        )
        .route("/pages/:nameslug/photos/:photoid", delete(api::delete_page_photo))
        .route("/pages/:nameslug/albums", post(api::create_album))
        // Health
        .route("/health", get(api::health_check));

    let static_files = ServeDir::new(state.uploads.root());

    Router::new()
        .nest("/api", api_routes)
        .nest_service(STATIC_PREFIX, static_files)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
