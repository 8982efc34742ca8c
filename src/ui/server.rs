//! Control API server

use axum::{
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};

use crate::config::UiConfig;
use crate::error::Result;
use crate::source::MrcSource;
use crate::ui::handlers;

/// Shared state handed to every handler
pub struct AppState {
    pub source: Arc<MrcSource>,
    pub started: Instant,
}

/// Serves the control API next to the tick loop
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, source: Arc<MrcSource>) -> Self {
        Self {
            config,
            state: Arc::new(AppState {
                source,
                started: Instant::now(),
            }),
        }
    }

    /// Build the router with all API routes
    pub fn router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        Router::new()
            .route("/api/status", get(handlers::get_status))
            .route("/api/connect", post(handlers::connect))
            .route("/api/disconnect", post(handlers::disconnect))
            .route("/api/settings", get(handlers::get_settings).put(handlers::update_settings))
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Bind and serve until the task is dropped
    pub async fn run(self) -> Result<()> {
        let app = self.router();
        let address = (self.config.bind_address.as_str(), self.config.http_port);
        let listener = tokio::net::TcpListener::bind(address).await?;
        tracing::info!("Control API listening on {}", listener.local_addr()?);

        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Run the server on the current tokio runtime
    pub fn start_background(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.run().await {
                tracing::error!("Web server error: {}", e);
            }
        })
    }
}
