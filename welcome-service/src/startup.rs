//! Application startup and lifecycle management.
//!
//! Wires the Mongo-backed store, the Telegram transport, and the polling
//! worker together, and serves the minimal HTTP surface (health/readiness)
//! used by the hosting platform.

use crate::config::WelcomeConfig;
use crate::handlers::BotContext;
use crate::services::{
    ChatRegistry, Delivery, MongoDb, MongoStore, NodeStore, TelegramApi, Transport, TreeEditor,
    WizardSessions,
};
use crate::workers::{KeepAlive, UpdatePoller};
use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use serde_json::json;
use service_core::error::AppError;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
struct HealthState {
    db: MongoDb,
}

/// Health check endpoint for liveness probes.
async fn health_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "welcome-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "welcome-service",
                "error": e.to_string()
            })),
        ),
    }
}

async fn readiness_check(State(state): State<HealthState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    db: MongoDb,
    api: TelegramApi,
    ctx: BotContext,
    keep_alive: KeepAlive,
    shutdown: CancellationToken,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: WelcomeConfig) -> Result<Self, AppError> {
        let db = MongoDb::connect(&config.mongodb.uri, &config.mongodb.database)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to MongoDB: {}", e);
                e
            })?;
        db.initialize_indexes().await.map_err(|e| {
            tracing::error!("Failed to initialize database indexes: {}", e);
            e
        })?;

        let api = TelegramApi::new(&config.telegram.api_base, &config.telegram.bot_token);
        let me = api
            .get_me()
            .await
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("getMe failed: {}", e)))?;
        tracing::info!(bot_id = me.id, username = ?me.username, "Telegram identity confirmed");

        let store: Arc<MongoStore> = Arc::new(MongoStore::new(db.clone()));
        let node_store: Arc<dyn NodeStore> = store.clone();
        let registry: Arc<dyn ChatRegistry> = store;
        let transport: Arc<dyn Transport> = Arc::new(api.clone());

        let known = registry.active_groups().await?;
        tracing::info!(groups = known.len(), "Resuming with registered groups");

        let shutdown = CancellationToken::new();
        let ctx = BotContext {
            admin_id: config.telegram.admin_id,
            bot_id: me.id,
            store: node_store.clone(),
            registry,
            editor: TreeEditor::new(node_store),
            delivery: Delivery::new(transport),
            sessions: Arc::new(WizardSessions::new()),
        };
        let keep_alive = KeepAlive::new(config.keep_alive.clone(), shutdown.clone());

        // Port 0 = random port for testing.
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Welcome service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            db,
            api,
            ctx,
            keep_alive,
            shutdown,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the application until stopped: spawns the update poller and the
    /// keep-alive worker, then serves the HTTP health surface.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let poller = UpdatePoller::new(self.api.clone(), self.ctx.clone(), self.shutdown.clone());
        let poller_handle = tokio::spawn(poller.run());
        let keep_alive_handle = tokio::spawn(self.keep_alive.run());

        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .with_state(HealthState { db: self.db })
            .layer(TraceLayer::new_for_http());

        let shutdown = self.shutdown.clone();
        let result = axum::serve(self.listener, router)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

        self.shutdown.cancel();
        let _ = poller_handle.await;
        let _ = keep_alive_handle.await;

        if let Err(e) = result {
            tracing::error!("HTTP server error: {}", e);
            return Err(std::io::Error::other(format!("HTTP server error: {}", e)));
        }
        Ok(())
    }
}
