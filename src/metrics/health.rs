//! HTTP surface for probes, Prometheus scraping and queue inspection
//!
//! Served with Axum next to the AMQP consumer. Probe endpoints answer with
//! plain status codes; `/stats` and `/guilds` return JSON.

use crate::metrics::collector::MetricsCollector;
use crate::service::app::ServiceHandle;
use crate::service::health::{HealthCheck, HealthStatus};
use crate::types::{GuildId, RosterState};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

const SERVICE_NAME: &str = "guild-queue";
const ENDPOINTS: [&str; 6] = ["/health", "/ready", "/alive", "/metrics", "/stats", "/guilds"];

#[derive(Debug, Clone)]
pub struct HealthServerConfig {
    pub port: u16,
    /// Bind address, "0.0.0.0" for all interfaces
    pub host: String,
}

impl Default for HealthServerConfig {
    fn default() -> Self {
        Self {
            port: 9090,
            host: "0.0.0.0".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct HealthServerState {
    pub metrics_collector: Arc<MetricsCollector>,
    /// Absent until the service is assembled; probes then report 503
    pub service: Option<ServiceHandle>,
}

pub struct HealthServer {
    config: HealthServerConfig,
    state: HealthServerState,
    shutdown_tx: broadcast::Sender<()>,
}

impl HealthServer {
    pub fn new(config: HealthServerConfig, metrics_collector: Arc<MetricsCollector>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            state: HealthServerState {
                metrics_collector,
                service: None,
            },
            shutdown_tx,
        }
    }

    pub fn with_service(mut self, service: ServiceHandle) -> Self {
        self.state.service = Some(service);
        self
    }

    /// Serve until `stop` is called
    pub async fn start(&self) -> Result<()> {
        let addr: SocketAddr = format!("{}:{}", self.config.host, self.config.port)
            .parse()
            .context("Invalid health server address")?;

        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind health server to {}", addr))?;
        info!("Health server listening on http://{}", addr);

        let mut shutdown_rx = self.shutdown_tx.subscribe();
        axum::serve(listener, self.create_router())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                debug!("Health server received shutdown");
            })
            .await?;

        info!("Health server stopped");
        Ok(())
    }

    pub fn create_router(&self) -> Router {
        Router::new()
            .route("/", get(root_handler))
            .route("/health", get(health_handler))
            .route("/ready", get(ready_handler))
            .route("/alive", get(alive_handler))
            .route("/metrics", get(metrics_handler))
            .route("/stats", get(stats_handler))
            .route("/guilds", get(guilds_handler))
            .with_state(self.state.clone())
    }

    pub async fn stop(&self) -> Result<()> {
        info!("Stopping health server...");
        if self.shutdown_tx.send(()).is_err() {
            warn!("Health server was not running");
        }
        Ok(())
    }
}

/// Which probe a handler answers for
#[derive(Debug, Clone, Copy)]
enum Probe {
    Liveness,
    Readiness,
}

async fn probe(state: &HealthServerState, probe: Probe) -> Option<HealthStatus> {
    let service = state.service.as_ref()?;
    let result = match probe {
        Probe::Liveness => HealthCheck::liveness_check(service).await,
        Probe::Readiness => HealthCheck::readiness_check(service).await,
    };
    match result {
        Ok(status) => Some(status),
        Err(e) => {
            error!("{:?} probe failed: {}", probe, e);
            Some(HealthStatus::Unhealthy)
        }
    }
}

fn probe_code(status: Option<HealthStatus>) -> StatusCode {
    match status {
        Some(HealthStatus::Healthy | HealthStatus::Degraded) => StatusCode::OK,
        _ => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn root_handler() -> impl IntoResponse {
    Json(json!({
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ENDPOINTS,
    }))
}

async fn health_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let status = probe(&state, Probe::Liveness).await;
    let label = match status {
        Some(HealthStatus::Healthy) => "healthy",
        Some(HealthStatus::Degraded) => "degraded",
        Some(HealthStatus::Unhealthy) => "unhealthy",
        None => "not_initialized",
    };

    (
        probe_code(status),
        Json(json!({
            "status": label,
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
}

async fn ready_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let status = probe(&state, Probe::Readiness).await;
    let body = match status {
        Some(HealthStatus::Healthy) => "Ready",
        Some(HealthStatus::Degraded) => "Degraded but ready",
        Some(HealthStatus::Unhealthy) => "Not ready",
        None => "Service not initialized",
    };
    (probe_code(status), body)
}

async fn alive_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    // Degraded still counts as alive for liveness
    let status = probe(&state, Probe::Liveness).await;
    let body = if probe_code(status) == StatusCode::OK {
        "Alive"
    } else {
        "Not alive"
    };
    (probe_code(status), body)
}

async fn metrics_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let families = state.metrics_collector.registry().gather();

    match encoder.encode_to_string(&families) {
        Ok(output) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            output,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain".to_string())],
                "Failed to encode metrics".to_string(),
            )
        }
    }
}

fn unavailable(reason: &str) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({
            "service": SERVICE_NAME,
            "error": reason,
            "timestamp": chrono::Utc::now(),
        })),
    )
}

async fn stats_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let Some(service) = &state.service else {
        return unavailable("Service not initialized");
    };

    match HealthCheck::check(service).await {
        Ok(health) => (
            StatusCode::OK,
            Json(json!({
                "service": {
                    "name": health.service,
                    "version": health.version,
                    "status": health.status,
                    "uptime_seconds": health.stats.uptime_seconds,
                },
                "queues": {
                    "guilds": health.stats.guilds,
                    "participants_waiting": health.stats.participants_waiting,
                    "full_rosters": health.stats.full_rosters,
                },
                "reputation": {
                    "tracked_participants": health.stats.tracked_participants,
                },
                "components": health.checks,
                "timestamp": health.timestamp,
            })),
        ),
        Err(e) => {
            error!("Failed to gather stats: {}", e);
            unavailable("Failed to gather service stats")
        }
    }
}

/// One line of the `/guilds` listing
#[derive(Debug, Serialize)]
struct GuildSummary {
    guild_id: GuildId,
    size: usize,
    capacity: usize,
    state: RosterState,
}

async fn guilds_handler(State(state): State<HealthServerState>) -> impl IntoResponse {
    let Some(service) = &state.service else {
        return unavailable("Service not initialized");
    };
    let controller = service.controller();

    let guild_ids = match controller.guild_ids() {
        Ok(ids) => ids,
        Err(e) => {
            error!("Failed to list guilds: {}", e);
            return unavailable("Failed to list guilds");
        }
    };

    // A guild may leave between listing and viewing; skip it
    let guilds: Vec<GuildSummary> = guild_ids
        .into_iter()
        .filter_map(|guild_id| {
            controller.view(guild_id).ok().map(|view| GuildSummary {
                guild_id,
                size: view.size(),
                capacity: view.capacity,
                state: view.state,
            })
        })
        .collect();

    (StatusCode::OK, Json(json!({ "guilds": guilds })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueController;
    use crate::types::Participant;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt; // for oneshot

    fn create_test_server() -> HealthServer {
        let collector = Arc::new(MetricsCollector::new().expect("Failed to create collector"));
        HealthServer::new(HealthServerConfig::default(), collector)
    }

    async fn get(app: Router, uri: &str) -> axum::response::Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_root_endpoint() {
        let app = create_test_server().create_router();
        assert_eq!(get(app, "/").await.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let collector = Arc::new(MetricsCollector::new().unwrap());
        collector.update_health_status(HealthStatus::Healthy.as_gauge());
        let app = HealthServer::new(HealthServerConfig::default(), collector).create_router();

        let response = get(app, "/metrics").await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers().get("content-type").unwrap();
        assert!(content_type.to_str().unwrap().contains("text/plain"));
    }

    #[tokio::test]
    async fn test_endpoints_without_service() {
        let app = create_test_server().create_router();

        for uri in ["/health", "/ready", "/alive", "/stats", "/guilds"] {
            assert_eq!(
                get(app.clone(), uri).await.status(),
                StatusCode::SERVICE_UNAVAILABLE,
                "{}",
                uri
            );
        }
    }

    #[tokio::test]
    async fn test_endpoints_with_running_service() {
        let handle = ServiceHandle::new(SERVICE_NAME, QueueController::default(), None);
        handle.set_running(true).await;
        let app = create_test_server().with_service(handle).create_router();

        for uri in ["/health", "/ready", "/alive", "/stats", "/guilds"] {
            assert_eq!(get(app.clone(), uri).await.status(), StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_stopped_service_is_not_alive() {
        let handle = ServiceHandle::new(SERVICE_NAME, QueueController::default(), None);
        let app = create_test_server().with_service(handle).create_router();

        assert_eq!(
            get(app, "/alive").await.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn test_guilds_listing() {
        let controller = QueueController::default();
        controller.guild_joined(7).unwrap();
        controller.guild_joined(3).unwrap();
        controller.join(7, Participant::new(1, "reese")).unwrap();

        let handle = ServiceHandle::new(SERVICE_NAME, controller, None);
        let app = create_test_server().with_service(handle).create_router();

        let response = get(app, "/guilds").await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["guilds"][0]["guild_id"], 3);
        assert_eq!(json["guilds"][0]["state"], "Empty");
        assert_eq!(json["guilds"][1]["guild_id"], 7);
        assert_eq!(json["guilds"][1]["size"], 1);
    }

    #[tokio::test]
    async fn test_404_handling() {
        let app = create_test_server().create_router();
        assert_eq!(get(app, "/nonexistent").await.status(), StatusCode::NOT_FOUND);
    }
}
