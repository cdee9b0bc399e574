//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the queue
//! controller to the broker, the metrics endpoints and the background
//! decay and snapshot tasks.

use crate::amqp::connection::{AmqpConfig, AmqpConnection};
use crate::amqp::handlers::{DispatchingHandler, MessageHandler, QueueEventConsumer};
use crate::amqp::publisher::{AmqpResponsePublisher, PublisherConfig, ResponsePublisher};
use crate::config::AppConfig;
use crate::dispatch::EventDispatcher;
use crate::metrics::health::HealthServerConfig;
use crate::metrics::{HealthServer, MetricsCollector, MetricsService};
use crate::queue::{JsonFileStore, QueueController, StateStore};
use crate::service::health::HealthCheck;
use crate::types::{QueueEvent, QueueResponse};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

const STATS_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
const HEALTH_UPDATE_INTERVAL: Duration = Duration::from_secs(60);

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("AMQP connection error: {message}")]
    AmqpConnection { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Cheap, cloneable view of the running service used by health checks
#[derive(Clone)]
pub struct ServiceHandle {
    name: Arc<str>,
    controller: QueueController,
    amqp_connection: Option<Arc<AmqpConnection>>,
    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl ServiceHandle {
    pub fn new(
        name: impl Into<String>,
        controller: QueueController,
        amqp_connection: Option<Arc<AmqpConnection>>,
    ) -> Self {
        Self {
            name: Arc::from(name.into()),
            controller,
            amqp_connection,
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn controller(&self) -> &QueueController {
        &self.controller
    }

    pub fn amqp_connection(&self) -> Option<&Arc<AmqpConnection>> {
        self.amqp_connection.as_ref()
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn set_running(&self, running: bool) {
        *self.is_running.write().await = running;
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Main application state containing all service components
pub struct AppState {
    /// Application configuration
    config: AppConfig,

    /// Shared view of the controller and service status
    handle: ServiceHandle,

    /// Routes events to the controller and publishes responses
    handler: Arc<DispatchingHandler>,

    /// Metrics service for monitoring and health checks
    metrics_service: Arc<MetricsService>,

    /// Persistence for roster and reputation state
    store: Option<Arc<dyn StateStore>>,

    /// Background task handles
    background_tasks: Vec<JoinHandle<()>>,

    /// AMQP consumer for inbound events
    queue_consumer: Option<QueueEventConsumer>,
}

impl AppState {
    /// Initialize the application, connecting to the broker
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        info!("Initializing guild-queue service");
        info!(
            "Configuration: service={}, amqp_url={}",
            config.service.name, config.amqp.url
        );

        let amqp_connection = Self::initialize_amqp(&config).await?;

        let channel =
            amqp_connection
                .open_channel()
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to open AMQP channel: {}", e),
                })?;

        let publisher_config = PublisherConfig {
            exchange: config.amqp.exchange_name.clone(),
            ..Default::default()
        };
        let publisher = Arc::new(
            AmqpResponsePublisher::new(channel, publisher_config)
                .await
                .map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to initialize response publisher: {}", e),
                })?,
        );

        Self::assemble(config, Some(amqp_connection), publisher)
    }

    /// Initialize the application without a broker, publishing to `publisher`
    pub fn with_publisher(
        config: AppConfig,
        publisher: Arc<dyn ResponsePublisher>,
    ) -> Result<Self, ServiceError> {
        Self::assemble(config, None, publisher)
    }

    fn assemble(
        config: AppConfig,
        amqp_connection: Option<Arc<AmqpConnection>>,
        publisher: Arc<dyn ResponsePublisher>,
    ) -> Result<Self, ServiceError> {
        let metrics_collector =
            Arc::new(
                MetricsCollector::new().map_err(|e| ServiceError::Initialization {
                    message: format!("Failed to create metrics collector: {}", e),
                })?,
            );

        let controller = QueueController::new((&config.queue).into());
        let store = config
            .service
            .state_file
            .as_ref()
            .map(|path| Arc::new(JsonFileStore::new(path)) as Arc<dyn StateStore>);

        if let Some(store) = &store {
            Self::restore_state(&controller, store.as_ref());
        }

        let handle = ServiceHandle::new(
            config.service.name.clone(),
            controller.clone(),
            amqp_connection,
        );

        let dispatcher = Arc::new(EventDispatcher::with_metrics(
            controller,
            &config.queue,
            metrics_collector.clone(),
        ));
        let handler = Arc::new(
            DispatchingHandler::new(dispatcher, publisher).with_metrics(metrics_collector.clone()),
        );

        let metrics_service = Self::initialize_metrics(&config, metrics_collector, handle.clone());

        Ok(Self {
            config,
            handle,
            handler,
            metrics_service,
            store,
            background_tasks: Vec::new(),
            queue_consumer: None,
        })
    }

    /// Start all background services and message consumption
    pub async fn start(&mut self) -> Result<(), ServiceError> {
        info!("Starting guild-queue service");

        self.handle.set_running(true).await;

        self.start_metrics_service().await?;
        self.start_amqp_consumption().await?;
        self.start_background_tasks().await?;

        info!("✅ Guild-queue service started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&mut self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of guild-queue service");

        self.handle.set_running(false).await;

        if let Some(consumer) = self.queue_consumer.take() {
            if let Err(e) = consumer.stop_consuming().await {
                warn!("Failed to stop AMQP consumer: {}", e);
            } else {
                info!("✅ AMQP event consumption stopped");
            }
        }

        self.stop_background_tasks().await;

        self.handler.flush_undelivered().await;
        let held = self.handler.undelivered_count().await;
        if held > 0 {
            warn!("{} responses were never delivered", held);
        }

        if let Some(store) = &self.store {
            match save_snapshot(self.handle.controller(), store.as_ref()) {
                Ok(guilds) => info!("✅ Saved final state for {} guilds", guilds),
                Err(e) => error!("Failed to save final state: {}", e),
            }
        }

        info!("Stopping metrics service...");
        if let Err(e) = self.metrics_service.stop().await {
            warn!("Failed to stop metrics service: {}", e);
        } else {
            info!("✅ Metrics service stopped");
        }

        let final_stats =
            self.handle
                .controller()
                .get_stats()
                .map_err(|e| ServiceError::BackgroundTask {
                    message: format!("Failed to get final stats: {}", e),
                })?;

        info!("Final service statistics: {:?}", final_stats);
        info!("✅ Guild-queue service shutdown completed");

        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn is_running(&self) -> bool {
        self.handle.is_running().await
    }

    pub fn handle(&self) -> ServiceHandle {
        self.handle.clone()
    }

    pub fn controller(&self) -> &QueueController {
        self.handle.controller()
    }

    /// Handler for feeding events in without the broker
    pub fn handler(&self) -> Arc<DispatchingHandler> {
        self.handler.clone()
    }

    pub fn metrics_service(&self) -> Arc<MetricsService> {
        self.metrics_service.clone()
    }

    /// Persist the current state, returning the number of guilds saved
    pub fn save_state(&self) -> Result<usize, ServiceError> {
        match &self.store {
            Some(store) => save_snapshot(self.handle.controller(), store.as_ref()).map_err(|e| {
                ServiceError::BackgroundTask {
                    message: format!("Failed to save state: {}", e),
                }
            }),
            None => Ok(0),
        }
    }

    fn restore_state(controller: &QueueController, store: &dyn StateStore) {
        match store.load() {
            Ok(snapshots) if snapshots.is_empty() => {
                info!("No saved queue state found, starting empty");
            }
            Ok(snapshots) => match controller.restore(snapshots) {
                Ok(guilds) => info!("Restored queue state for {} guilds", guilds),
                Err(e) => warn!("Failed to restore queue state: {}", e),
            },
            Err(e) => warn!("Failed to load saved queue state, starting empty: {}", e),
        }
    }

    fn initialize_metrics(
        config: &AppConfig,
        metrics_collector: Arc<MetricsCollector>,
        handle: ServiceHandle,
    ) -> Arc<MetricsService> {
        info!(
            "Initializing metrics service on port {}",
            config.service.metrics_port
        );

        let health_config = HealthServerConfig {
            port: config.service.metrics_port,
            ..Default::default()
        };

        let health_server = Arc::new(
            HealthServer::new(health_config, metrics_collector.clone()).with_service(handle),
        );

        Arc::new(MetricsService::new(metrics_collector, health_server))
    }

    async fn start_metrics_service(&mut self) -> Result<(), ServiceError> {
        info!("Starting metrics and health endpoints");

        let metrics_service = self.metrics_service.clone();
        let port = self.config.service.metrics_port;

        let metrics_handle = tokio::spawn(async move {
            if let Err(e) = metrics_service.serve().await {
                error!("Metrics service failed: {}", e);
            } else {
                info!("Metrics service task completed");
            }
        });

        self.background_tasks.push(metrics_handle);

        // Give the server a moment to bind
        tokio::time::sleep(Duration::from_millis(100)).await;

        info!("✅ Metrics service started on port {}", port);
        Ok(())
    }

    async fn initialize_amqp(config: &AppConfig) -> Result<Arc<AmqpConnection>, ServiceError> {
        info!("Connecting to AMQP broker: {}", config.amqp.url);

        let connection = AmqpConnection::new(AmqpConfig::from(config))
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to connect to AMQP: {}", e),
            })?;

        Ok(Arc::new(connection))
    }

    async fn start_amqp_consumption(&mut self) -> Result<(), ServiceError> {
        let Some(connection) = self.handle.amqp_connection().cloned() else {
            info!("No AMQP connection configured - skipping event consumption");
            return Ok(());
        };

        let queue_name = self.config.amqp.queue_name.clone();
        info!("Starting AMQP event consumption...");

        let channel = connection
            .open_channel()
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to open consumer channel: {}", e),
            })?;

        let queue_declare_args = amqprs::channel::QueueDeclareArguments::new(&queue_name)
            .durable(true)
            .auto_delete(false)
            .finish();

        channel
            .queue_declare(queue_declare_args)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to declare queue {}: {}", queue_name, e),
            })?;

        debug!("Queue '{}' declared", queue_name);

        let consumer = QueueEventConsumer::new(self.handler.clone(), channel);
        consumer
            .start_consuming(&queue_name)
            .await
            .map_err(|e| ServiceError::AmqpConnection {
                message: format!("Failed to start consuming events: {}", e),
            })?;

        self.queue_consumer = Some(consumer);

        info!("Listening for queue events on '{}'", queue_name);
        Ok(())
    }

    async fn start_background_tasks(&mut self) -> Result<(), ServiceError> {
        info!("Starting background maintenance tasks...");

        let tick_interval = self.config.queue.tick_interval();
        info!(
            "Starting reputation decay task ({}s interval)...",
            tick_interval.as_secs()
        );
        let decay_task = {
            let handler = self.handler.clone();
            let handle = self.handle.clone();

            tokio::spawn(async move {
                let start = tokio::time::Instant::now() + tick_interval;
                let mut interval = tokio::time::interval_at(start, tick_interval);

                while handle.is_running().await {
                    interval.tick().await;

                    match handler.handle_event(QueueEvent::TimerFired, None).await {
                        Ok(QueueResponse::Ticked { reports }) => {
                            let notices: usize =
                                reports.iter().map(|report| report.notices.len()).sum();
                            if notices > 0 {
                                info!(
                                    "Decay tick sent {} notices across {} guilds",
                                    notices,
                                    reports.len()
                                );
                            } else {
                                debug!("Decay tick completed - no notices");
                            }
                        }
                        Ok(other) => warn!("Decay tick produced {:?}", other),
                        Err(e) => warn!("Decay tick failed: {}", e),
                    }

                    // Held tick reports are retried on the next tick
                    let held = handler.undelivered_count().await;
                    if held > 0 {
                        warn!("{} responses still waiting for the broker", held);
                    }
                }

                info!("Reputation decay task stopped");
            })
        };

        let stats_task = {
            let handle = self.handle.clone();
            let metrics_collector = self.metrics_service.collector();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(STATS_UPDATE_INTERVAL);

                while handle.is_running().await {
                    interval.tick().await;

                    match handle.controller().get_stats() {
                        Ok(stats) => {
                            debug!(
                                "Updating metrics - guilds: {}, waiting: {}, tracked: {}",
                                stats.guilds,
                                stats.participants_waiting,
                                stats.tracked_participants
                            );
                            metrics_collector.update_from_queue_stats(&stats);
                        }
                        Err(e) => warn!("Failed to get queue stats for metrics update: {}", e),
                    }
                }

                info!("Metrics update task stopped");
            })
        };

        let health_metrics_task = {
            let handle = self.handle.clone();
            let metrics_collector = self.metrics_service.collector();

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(HEALTH_UPDATE_INTERVAL);

                while handle.is_running().await {
                    interval.tick().await;

                    metrics_collector
                        .service()
                        .uptime_seconds
                        .set(handle.uptime().as_secs() as i64);

                    match HealthCheck::check(&handle).await {
                        Ok(health) => {
                            metrics_collector.update_health_status(health.status.as_gauge());
                            for check in &health.checks {
                                metrics_collector.update_component_health(
                                    &check.name,
                                    check.status != crate::service::HealthStatus::Unhealthy,
                                );
                            }
                        }
                        Err(e) => warn!("Health check failed: {}", e),
                    }
                }

                info!("Health metrics task stopped");
            })
        };

        self.background_tasks.push(decay_task);
        self.background_tasks.push(stats_task);
        self.background_tasks.push(health_metrics_task);

        if let Some(store) = self.store.clone() {
            let snapshot_interval = self.config.snapshot_interval();
            info!(
                "Starting state snapshot task ({}s interval)...",
                snapshot_interval.as_secs()
            );
            let handle = self.handle.clone();

            self.background_tasks.push(tokio::spawn(async move {
                let start = tokio::time::Instant::now() + snapshot_interval;
                let mut interval = tokio::time::interval_at(start, snapshot_interval);

                while handle.is_running().await {
                    interval.tick().await;

                    match save_snapshot(handle.controller(), store.as_ref()) {
                        Ok(guilds) => debug!("Saved state for {} guilds", guilds),
                        Err(e) => warn!("Periodic state save failed: {}", e),
                    }
                }

                info!("State snapshot task stopped");
            }));
        }

        info!(
            "{} background tasks running",
            self.background_tasks.len()
        );
        Ok(())
    }

    async fn stop_background_tasks(&mut self) {
        let task_count = self.background_tasks.len();
        if task_count == 0 {
            info!("No background tasks to stop");
            return;
        }

        info!("Stopping {} background tasks...", task_count);

        for (i, task) in self.background_tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }

        info!("✅ All {} background tasks stopped", task_count);
    }
}

fn save_snapshot(controller: &QueueController, store: &dyn StateStore) -> anyhow::Result<usize> {
    let snapshots = controller.snapshot()?;
    store.save(&snapshots)?;
    Ok(snapshots.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::amqp::publisher::RecordingPublisher;
    use crate::types::{Participant, QueueCommand};

    fn create_test_config(state_file: Option<std::path::PathBuf>) -> AppConfig {
        let mut config = AppConfig::default();
        config.service.metrics_port = 0;
        config.service.state_file = state_file;
        config
    }

    #[tokio::test]
    async fn test_service_handle_status() {
        let handle = ServiceHandle::new("guild-queue", QueueController::default(), None);
        assert_eq!(handle.name(), "guild-queue");
        assert!(!handle.is_running().await);

        let clone = handle.clone();
        clone.set_running(true).await;
        assert!(handle.is_running().await);
        assert!(handle.amqp_connection().is_none());
    }

    #[tokio::test]
    async fn test_offline_state_handles_events() {
        let publisher = Arc::new(RecordingPublisher::new());
        let app = AppState::with_publisher(create_test_config(None), publisher.clone()).unwrap();

        let handler = app.handler();
        handler
            .handle_event(QueueEvent::GuildJoined { guild_id: 2 }, None)
            .await
            .unwrap();
        handler
            .handle_event(
                QueueEvent::CommandInvoked {
                    guild_id: 2,
                    invoker: Participant::new(30, "tom nook"),
                    command: QueueCommand::Join,
                },
                None,
            )
            .await
            .unwrap();

        assert_eq!(app.controller().get_stats().unwrap().participants_waiting, 1);
        assert_eq!(publisher.published().len(), 2);
        assert_eq!(app.save_state().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let first = AppState::with_publisher(
            create_test_config(Some(path.clone())),
            Arc::new(RecordingPublisher::new()),
        )
        .unwrap();
        first.controller().guild_joined(6).unwrap();
        first
            .controller()
            .join(6, Participant::new(40, "k.k."))
            .unwrap();
        assert_eq!(first.save_state().unwrap(), 1);

        let second = AppState::with_publisher(
            create_test_config(Some(path)),
            Arc::new(RecordingPublisher::new()),
        )
        .unwrap();
        let view = second.controller().view(6).unwrap();
        assert_eq!(view.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_start_and_shutdown_without_broker() {
        let mut app = AppState::with_publisher(
            create_test_config(None),
            Arc::new(RecordingPublisher::new()),
        )
        .unwrap();

        app.start().await.unwrap();
        assert!(app.is_running().await);

        app.shutdown().await.unwrap();
        assert!(!app.is_running().await);
    }
}
