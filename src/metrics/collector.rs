//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the guild-queue service
//! using Prometheus metrics.

use crate::error::QueueError;
use crate::queue::QueueControllerStats;
use crate::types::{AckOutcome, DistressOutcome, Notice, PenaltyReport};
use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the queue service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Roster and command metrics
    queue_metrics: QueueMetrics,

    /// Acknowledgement, distress and decay metrics
    reputation_metrics: ReputationMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Total AMQP messages processed
    pub amqp_messages_total: IntCounterVec,

    /// AMQP message processing errors
    pub amqp_errors_total: IntCounterVec,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,

    /// Component health status
    pub component_health: IntGaugeVec,
}

/// Roster and command metrics
#[derive(Clone)]
pub struct QueueMetrics {
    /// Commands handled, by command and result
    pub commands_total: IntCounterVec,

    /// Guilds currently tracked
    pub tracked_guilds: IntGauge,

    /// Participants waiting across all rosters
    pub participants_waiting: IntGauge,

    /// Rosters at capacity
    pub full_rosters: IntGauge,

    /// Announcements still accepting reactions
    pub live_announcements: IntGauge,
}

/// Reputation metrics
#[derive(Clone)]
pub struct ReputationMetrics {
    /// Acknowledgements by outcome (awarded, undone, ignored)
    pub acknowledgements_total: IntCounterVec,

    /// Distress requests by outcome
    pub distress_total: IntCounterVec,

    /// Participants removed by reputation decay
    pub evictions_total: IntCounter,

    /// Warnings sent to waiting participants
    pub warnings_total: IntCounter,

    /// Heads asked whether they need help
    pub need_help_total: IntCounter,

    /// Participants with a reputation entry
    pub tracked_participants: IntGauge,

    /// Decay ticks run
    pub ticks_total: IntCounter,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Time spent handling one command
    pub command_duration: HistogramVec,

    /// Time spent on one decay tick across all guilds
    pub tick_duration: Histogram,

    /// AMQP operation durations
    pub amqp_operation_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let queue_metrics = QueueMetrics::new(&registry)?;
        let reputation_metrics = ReputationMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            queue_metrics,
            reputation_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    pub fn queue(&self) -> &QueueMetrics {
        &self.queue_metrics
    }

    pub fn reputation(&self) -> &ReputationMetrics {
        &self.reputation_metrics
    }

    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    /// Update gauges from a controller stats snapshot
    pub fn update_from_queue_stats(&self, stats: &QueueControllerStats) {
        self.queue_metrics.tracked_guilds.set(stats.guilds as i64);
        self.queue_metrics
            .participants_waiting
            .set(stats.participants_waiting as i64);
        self.queue_metrics.full_rosters.set(stats.full_rosters as i64);
        self.queue_metrics
            .live_announcements
            .set(stats.live_announcements as i64);
        self.reputation_metrics
            .tracked_participants
            .set(stats.tracked_participants as i64);
    }

    /// Record a handled command; failures are labelled with the error kind
    pub fn record_command(
        &self,
        command: &str,
        error: Option<&QueueError>,
        duration: Duration,
    ) {
        let result = error.map_or("success", QueueError::kind);

        self.queue_metrics
            .commands_total
            .with_label_values(&[command, result])
            .inc();

        self.performance_metrics
            .command_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    pub fn record_acknowledgement(&self, outcome: &AckOutcome) {
        let label = match outcome {
            AckOutcome::Awarded { .. } => "awarded",
            AckOutcome::Undone { .. } => "undone",
            AckOutcome::Ignored => "ignored",
        };
        self.reputation_metrics
            .acknowledgements_total
            .with_label_values(&[label])
            .inc();
    }

    pub fn record_distress(&self, outcome: &DistressOutcome) {
        let label = match outcome {
            DistressOutcome::Requeued { .. } => "requeued",
            DistressOutcome::AlreadyHead { .. } => "already_head",
            DistressOutcome::Rejected { .. } => "rejected",
            DistressOutcome::Ignored => "ignored",
        };
        self.reputation_metrics
            .distress_total
            .with_label_values(&[label])
            .inc();
    }

    /// Count evictions, warnings and help requests
    pub fn record_notices(&self, notices: &[Notice]) {
        for notice in notices {
            match notice {
                Notice::Evicted { .. } => self.reputation_metrics.evictions_total.inc(),
                Notice::Warning { .. } => self.reputation_metrics.warnings_total.inc(),
                Notice::NeedHelp { .. } => self.reputation_metrics.need_help_total.inc(),
            }
        }
    }

    /// Record one decay tick over all guilds
    pub fn record_tick(&self, reports: &[PenaltyReport], duration: Duration) {
        self.reputation_metrics.ticks_total.inc();
        for report in reports {
            self.record_notices(&report.notices);
        }
        self.performance_metrics
            .tick_duration
            .observe(duration.as_secs_f64());
    }

    /// Record AMQP operation
    pub fn record_amqp_operation(&self, operation: &str, success: bool, duration: Duration) {
        let status = if success { "success" } else { "error" };

        self.service_metrics
            .amqp_messages_total
            .with_label_values(&[operation, status])
            .inc();

        if !success {
            self.service_metrics
                .amqp_errors_total
                .with_label_values(&[operation])
                .inc();
        }

        self.performance_metrics
            .amqp_operation_duration
            .with_label_values(&[operation, status])
            .observe(duration.as_secs_f64());
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }

    /// Update component health
    pub fn update_component_health(&self, component: &str, healthy: bool) {
        let status = if healthy { 1 } else { 0 };
        self.service_metrics
            .component_health
            .with_label_values(&[component])
            .set(status);
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("guild_queue_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let amqp_messages_total = IntCounterVec::new(
            Opts::new(
                "guild_queue_amqp_messages_total",
                "Total AMQP messages processed",
            ),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_messages_total.clone()))?;

        let amqp_errors_total = IntCounterVec::new(
            Opts::new("guild_queue_amqp_errors_total", "Total AMQP errors"),
            &["operation"],
        )?;
        registry.register(Box::new(amqp_errors_total.clone()))?;

        let health_status = IntGauge::new(
            "guild_queue_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        let component_health = IntGaugeVec::new(
            Opts::new("guild_queue_component_health", "Component health status"),
            &["component"],
        )?;
        registry.register(Box::new(component_health.clone()))?;

        Ok(Self {
            uptime_seconds,
            amqp_messages_total,
            amqp_errors_total,
            health_status,
            component_health,
        })
    }
}

impl QueueMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let commands_total = IntCounterVec::new(
            Opts::new("guild_queue_commands_total", "Commands handled"),
            &["command", "result"],
        )?;
        registry.register(Box::new(commands_total.clone()))?;

        let tracked_guilds =
            IntGauge::new("guild_queue_tracked_guilds", "Guilds currently tracked")?;
        registry.register(Box::new(tracked_guilds.clone()))?;

        let participants_waiting = IntGauge::new(
            "guild_queue_participants_waiting",
            "Participants waiting across all rosters",
        )?;
        registry.register(Box::new(participants_waiting.clone()))?;

        let full_rosters = IntGauge::new("guild_queue_full_rosters", "Rosters at capacity")?;
        registry.register(Box::new(full_rosters.clone()))?;

        let live_announcements = IntGauge::new(
            "guild_queue_live_announcements",
            "Announcements still accepting reactions",
        )?;
        registry.register(Box::new(live_announcements.clone()))?;

        Ok(Self {
            commands_total,
            tracked_guilds,
            participants_waiting,
            full_rosters,
            live_announcements,
        })
    }
}

impl ReputationMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let acknowledgements_total = IntCounterVec::new(
            Opts::new(
                "guild_queue_acknowledgements_total",
                "Acknowledgement reactions by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(acknowledgements_total.clone()))?;

        let distress_total = IntCounterVec::new(
            Opts::new("guild_queue_distress_total", "Distress requests by outcome"),
            &["outcome"],
        )?;
        registry.register(Box::new(distress_total.clone()))?;

        let evictions_total = IntCounter::new(
            "guild_queue_evictions_total",
            "Participants evicted for inactivity",
        )?;
        registry.register(Box::new(evictions_total.clone()))?;

        let warnings_total =
            IntCounter::new("guild_queue_warnings_total", "Inactivity warnings issued")?;
        registry.register(Box::new(warnings_total.clone()))?;

        let need_help_total = IntCounter::new(
            "guild_queue_need_help_total",
            "Heads asked whether they need help",
        )?;
        registry.register(Box::new(need_help_total.clone()))?;

        let tracked_participants = IntGauge::new(
            "guild_queue_tracked_participants",
            "Participants with a reputation entry",
        )?;
        registry.register(Box::new(tracked_participants.clone()))?;

        let ticks_total = IntCounter::new("guild_queue_ticks_total", "Decay ticks run")?;
        registry.register(Box::new(ticks_total.clone()))?;

        Ok(Self {
            acknowledgements_total,
            distress_total,
            evictions_total,
            warnings_total,
            need_help_total,
            tracked_participants,
            ticks_total,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "guild_queue_command_duration_seconds",
                "Command handling time",
            )
            .buckets(vec![0.00001, 0.0001, 0.001, 0.005, 0.01, 0.05, 0.1]),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "guild_queue_tick_duration_seconds",
                "Decay tick time across all guilds",
            )
            .buckets(vec![0.0001, 0.001, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let amqp_operation_duration = HistogramVec::new(
            HistogramOpts::new(
                "guild_queue_amqp_operation_duration_seconds",
                "AMQP operation duration",
            )
            .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["operation", "status"],
        )?;
        registry.register(Box::new(amqp_operation_duration.clone()))?;

        Ok(Self {
            command_duration,
            tick_duration,
            amqp_operation_duration,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Participant;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _queue = collector.queue();
        let _reputation = collector.reputation();
        let _performance = collector.performance();
    }

    #[test]
    fn test_command_recording() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_command("join", None, Duration::from_micros(40));
        collector.record_command(
            "join",
            Some(&QueueError::Full { capacity: 2 }),
            Duration::from_micros(25),
        );

        let commands = &collector.queue().commands_total;
        assert_eq!(commands.with_label_values(&["join", "success"]).get(), 1);
        assert_eq!(commands.with_label_values(&["join", "full"]).get(), 1);
    }

    #[test]
    fn test_tick_recording_counts_notices() {
        let collector = MetricsCollector::new().unwrap();
        let participant = Participant::new(1, "tom");
        let report = PenaltyReport {
            guild_id: 1,
            notices: vec![
                Notice::Evicted {
                    participant: participant.clone(),
                },
                Notice::Warning {
                    participant,
                    count: 1,
                },
            ],
            roster: None,
        };

        collector.record_tick(&[report], Duration::from_millis(2));

        let reputation = collector.reputation();
        assert_eq!(reputation.ticks_total.get(), 1);
        assert_eq!(reputation.evictions_total.get(), 1);
        assert_eq!(reputation.warnings_total.get(), 1);
        assert_eq!(reputation.need_help_total.get(), 0);
    }

    #[test]
    fn test_stats_update_gauges() {
        let collector = MetricsCollector::new().unwrap();
        collector.update_from_queue_stats(&QueueControllerStats {
            guilds: 3,
            participants_waiting: 12,
            tracked_participants: 5,
            full_rosters: 1,
            live_announcements: 2,
        });

        assert_eq!(collector.queue().tracked_guilds.get(), 3);
        assert_eq!(collector.queue().participants_waiting.get(), 12);
        assert_eq!(collector.reputation().tracked_participants.get(), 5);
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().unwrap();

        collector.update_health_status(2);
        collector.update_component_health("queue_controller", true);
        collector.update_component_health("amqp", false);

        assert_eq!(collector.service().health_status.get(), 2);
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().unwrap();
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.stop() >= Duration::from_millis(10));
    }
}
