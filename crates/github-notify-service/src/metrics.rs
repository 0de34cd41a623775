//! Prometheus metrics for the service.

use github_notify_core::DeliveryOutcome;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Service metrics, registered on a registry owned by the service
#[derive(Debug)]
pub struct ServiceMetrics {
    registry: Registry,

    // HTTP request metrics
    pub http_requests_total: IntCounterVec,

    // Webhook processing metrics
    pub webhook_deliveries_total: IntCounterVec,
    pub webhook_duration_seconds: Histogram,
    pub webhook_rejections_total: IntCounterVec,

    // Fan-out metrics
    pub posts_total: IntCounterVec,

    // Command metrics
    pub commands_total: IntCounter,
}

impl ServiceMetrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new_custom(Some("github_notify".to_string()), None)?;

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "status"],
        )?;
        let webhook_deliveries_total = IntCounterVec::new(
            Opts::new("webhook_deliveries_total", "Webhook deliveries by outcome"),
            &["outcome"],
        )?;
        let webhook_duration_seconds = Histogram::with_opts(
            HistogramOpts::new("webhook_duration_seconds", "Webhook processing time distribution")
                .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        )?;
        let webhook_rejections_total = IntCounterVec::new(
            Opts::new("webhook_rejections_total", "Deliveries refused before processing"),
            &["reason"],
        )?;
        let posts_total = IntCounterVec::new(
            Opts::new("posts_total", "Channel posts attempted by result"),
            &["result"],
        )?;
        let commands_total = IntCounter::new("commands_total", "Slash commands handled")?;

        registry.register(Box::new(http_requests_total.clone()))?;
        registry.register(Box::new(webhook_deliveries_total.clone()))?;
        registry.register(Box::new(webhook_duration_seconds.clone()))?;
        registry.register(Box::new(webhook_rejections_total.clone()))?;
        registry.register(Box::new(posts_total.clone()))?;
        registry.register(Box::new(commands_total.clone()))?;

        Ok(Arc::new(Self {
            registry,
            http_requests_total,
            webhook_deliveries_total,
            webhook_duration_seconds,
            webhook_rejections_total,
            posts_total,
            commands_total,
        }))
    }

    pub fn record_http_request(&self, method: &str, status: u16) {
        let status = status.to_string();
        self.http_requests_total
            .with_label_values(&[method, status.as_str()])
            .inc();
    }

    /// Record a processed delivery and its fan-out results
    pub fn record_delivery(&self, outcome: &DeliveryOutcome, duration: Duration) {
        self.webhook_deliveries_total
            .with_label_values(&[outcome.label()])
            .inc();
        self.webhook_duration_seconds.observe(duration.as_secs_f64());

        if let DeliveryOutcome::Delivered(report) = outcome {
            self.posts_total
                .with_label_values(&["success"])
                .inc_by(report.successful.len() as u64);
            self.posts_total
                .with_label_values(&["failure"])
                .inc_by(report.failed.len() as u64);
        }
    }

    pub fn record_rejection(&self, reason: &str) {
        self.webhook_rejections_total.with_label_values(&[reason]).inc();
    }

    /// Text exposition of every metric
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
