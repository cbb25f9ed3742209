//! # Prometheus Metrics
//!
//! Exposes operational metrics for the balances node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::core::Collector;
use prometheus::{Encoder, IntCounter, IntGauge, Registry, TextEncoder};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers and background tasks.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total `/balances` and `/ws/balances` requests served.
    pub balance_requests_total: IntCounter,
    /// Addresses with at least one live derivation subscriber.
    pub active_derivations: IntGauge,
    /// Currently open balance WebSocket connections.
    pub ws_connections: IntGauge,
    /// Current devnet best block.
    pub best_block: IntGauge,
    /// Derivations that ended with an error.
    pub derivation_failures_total: IntCounter,
}

fn register<C: Collector + Clone + 'static>(
    registry: &Registry,
    metric: C,
) -> Result<C, prometheus::Error> {
    registry.register(Box::new(metric.clone()))?;
    Ok(metric)
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("nova".into()), None)?;

        let balance_requests_total = register(
            &registry,
            IntCounter::new(
                "balance_requests_total",
                "Total derived balance requests, HTTP and WebSocket",
            )?,
        )?;
        let active_derivations = register(
            &registry,
            IntGauge::new(
                "active_derivations",
                "Addresses with a live balance derivation",
            )?,
        )?;
        let ws_connections = register(
            &registry,
            IntGauge::new("ws_connections", "Open balance WebSocket connections")?,
        )?;
        let best_block = register(
            &registry,
            IntGauge::new("best_block", "Current devnet best block number")?,
        )?;
        let derivation_failures_total = register(
            &registry,
            IntCounter::new(
                "derivation_failures_total",
                "Balance derivations that ended with an error",
            )?,
        )?;

        Ok(Self {
            registry,
            balance_requests_total,
            active_derivations,
            ws_connections,
            best_block,
            derivation_failures_total,
        })
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(State(metrics): State<SharedMetrics>) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}
