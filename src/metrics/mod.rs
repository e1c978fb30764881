//! Prometheus metrics for the content store.
//!
//! - Template metrics (lookups, renders, unresolved placeholders)
//! - Registry metrics (updates, watch subscribers, delivered change events)
//! - Storage metrics (backend latency and errors)

use lazy_static::lazy_static;
use prometheus::{
    register_histogram_vec, register_int_counter, register_int_counter_vec, register_int_gauge,
    Encoder, HistogramVec, IntCounter, IntCounterVec, IntGauge, TextEncoder,
};

/// Prefix for all metrics
const METRIC_PREFIX: &str = "bcs";

lazy_static! {
    // ============================================================================
    // Template Metrics
    // ============================================================================

    /// Template lookups by route, labelled by outcome ("hit", "not_found")
    pub static ref TEMPLATE_LOOKUPS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_template_lookups_total", METRIC_PREFIX),
        "Template lookups by route",
        &["result"]
    ).unwrap();

    /// Templates rendered
    pub static ref TEMPLATE_RENDERS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_renders_total", METRIC_PREFIX),
        "Total template renders"
    ).unwrap();

    /// Placeholders left verbatim because no binding was supplied
    pub static ref TEMPLATE_UNRESOLVED_PLACEHOLDERS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_template_unresolved_placeholders_total", METRIC_PREFIX),
        "Placeholders left unresolved during rendering"
    ).unwrap();

    /// Rejected template writes by reason ("conflict", "invalid")
    pub static ref TEMPLATE_WRITES_REJECTED_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_template_writes_rejected_total", METRIC_PREFIX),
        "Template writes rejected before reaching the backend",
        &["reason"]
    ).unwrap();

    // ============================================================================
    // Registry Metrics
    // ============================================================================

    /// Setting updates accepted
    pub static ref SETTINGS_UPDATES_TOTAL: IntCounter = register_int_counter!(
        format!("{}_settings_updates_total", METRIC_PREFIX),
        "Total setting updates"
    ).unwrap();

    /// Active watch subscriptions
    pub static ref SETTINGS_WATCH_SUBSCRIBERS: IntGauge = register_int_gauge!(
        format!("{}_settings_watch_subscribers", METRIC_PREFIX),
        "Active setting watch subscriptions"
    ).unwrap();

    /// Change events queued to watch subscribers
    pub static ref SETTINGS_WATCH_EVENTS_TOTAL: IntCounter = register_int_counter!(
        format!("{}_settings_watch_events_total", METRIC_PREFIX),
        "Change events queued to watch subscribers"
    ).unwrap();

    // ============================================================================
    // Storage Metrics
    // ============================================================================

    /// Backend call latency
    pub static ref STORAGE_OPERATION_DURATION: HistogramVec = register_histogram_vec!(
        format!("{}_storage_operation_duration_seconds", METRIC_PREFIX),
        "Document backend call latency",
        &["backend", "operation"],
        vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    ).unwrap();

    /// Backend call failures by kind
    pub static ref STORAGE_ERRORS_TOTAL: IntCounterVec = register_int_counter_vec!(
        format!("{}_storage_errors_total", METRIC_PREFIX),
        "Document backend call failures",
        &["backend", "kind"]
    ).unwrap();
}

/// Encode all registered metrics in the Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
