//! Metrics module for study-service.
//! Provides Prometheus metrics for quota gating, chat turns, and token spend.

use once_cell::sync::Lazy;
use prometheus::{
    histogram_opts, opts, register_histogram_vec, register_int_counter_vec, Encoder, HistogramVec,
    IntCounterVec, TextEncoder,
};
use std::sync::OnceLock;

/// Database query duration histogram
pub static DB_QUERY_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        histogram_opts!("study_db_query_duration_seconds", "Database query duration"),
        &["operation"]
    )
    .expect("Failed to register DB_QUERY_DURATION")
});

/// Gate denials counter (per-class metering)
pub static GATE_DENIALS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Chat turns counter by outcome
pub static CHAT_TURNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Tokens committed counter (per-class metering)
pub static TOKENS_COMMITTED_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Ledger cost counter by model and sponsorship (monetary tracking)
pub static LEDGER_COST_TOTAL: OnceLock<prometheus::CounterVec> = OnceLock::new();

/// Provider request duration histogram
pub static PROVIDER_REQUEST_DURATION: OnceLock<HistogramVec> = OnceLock::new();

/// Error counter for alerting
pub static ERRORS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize all metrics. Call once at startup.
pub fn init_metrics() {
    GATE_DENIALS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "study_gate_denials_total",
                "Total chat gate denials by class and reason"
            ),
            &["class_id", "reason"]
        )
        .expect("Failed to register GATE_DENIALS_TOTAL")
    });

    CHAT_TURNS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "study_chat_turns_total",
                "Total chat turns by class and outcome"
            ),
            &["class_id", "outcome"]
        )
        .expect("Failed to register CHAT_TURNS_TOTAL")
    });

    TOKENS_COMMITTED_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!(
                "study_tokens_committed_total",
                "Total tokens committed to usage trackers by class"
            ),
            &["class_id"]
        )
        .expect("Failed to register TOKENS_COMMITTED_TOTAL")
    });

    LEDGER_COST_TOTAL.get_or_init(|| {
        prometheus::register_counter_vec!(
            prometheus::opts!(
                "study_ledger_cost_total",
                "Total ledger cost by model and sponsorship"
            ),
            &["model", "sponsored"]
        )
        .expect("Failed to register LEDGER_COST_TOTAL")
    });

    // Provider latency with buckets sized for LLM round trips
    PROVIDER_REQUEST_DURATION.get_or_init(|| {
        register_histogram_vec!(
            histogram_opts!(
                "study_provider_request_duration_seconds",
                "Completion provider request duration",
                vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0]
            ),
            &["model", "status"]
        )
        .expect("Failed to register PROVIDER_REQUEST_DURATION")
    });

    ERRORS_TOTAL.get_or_init(|| {
        register_int_counter_vec!(
            opts!("study_errors_total", "Total errors by type for alerting"),
            &["error_type", "operation"]
        )
        .expect("Failed to register ERRORS_TOTAL")
    });

    // Force initialization of lazy statics
    let _ = &*DB_QUERY_DURATION;
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("Failed to encode metrics");
    String::from_utf8(buffer).expect("Failed to convert metrics to string")
}

/// Record a gate denial.
pub fn record_gate_denial(class_id: &str, reason: &str) {
    if let Some(counter) = GATE_DENIALS_TOTAL.get() {
        counter.with_label_values(&[class_id, reason]).inc();
    }
}

/// Record a chat turn outcome.
pub fn record_chat_turn(class_id: &str, outcome: &str) {
    if let Some(counter) = CHAT_TURNS_TOTAL.get() {
        counter.with_label_values(&[class_id, outcome]).inc();
    }
}

/// Record tokens committed to a tracker.
pub fn record_tokens_committed(class_id: &str, tokens: i64) {
    if let Some(counter) = TOKENS_COMMITTED_TOTAL.get() {
        counter
            .with_label_values(&[class_id])
            .inc_by(tokens.max(0) as u64);
    }
}

/// Record a ledger cost entry.
pub fn record_ledger_cost(model: &str, sponsored: bool, amount: f64) {
    if let Some(counter) = LEDGER_COST_TOTAL.get() {
        counter
            .with_label_values(&[model, if sponsored { "true" } else { "false" }])
            .inc_by(amount.abs());
    }
}

/// Record provider request duration.
pub fn record_provider_request(model: &str, status: &str, duration_secs: f64) {
    if let Some(histogram) = PROVIDER_REQUEST_DURATION.get() {
        histogram
            .with_label_values(&[model, status])
            .observe(duration_secs);
    }
}

/// Record an error for alerting.
pub fn record_error(error_type: &str, operation: &str) {
    if let Some(counter) = ERRORS_TOTAL.get() {
        counter.with_label_values(&[error_type, operation]).inc();
    }
}
