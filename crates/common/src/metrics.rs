use axum::http::StatusCode;
use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, Encoder, IntCounterVec, TextEncoder};

// Prometheus metrics (default registry)
pub static DB_OPERATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "uptime_db_operations_total",
        "Database service operations by model, operation and outcome",
        &["model", "op", "outcome"]
    )
    .expect("register db_operations_total")
});

pub static PERMISSION_DENIED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "uptime_permission_denied_total",
        "Requests rejected by the permission layer",
        &["model", "op"]
    )
    .expect("register permission_denied_total")
});

pub fn record_db_operation(model: &str, op: &str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    DB_OPERATIONS_TOTAL.with_label_values(&[model, op, outcome]).inc();
}

pub fn record_permission_denied(model: &str, op: &str) {
    PERMISSION_DENIED_TOTAL.with_label_values(&[model, op]).inc();
}

pub fn encode_metrics() -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("metrics encode error: {e}"),
        );
    }
    (StatusCode::OK, String::from_utf8(buffer).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_output() {
        record_db_operation("Monitor", "create", true);
        record_permission_denied("Monitor", "read");
        let (status, body) = encode_metrics();
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("uptime_db_operations_total"));
        assert!(body.contains("uptime_permission_denied_total"));
    }
}
