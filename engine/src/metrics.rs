//! Prometheus metrics for the enable-state engine

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{
    register_counter, register_counter_vec, Counter, CounterVec, Encoder, TextEncoder,
};

// ── Configuration changes ────────────────────────────────────────────────────

pub static CONFIG_CHANGES: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tracemux_config_changes_total",
        "Provider configuration changes applied under the lock",
        &["op"]
    )
    .unwrap()
});

pub static EVENT_REFRESHES: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "tracemux_event_refreshes_total",
        "Event enable masks recomputed by provider refreshes"
    )
    .unwrap()
});

// ── Registration ─────────────────────────────────────────────────────────────

pub static EVENTS_REGISTERED: Lazy<Counter> = Lazy::new(|| {
    register_counter!(
        "tracemux_events_registered_total",
        "Events registered on any provider"
    )
    .unwrap()
});

// ── Callbacks ────────────────────────────────────────────────────────────────

pub static CALLBACKS: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "tracemux_callbacks_total",
        "Provider callback dispatches by outcome",
        &["outcome"]
    )
    .unwrap()
});

/// Render all registered metrics to Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_includes_touched_metrics() {
        EVENTS_REGISTERED.inc();
        CALLBACKS.with_label_values(&["invoked"]).inc_by(0.0);
        let text = encode_metrics().unwrap();
        assert!(text.contains("tracemux_events_registered_total"));
        assert!(text.contains("tracemux_callbacks_total"));
    }
}
