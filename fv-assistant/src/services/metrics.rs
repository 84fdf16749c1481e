use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static RELAY_TURNS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static MODEL_SESSIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Install the HTTP metrics recorder and register the chat counters.
/// Calling it again is a no-op.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    if PROMETHEUS_REGISTRY.get().is_some() {
        return Ok(());
    }

    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            let _ = METRICS_HANDLE.set(handle);
        }
        Err(e) => tracing::warn!("Prometheus recorder not installed: {}", e),
    }

    let registry = Registry::new();

    let relay_turns = IntCounterVec::new(
        Opts::new("relay_turns_total", "Submitted chat turns by outcome"),
        &["outcome"],
    )?;
    let model_sessions = IntCounterVec::new(
        Opts::new(
            "model_sessions_total",
            "Model session creation attempts by outcome",
        ),
        &["outcome"],
    )?;

    registry.register(Box::new(relay_turns.clone()))?;
    registry.register(Box::new(model_sessions.clone()))?;

    let _ = PROMETHEUS_REGISTRY.set(registry);
    let _ = RELAY_TURNS_TOTAL.set(relay_turns);
    let _ = MODEL_SESSIONS_TOTAL.set(model_sessions);

    Ok(())
}

pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&registry.gather(), &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Count one relay outcome (`ok`, `busy`, `network`, ...).
pub fn record_relay(outcome: &str) {
    if let Some(counter) = RELAY_TURNS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Count one model session creation attempt.
pub fn record_model_session(outcome: &str) {
    if let Some(counter) = MODEL_SESSIONS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}
