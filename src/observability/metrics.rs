//! Metric counters.
//!
//! # Metrics
//! - `config_loads_total` (counter): loads run, by config
//! - `config_saves_total` (counter): saves attempted, by config and outcome
//! - `config_external_changes_total` (counter): file edits not made by us, by config

pub fn record_load(config: &str) {
    metrics::counter!("config_loads_total", "config" => config.to_string()).increment(1);
}

pub fn record_save(config: &str, outcome: &'static str) {
    metrics::counter!(
        "config_saves_total",
        "config" => config.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_external_change(config: &str) {
    metrics::counter!("config_external_changes_total", "config" => config.to_string())
        .increment(1);
}
