//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! simulator. All types derive Serde traits for deserialization from config
//! files, and every field has a default so a minimal (or missing) config
//! still yields a runnable service.

use serde::{Deserialize, Serialize};

/// Root configuration for the simulator.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SimConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Telemetry export and service identity settings.
    pub telemetry: TelemetryConfig,

    /// Simulated-flow tunables.
    pub simulation: SimulationConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// End-to-end request timeout in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Where exported telemetry goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExporterKind {
    /// One JSON line per signal on stdout.
    Stdout,
    /// Discard everything (load tests, benchmarks).
    None,
}

/// Telemetry settings: service identity, export target, metrics endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name stamped onto every trace.
    pub service_name: String,

    /// Service version stamped onto every trace.
    pub service_version: String,

    /// Deployment environment (staging, production, ...).
    pub environment: String,

    /// Export target for spans, metrics, and logs.
    pub exporter: ExporterKind,

    /// Bounded export queue size; overflow is dropped and counted.
    pub queue_capacity: usize,

    /// Enable the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Prometheus scrape listener address.
    pub metrics_address: String,

    /// Emit console logs as JSON instead of human-readable lines.
    pub log_json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "shopsim".to_string(),
            service_version: "1.0.0".to_string(),
            environment: "staging".to_string(),
            exporter: ExporterKind::Stdout,
            queue_capacity: 1024,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9100".to_string(),
            log_json: false,
        }
    }
}

/// Tunables for the simulated flows.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Fixed RNG seed for reproducible runs; absent means process entropy.
    pub seed: Option<u64>,

    /// Probability that checkout's charge-payment step declines.
    pub payment_failure_probability: f64,

    /// Tax rate applied to the discounted subtotal.
    pub tax_rate: f64,

    /// Discount percentages drawn uniformly; repeats act as weights.
    pub discount_percents: Vec<u32>,

    /// Payment delays above this many milliseconds log a warning.
    pub slow_payment_threshold_ms: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            payment_failure_probability: 0.05,
            tax_rate: 0.20,
            discount_percents: vec![0, 0, 0, 5, 10, 15],
            slow_payment_threshold_ms: 150.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_simulated_shop() {
        let config = SimConfig::default();
        assert_eq!(config.telemetry.service_name, "shopsim");
        assert_eq!(config.simulation.payment_failure_probability, 0.05);
        assert_eq!(config.simulation.tax_rate, 0.20);
        assert_eq!(config.simulation.discount_percents, vec![0, 0, 0, 5, 10, 15]);
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let config: SimConfig = toml::from_str(
            r#"
            [listener]
            bind_address = "127.0.0.1:9999"

            [telemetry]
            exporter = "none"
            "#,
        )
        .unwrap();
        assert_eq!(config.listener.bind_address, "127.0.0.1:9999");
        assert_eq!(config.telemetry.exporter, ExporterKind::None);
        assert_eq!(config.timeouts.request_secs, 30);
        assert!(config.simulation.seed.is_none());
    }
}
