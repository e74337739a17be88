//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (probabilities, rates, capacities)
//! - Check addresses parse before anything binds to them
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: SimConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::SimConfig;

/// One semantic problem found in a config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(errors: &mut Vec<ValidationError>, field: &str, message: impl Into<String>) {
    errors.push(ValidationError {
        field: field.to_string(),
        message: message.into(),
    });
}

/// Check every semantic constraint, collecting all violations.
pub fn validate_config(config: &SimConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        err(
            &mut errors,
            "listener.bind_address",
            format!("not a socket address: {:?}", config.listener.bind_address),
        );
    }
    if config.timeouts.request_secs == 0 {
        err(&mut errors, "timeouts.request_secs", "must be positive");
    }

    if config.telemetry.metrics_enabled
        && config.telemetry.metrics_address.parse::<SocketAddr>().is_err()
    {
        err(
            &mut errors,
            "telemetry.metrics_address",
            format!("not a socket address: {:?}", config.telemetry.metrics_address),
        );
    }
    if config.telemetry.queue_capacity == 0 {
        err(&mut errors, "telemetry.queue_capacity", "must be positive");
    }
    if config.telemetry.service_name.is_empty() {
        err(&mut errors, "telemetry.service_name", "must not be empty");
    }

    let sim = &config.simulation;
    if !(0.0..=1.0).contains(&sim.payment_failure_probability) {
        err(
            &mut errors,
            "simulation.payment_failure_probability",
            "must be within [0, 1]",
        );
    }
    if sim.tax_rate < 0.0 {
        err(&mut errors, "simulation.tax_rate", "must not be negative");
    }
    if sim.discount_percents.is_empty() {
        err(&mut errors, "simulation.discount_percents", "must not be empty");
    }
    if sim.discount_percents.iter().any(|&d| d > 100) {
        err(
            &mut errors,
            "simulation.discount_percents",
            "percentages above 100 are not meaningful",
        );
    }
    if sim.slow_payment_threshold_ms < 0.0 {
        err(
            &mut errors,
            "simulation.slow_payment_threshold_ms",
            "must not be negative",
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&SimConfig::default()).is_ok());
    }

    #[test]
    fn all_violations_are_reported() {
        let mut config = SimConfig::default();
        config.listener.bind_address = "nonsense".to_string();
        config.simulation.payment_failure_probability = 1.5;
        config.simulation.discount_percents.clear();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"simulation.payment_failure_probability"));
        assert!(fields.contains(&"simulation.discount_percents"));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn metrics_address_is_ignored_when_disabled() {
        let mut config = SimConfig::default();
        config.telemetry.metrics_enabled = false;
        config.telemetry.metrics_address = "nonsense".to_string();
        assert!(validate_config(&config).is_ok());
    }
}
