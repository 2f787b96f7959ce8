//! Configuration validation.
//!
//! Serde handles syntax; this checks value ranges and returns every problem
//! found, not just the first.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error("kubernetes.api_server must not be empty")]
    EmptyApiServer,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("circuit_breaker.failure_rate_threshold must be in (0, 1], got {0}")]
    FailureRate(f64),

    #[error("circuit_breaker.counter_update_interval_secs ({interval}) exceeds counter_sliding_window_secs ({window})")]
    UpdateIntervalExceedsWindow { interval: u64, window: u64 },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.kubernetes.api_server.trim().is_empty() {
        errors.push(ValidationError::EmptyApiServer);
    }

    let non_zero: [(&'static str, u64); 8] = [
        (
            "kubernetes.api_server_port",
            u64::from(config.kubernetes.api_server_port),
        ),
        ("client.response_timeout_secs", config.client.response_timeout_secs),
        ("timeouts.request_secs", config.timeouts.request_secs),
        ("cleanup_timer.period_secs", config.cleanup_timer.period_secs),
        (
            "circuit_breaker.circuit_open_window_secs",
            config.circuit_breaker.circuit_open_window_secs,
        ),
        (
            "circuit_breaker.trial_request_interval_secs",
            config.circuit_breaker.trial_request_interval_secs,
        ),
        (
            "circuit_breaker.counter_sliding_window_secs",
            config.circuit_breaker.counter_sliding_window_secs,
        ),
        (
            "circuit_breaker.counter_update_interval_secs",
            config.circuit_breaker.counter_update_interval_secs,
        ),
    ];
    for (name, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    let rate = config.circuit_breaker.failure_rate_threshold;
    if !(rate > 0.0 && rate <= 1.0) {
        errors.push(ValidationError::FailureRate(rate));
    }

    let cb = &config.circuit_breaker;
    if cb.counter_update_interval_secs > cb.counter_sliding_window_secs {
        errors.push(ValidationError::UpdateIntervalExceedsWindow {
            interval: cb.counter_update_interval_secs,
            window: cb.counter_sliding_window_secs,
        });
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
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.kubernetes.api_server = " ".into();
        config.cleanup_timer.period_secs = 0;
        config.circuit_breaker.failure_rate_threshold = 1.5;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::EmptyApiServer));
        assert!(errors.contains(&ValidationError::Zero("cleanup_timer.period_secs")));
        assert!(errors.contains(&ValidationError::FailureRate(1.5)));
    }

    #[test]
    fn update_interval_must_fit_window() {
        let mut config = ProxyConfig::default();
        config.circuit_breaker.counter_sliding_window_secs = 5;
        config.circuit_breaker.counter_update_interval_secs = 10;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::UpdateIntervalExceedsWindow {
                interval: 10,
                window: 5
            }]
        );
    }
}
