//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::{KubernetesConfig, ProxyConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration from TOML text.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    let config: ProxyConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Resolve the bearer token used on control-plane calls.
///
/// An inline token wins over the token file. A missing or unreadable file is
/// not fatal: calls that need the token fail individually instead.
pub fn resolve_bearer_token(config: &KubernetesConfig) -> Option<String> {
    if let Some(token) = config.bearer_token.as_deref().map(str::trim) {
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    let path = config.bearer_token_file.as_deref()?;
    match fs::read_to_string(path) {
        Ok(content) => {
            let token = content.trim();
            if token.is_empty() {
                tracing::warn!(path = %path, "Bearer token file is empty");
                None
            } else {
                tracing::info!(path = %path, "Loaded bearer token");
                Some(token.to_string())
            }
        }
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Bearer token unavailable, API server calls will fail");
            None
        }
    }
}

/// Read the CA bundle trusted for API server certificates, if configured and present.
pub fn read_ca_cert(config: &KubernetesConfig) -> Option<Vec<u8>> {
    let path = config.ca_cert_file.as_deref()?;
    if !Path::new(path).exists() {
        tracing::debug!(path = %path, "CA certificate file not found, using system roots");
        return None;
    }
    match fs::read(path) {
        Ok(pem) => Some(pem),
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "Failed to read CA certificate file");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::LogFormat;

    #[test]
    fn empty_document_yields_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.kubernetes.api_server, "kubernetes.default.svc");
        assert_eq!(config.timeouts.watch_buffer_secs, 3);
        assert_eq!(config.client.max_response_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn partial_document_overrides_fields() {
        let config = parse_config(
            r#"
            [kubernetes]
            api_server = "10.0.0.1"
            api_server_port = 6443
            api_uri_prefix = "/proxy/"

            [cleanup_timer]
            delay_secs = 1
            period_secs = 10
            remove_threshold_secs = 30

            [observability]
            log_format = "json"
            "#,
        )
        .unwrap();

        assert_eq!(config.kubernetes.api_server, "10.0.0.1");
        assert_eq!(config.kubernetes.api_server_port, 6443);
        assert_eq!(config.kubernetes.api_uri_prefix, "/proxy/");
        assert!(config.kubernetes.api_server_tls);
        assert_eq!(config.cleanup_timer.remove_threshold_secs, 30);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = parse_config("[circuit_breaker]\nfailure_rate_threshold = 0.0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));
        assert!(err.to_string().contains("failure_rate_threshold"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = parse_config("[listener\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn inline_token_wins_over_file() {
        let config = KubernetesConfig {
            bearer_token: Some(" inline-token \n".into()),
            bearer_token_file: Some("/nonexistent/token".into()),
            ..KubernetesConfig::default()
        };
        assert_eq!(resolve_bearer_token(&config).as_deref(), Some("inline-token"));
    }

    #[test]
    fn token_is_read_from_file() {
        let path = std::env::temp_dir().join(format!("psystrike-token-{}", std::process::id()));
        std::fs::write(&path, "file-token\n").unwrap();

        let config = KubernetesConfig {
            bearer_token: None,
            bearer_token_file: Some(path.to_string_lossy().into_owned()),
            ..KubernetesConfig::default()
        };
        assert_eq!(resolve_bearer_token(&config).as_deref(), Some("file-token"));

        std::fs::remove_file(path).unwrap_or_default();
    }

    #[test]
    fn missing_token_file_is_not_fatal() {
        let config = KubernetesConfig {
            bearer_token: None,
            bearer_token_file: Some("/nonexistent/token".into()),
            ..KubernetesConfig::default()
        };
        assert_eq!(resolve_bearer_token(&config), None);
    }
}
