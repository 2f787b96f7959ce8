//! Inbound request model.

use std::time::Duration;

use axum::http::HeaderMap;
use url::form_urlencoded;

use crate::config::TimeoutConfig;

/// Query parameters in inbound order, keeping their raw encoding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(raw: Option<&str>) -> Self {
        let pairs = raw
            .unwrap_or_default()
            .split('&')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((key, value)) => (key.to_string(), value.to_string()),
                None => (segment.to_string(), String::new()),
            })
            .collect();
        Self { pairs }
    }

    /// Decoded value of the first parameter named `name`.
    pub fn get(&self, name: &str) -> Option<String> {
        self.pairs
            .iter()
            .find_map(|(key, value)| (decode(key) == name).then(|| decode(value)))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// `key=value` pairs joined by `&`, in their original order.
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn decode(raw: &str) -> String {
    // form_urlencoded splits on '='; escape it so the whole input is one key.
    form_urlencoded::parse(raw.replace('=', "%3D").as_bytes())
        .next()
        .map(|(decoded, _)| decoded.into_owned())
        .unwrap_or_default()
}

/// How the response body is delivered, chosen once per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Forward chunks as they arrive until the upstream ends or `timeout` elapses.
    Streaming { timeout: Duration },
    /// Aggregate the whole body, all within `timeout`.
    Buffered { timeout: Duration },
}

impl ResponseMode {
    pub fn timeout(&self) -> Duration {
        match self {
            ResponseMode::Streaming { timeout } | ResponseMode::Buffered { timeout } => *timeout,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ResponseMode::Streaming { .. })
    }
}

/// One inbound call, as seen by the pipeline.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    /// Path remainder captured by the route, without a leading `/`.
    pub actual_uri: String,
    pub query: QueryParams,
    pub watch: bool,
    pub timeout_seconds: i32,
    pub inbound_headers: HeaderMap,
}

impl ProxyRequest {
    pub fn new(actual_uri: impl Into<String>, raw_query: Option<&str>, inbound_headers: HeaderMap) -> Self {
        let query = QueryParams::parse(raw_query);
        let watch = query
            .get("watch")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        let timeout_seconds = query
            .get("timeoutSeconds")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0);

        Self {
            actual_uri: actual_uri.into(),
            query,
            watch,
            timeout_seconds,
            inbound_headers,
        }
    }

    /// Watches with a positive `timeoutSeconds` stream under
    /// `timeoutSeconds + watch_buffer_secs`; everything else is buffered under
    /// the regular request timeout.
    pub fn response_mode(&self, timeouts: &TimeoutConfig) -> ResponseMode {
        if self.watch && self.timeout_seconds > 0 {
            let secs = (self.timeout_seconds as u64).saturating_add(timeouts.watch_buffer_secs);
            ResponseMode::Streaming {
                timeout: Duration::from_secs(secs),
            }
        } else {
            ResponseMode::Buffered {
                timeout: Duration::from_secs(timeouts.request_secs),
            }
        }
    }
}
