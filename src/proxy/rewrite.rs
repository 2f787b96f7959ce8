//! Outbound request construction.

use axum::http::header::{self, HeaderMap, HeaderValue};

use crate::proxy::error::ProxyError;
use crate::proxy::headers::strip_hop_by_hop;
use crate::proxy::request::QueryParams;
use crate::upstream::RouteKind;

/// Strip at most one leading and one trailing `/`, then re-add a single
/// leading one. Empty and `/` prefixes collapse to nothing.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.strip_prefix('/').unwrap_or(prefix);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{trimmed}")
    }
}

/// What the pipeline sends upstream.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub path_and_query: String,
    pub headers: HeaderMap,
}

/// Builds outbound paths and headers from an inbound request.
#[derive(Debug, Clone)]
pub struct RequestRewriter {
    prefix: String,
    user_agent: HeaderValue,
    authorization: Option<HeaderValue>,
}

impl RequestRewriter {
    /// An unusable token or user agent degrades to "no token" / empty agent.
    pub fn new(api_uri_prefix: &str, user_agent: &str, bearer_token: Option<&str>) -> Self {
        let user_agent = HeaderValue::from_str(user_agent).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "User-Agent is not a valid header value, sending it empty");
            HeaderValue::from_static("")
        });

        let authorization = bearer_token.and_then(|token| {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    Some(value)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Bearer token is not a valid header value, ignoring it");
                    None
                }
            }
        });

        Self {
            prefix: normalize_prefix(api_uri_prefix),
            user_agent,
            authorization,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.authorization.is_some()
    }

    pub fn rewrite(
        &self,
        route: RouteKind,
        inbound: &HeaderMap,
        actual_uri: &str,
        query: &QueryParams,
    ) -> Result<OutboundRequest, ProxyError> {
        Ok(OutboundRequest {
            path_and_query: self.path_and_query(route, actual_uri, query),
            headers: self.headers(route, inbound)?,
        })
    }

    fn headers(&self, route: RouteKind, inbound: &HeaderMap) -> Result<HeaderMap, ProxyError> {
        let mut headers = inbound.clone();
        strip_hop_by_hop(&mut headers);
        headers.remove(header::HOST);
        headers.remove(header::CONTENT_LENGTH);
        headers.remove(header::ACCEPT_ENCODING);
        headers.remove(header::AUTHORIZATION);

        headers.insert(header::USER_AGENT, self.user_agent.clone());

        if route.attaches_credentials() {
            let token = self
                .authorization
                .clone()
                .ok_or(ProxyError::MissingBearerToken)?;
            headers.insert(header::AUTHORIZATION, token);
        }

        Ok(headers)
    }

    fn path_and_query(&self, route: RouteKind, actual_uri: &str, query: &QueryParams) -> String {
        let actual_uri = actual_uri.trim_start_matches('/');
        match route {
            RouteKind::ApiServer => {
                let mut path = format!("{}/api/{}", self.prefix, actual_uri);
                if !query.is_empty() {
                    path.push('?');
                    path.push_str(&query.to_query_string());
                }
                path
            }
            RouteKind::ApiServerMetrics | RouteKind::PodMetrics => format!("/{actual_uri}"),
        }
    }
}
