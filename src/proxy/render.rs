//! Response rendering: one materialized body or a live chunk stream.

use std::pin::Pin;

use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::time::{Instant, Sleep};

use crate::proxy::error::ProxyError;
use crate::proxy::headers::forwardable_response_headers;

pub enum ProxyBody {
    Buffered(Bytes),
    Streaming(BoxStream<'static, Result<Bytes, ProxyError>>),
}

impl std::fmt::Debug for ProxyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProxyBody::Buffered(bytes) => f.debug_tuple("Buffered").field(&bytes.len()).finish(),
            ProxyBody::Streaming(_) => f.write_str("Streaming"),
        }
    }
}

/// An upstream response ready to hand back to the caller.
#[derive(Debug)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ProxyBody,
}

impl ProxyResponse {
    /// Read the whole upstream body, failing once it exceeds `limit`.
    pub async fn buffered(
        mut upstream: reqwest::Response,
        limit: Option<usize>,
        default_content_type: Option<&'static str>,
    ) -> Result<Self, ProxyError> {
        if let (Some(limit), Some(declared)) = (limit, upstream.content_length()) {
            if declared > limit as u64 {
                return Err(ProxyError::ResponseTooLarge { limit });
            }
        }

        let status = upstream.status();
        let headers = response_headers(upstream.headers(), default_content_type);

        let mut body = BytesMut::new();
        while let Some(chunk) = upstream.chunk().await? {
            if let Some(limit) = limit {
                if body.len() + chunk.len() > limit {
                    return Err(ProxyError::ResponseTooLarge { limit });
                }
            }
            body.extend_from_slice(&chunk);
        }

        Ok(Self {
            status,
            headers,
            body: ProxyBody::Buffered(body.freeze()),
        })
    }

    /// Forward upstream chunks in order as they arrive.
    ///
    /// The stream ends with a [`ProxyError::Timeout`] item if `deadline` passes
    /// first, and with [`ProxyError::ResponseTooLarge`] once `limit` is crossed.
    /// Empty chunks are skipped. Dropping the stream releases the upstream body.
    pub fn streaming(
        upstream: reqwest::Response,
        limit: Option<usize>,
        deadline: Instant,
        default_content_type: Option<&'static str>,
    ) -> Self {
        let status = upstream.status();
        let headers = response_headers(upstream.headers(), default_content_type);

        let state = StreamState {
            upstream: upstream.bytes_stream().boxed(),
            deadline: Box::pin(tokio::time::sleep_until(deadline)),
            received: 0,
            limit,
            finished: false,
        };

        Self {
            status,
            headers,
            body: ProxyBody::Streaming(stream::unfold(state, next_chunk).boxed()),
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.body, ProxyBody::Streaming(_))
    }
}

struct StreamState {
    upstream: BoxStream<'static, reqwest::Result<Bytes>>,
    deadline: Pin<Box<Sleep>>,
    received: usize,
    limit: Option<usize>,
    finished: bool,
}

async fn next_chunk(mut state: StreamState) -> Option<(Result<Bytes, ProxyError>, StreamState)> {
    if state.finished {
        return None;
    }

    loop {
        tokio::select! {
            next = state.upstream.next() => match next {
                None => return None,
                Some(Ok(chunk)) if chunk.is_empty() => continue,
                Some(Ok(chunk)) => {
                    state.received += chunk.len();
                    if let Some(limit) = state.limit {
                        if state.received > limit {
                            state.finished = true;
                            return Some((Err(ProxyError::ResponseTooLarge { limit }), state));
                        }
                    }
                    return Some((Ok(chunk), state));
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(ProxyError::Transport(e)), state));
                }
            },
            _ = &mut state.deadline => {
                state.finished = true;
                return Some((Err(ProxyError::Timeout), state));
            }
        }
    }
}

fn response_headers(upstream: &HeaderMap, default_content_type: Option<&'static str>) -> HeaderMap {
    let mut headers = forwardable_response_headers(upstream);
    if let Some(content_type) = default_content_type {
        if !headers.contains_key(header::CONTENT_TYPE) {
            headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        }
    }
    headers
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let body = match self.body {
            ProxyBody::Buffered(bytes) => Body::from(bytes),
            ProxyBody::Streaming(chunks) => Body::from_stream(chunks),
        };

        let mut response = Response::new(body);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}
