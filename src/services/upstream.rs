/*
 * Responsibility
 * - 認証済み (or public) リクエストを UPSTREAM_URL に転送し、レスポンスをそのまま返す
 * - hop-by-hop header は転送しない
 */
use std::time::Duration;

use axum::body::Body;
use axum::http::{HeaderMap, Request, Response, header};
use thiserror::Error;
use url::Url;

use crate::services::request_path::has_dot_segment;

/// Request bodies above this size are not forwarded.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request body rejected: {0}")]
    Body(String),
    #[error("path contains dot segments: {0}")]
    Path(String),
    #[error("upstream unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid upstream response: {0}")]
    Response(String),
}

fn is_hop_by_hop(name: &header::HeaderName) -> bool {
    matches!(
        name.as_str(),
        "host"
            | "connection"
            | "keep-alive"
            | "proxy-connection"
            | "te"
            | "trailer"
            | "transfer-encoding"
            | "upgrade"
            | "content-length"
    )
}

fn copy_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from.iter() {
        if !is_hop_by_hop(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

/// Forwards requests to the single configured backend.
#[derive(Clone, Debug)]
pub struct UpstreamClient {
    client: reqwest::Client,
    base_url: Url,
}

impl UpstreamClient {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// Target URL for `request`; the path is forwarded exactly as the filter saw it.
    fn target(&self, request: &Request<Body>) -> Result<String, UpstreamError> {
        let path = request.uri().path();
        if has_dot_segment(path) {
            return Err(UpstreamError::Path(path.to_owned()));
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(match request.uri().path_and_query() {
            Some(pq) => format!("{}{}", base, pq.as_str()),
            None => format!("{}/", base),
        })
    }

    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Body>, UpstreamError> {
        let target = self.target(&request)?;
        let (parts, body) = request.into_parts();

        let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
            .await
            .map_err(|e| UpstreamError::Body(e.to_string()))?;

        let mut headers = HeaderMap::new();
        copy_headers(&parts.headers, &mut headers);

        let mut outbound = self
            .client
            .request(parts.method.clone(), &target)
            .headers(headers);
        if !body.is_empty() {
            outbound = outbound.body(body);
        }

        let response = outbound.send().await.map_err(|e| {
            tracing::error!(method = %parts.method, %target, error = %e, "upstream request failed");
            UpstreamError::Transport(e)
        })?;

        let status = response.status();
        let mut builder = Response::builder().status(status);
        if let Some(headers) = builder.headers_mut() {
            copy_headers(response.headers(), headers);
        }

        let bytes = response.bytes().await?;
        builder
            .body(Body::from(bytes))
            .map_err(|e| UpstreamError::Response(e.to_string()))
    }
}
