//! Delegation of cache misses to the upstream registry

use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, StatusCode, header};
use axum::response::{IntoResponse, Response};
use reqwest::Url;
use thiserror::Error;
use tracing::{error, info};

/// Request headers passed on to the origin
const FORWARDED_REQUEST_HEADERS: [HeaderName; 4] = [
    header::ACCEPT,
    header::ACCEPT_ENCODING,
    header::IF_NONE_MATCH,
    header::IF_MODIFIED_SINCE,
];

/// Response headers that describe the origin connection, not the payload
const HOP_BY_HOP_HEADERS: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    header::PROXY_AUTHENTICATE,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name)
}

#[derive(Error, Debug)]
pub enum ForwardError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("Origin request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to build proxied response: {0}")]
    Response(#[from] axum::http::Error),
}

/// A request to replay against the origin
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    /// Path and query exactly as the client sent them
    pub path_and_query: String,
    pub headers: HeaderMap,
}

impl ForwardRequest {
    pub fn new(path_and_query: impl Into<String>) -> Self {
        Self {
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
        }
    }
}

/// Proxies a request to the upstream origin.
///
/// Always produces a response: upstream failures are turned into an error
/// status by the implementation.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(&self, request: ForwardRequest) -> Response;
}

/// Forwarder backed by a shared `reqwest` client
pub struct HttpForwarder {
    client: reqwest::Client,
    origin: Url,
}

impl HttpForwarder {
    pub fn new(origin: Url, timeout: Option<Duration>) -> Result<Self, ForwardError> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("regcache/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(ForwardError::Client)?;

        Ok(Self { client, origin })
    }

    /// Origin URL for a client path: the origin base with the path appended
    pub fn target_url(&self, path_and_query: &str) -> String {
        format!(
            "{}{}",
            self.origin.as_str().trim_end_matches('/'),
            path_and_query
        )
    }

    async fn fetch(&self, request: &ForwardRequest) -> Result<Response, ForwardError> {
        let url = self.target_url(&request.path_and_query);
        info!(url = %url, "forwarding to origin");

        let mut outgoing = self.client.get(&url);
        for name in &FORWARDED_REQUEST_HEADERS {
            for value in request.headers.get_all(name) {
                outgoing = outgoing.header(name, value);
            }
        }

        let upstream = outgoing
            .send()
            .await
            .map_err(|source| ForwardError::Request {
                url: url.clone(),
                source,
            })?;

        let mut response = Response::builder().status(upstream.status());
        if let Some(headers) = response.headers_mut() {
            for (name, value) in upstream.headers() {
                if !is_hop_by_hop(name) {
                    headers.append(name, value.clone());
                }
            }
        }

        Ok(response.body(Body::from_stream(upstream.bytes_stream()))?)
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn forward(&self, request: ForwardRequest) -> Response {
        match self.fetch(&request).await {
            Ok(response) => response,
            Err(e) => {
                error!(error = %e, "origin unavailable");
                (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
            }
        }
    }
}
