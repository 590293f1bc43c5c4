// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core primitives – requests, responses, route handlers & the proxy core.
//!
//! A [`ProxyRequest`] is identified by its *route* (the part of the path
//! after `/api/`), never by a URL.  [`ProxyCore::process_request`] resolves
//! the route against the [`RouteTable`], applies the route policy and
//! always answers with a [`ProxyResponse`]: every failure is turned into a
//! JSON error envelope before it leaves this module.  Socket handling
//! lives in `server`.

#[cfg(test)]
mod tests;

use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::time::timeout;

use crate::logging::{RequestOutcome, log_request_outcome};
use crate::router::{RouteConfig, RoutePolicy, RouteTable};
use crate::{debug_fmt, error_fmt, warn_fmt};

/// Header carrying the upstream secret.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Errors that can occur while serving a request.
///
/// None of these reach the client as-is; see [`ProxyCore::process_request`].
#[derive(Error, Debug)]
pub enum ProxyError {
    /// HTTP client error (connection refused, DNS, TLS, …)
    #[error("HTTP client error: {0}")]
    ClientError(#[from] reqwest::Error),

    /// The upstream did not answer in time
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The upstream answered 2xx with a body that is not JSON
    #[error("invalid upstream body: {0}")]
    InvalidBody(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<crate::config::error::ConfigError> for ProxyError {
    fn from(err: crate::config::error::ConfigError) -> Self {
        ProxyError::ConfigError(err.to_string())
    }
}

/// HTTP methods understood by route policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Trace,
    Connect,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&reqwest::Method> for HttpMethod {
    type Error = ProxyError;

    fn try_from(method: &reqwest::Method) -> Result<Self, Self::Error> {
        match *method {
            reqwest::Method::GET => Ok(HttpMethod::Get),
            reqwest::Method::POST => Ok(HttpMethod::Post),
            reqwest::Method::PUT => Ok(HttpMethod::Put),
            reqwest::Method::DELETE => Ok(HttpMethod::Delete),
            reqwest::Method::HEAD => Ok(HttpMethod::Head),
            reqwest::Method::OPTIONS => Ok(HttpMethod::Options),
            reqwest::Method::PATCH => Ok(HttpMethod::Patch),
            reqwest::Method::TRACE => Ok(HttpMethod::Trace),
            reqwest::Method::CONNECT => Ok(HttpMethod::Connect),
            ref other => Err(ProxyError::Other(format!("unsupported method {other}"))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Options => reqwest::Method::OPTIONS,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Trace => reqwest::Method::TRACE,
            HttpMethod::Connect => reqwest::Method::CONNECT,
        }
    }
}

/// An inbound request as seen by the router.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: HttpMethod,
    /// Route path without the `/api/` prefix, e.g. `games/today`.
    pub route: String,
    /// Parsed JSON body; only forwarded for non-GET methods.
    pub body: Option<Value>,
    /// Correlation id for log lines.
    pub request_id: String,
}

impl ProxyRequest {
    pub fn new(method: HttpMethod, route: impl Into<String>) -> Self {
        Self {
            method,
            route: route.into(),
            body: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// The answer handed back to the server layer.
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ProxyResponse {
    /// A JSON response with `Content-Type: application/json`.
    pub fn json(status: u16, body: Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self { status, headers, body }
    }

    pub fn error(status: u16, envelope: ErrorEnvelope) -> Self {
        Self::json(status, envelope.into_value())
    }

    pub fn method_not_allowed() -> Self {
        Self::error(405, ErrorEnvelope::new("Method not allowed"))
    }

    pub fn internal_error(route: &str) -> Self {
        Self::error(500, ErrorEnvelope::new("Internal server error").with_path(route))
    }

    /// Value of the `Cache-Control` header, if set.
    pub fn cache_control(&self) -> Option<&str> {
        self.headers.get(CACHE_CONTROL).and_then(|v| v.to_str().ok())
    }
}

/// Client-visible error body: `{error, status?, path?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: None,
            path: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn into_value(self) -> Value {
        // Serializing a struct of strings and integers cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A handler that takes over a route completely.
///
/// When a route resolves to [`RouteConfig::Custom`], no method check, header
/// construction or cache policy is applied by the core; the handler owns
/// the whole response.  An `Err` is still turned into a 500 envelope.
#[async_trait::async_trait]
pub trait RouteHandler: fmt::Debug + Send + Sync {
    /// Name used in logs and in configuration (`handler = "…"`).
    fn name(&self) -> &str;

    async fn handle(
        &self,
        core: &ProxyCore,
        request: ProxyRequest,
    ) -> Result<ProxyResponse, ProxyError>;
}

/// Where and how to reach the upstream service.
#[derive(Clone)]
pub struct UpstreamSettings {
    /// e.g. `https://api.nbaoracle.com`; routes are appended as `/api/{route}`.
    pub base_url: String,
    /// Forwarded as `X-API-Key`; `None` disables injection.
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl UpstreamSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        let key = api_key.into();
        self.api_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Absolute URL for a path below the upstream root.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// `${base}/api/${route}`
    pub fn route_url(&self, route: &str) -> String {
        self.url(&format!("api/{route}"))
    }
}

impl fmt::Debug for UpstreamSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Stateless proxy core: one route lookup and at most one upstream call per
/// request.
#[derive(Debug)]
pub struct ProxyCore {
    upstream: UpstreamSettings,
    client: reqwest::Client,
    routes: Arc<RouteTable>,
}

impl ProxyCore {
    pub fn new(upstream: UpstreamSettings, routes: RouteTable) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .timeout(upstream.timeout)
            .build()
            .map_err(ProxyError::ClientError)?;

        Ok(Self {
            upstream,
            client,
            routes: Arc::new(routes),
        })
    }

    pub fn upstream(&self) -> &UpstreamSettings {
        &self.upstream
    }

    /// Shared HTTP client, for custom handlers that call the upstream.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Serve one request.  Never fails: every error becomes an envelope.
    pub async fn process_request(&self, request: ProxyRequest) -> ProxyResponse {
        let started = Instant::now();
        let request_id = request.request_id.clone();
        let method = request.method;
        let route = request.route.clone();

        let (response, upstream_elapsed) = match self.routes.resolve(&route) {
            RouteConfig::Custom(handler) => {
                debug_fmt!(route, "delegating to handler '{}'", handler.name());
                match handler.handle(self, request).await {
                    Ok(response) => (response, None),
                    Err(e) => {
                        error_fmt!(route, "Handler '{}' failed: {}", handler.name(), e);
                        (ProxyResponse::internal_error(&route), None)
                    }
                }
            }
            RouteConfig::Policy(policy) => match self.forward(&policy, &request).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error_fmt!(route, "Proxy error: {}", e);
                    (ProxyResponse::internal_error(&route), None)
                }
            },
        };

        log_request_outcome(&RequestOutcome {
            request_id: &request_id,
            method: method.as_str(),
            route: &route,
            status: response.status,
            total: started.elapsed(),
            upstream: upstream_elapsed,
        });

        response
    }

    /// Apply a route policy and forward to the upstream.
    ///
    /// Returns the response together with the time spent waiting on the
    /// upstream, if it was called at all.
    async fn forward(
        &self,
        policy: &RoutePolicy,
        request: &ProxyRequest,
    ) -> Result<(ProxyResponse, Option<Duration>), ProxyError> {
        if !policy.allows(request.method) {
            warn_fmt!(request.route, "Method {} not allowed", request.method);
            return Ok((ProxyResponse::method_not_allowed(), None));
        }

        if let Some(limit) = policy.rate_limit_per_minute {
            // Placeholder only: limits are configured but not enforced yet.
            debug_fmt!(request.route, "rate limit {}/min configured (not enforced)", limit);
        }

        let headers = self.outbound_headers(policy)?;
        let url = self.upstream.route_url(&request.route);

        let mut builder = self
            .client
            .request(request.method.into(), &url)
            .headers(headers);

        if request.method != HttpMethod::Get {
            if let Some(body) = &request.body {
                let payload = serde_json::to_vec(body)
                    .map_err(|e| ProxyError::Other(format!("cannot serialize body: {e}")))?;
                builder = builder.body(payload);
            }
        }

        let upstream_start = Instant::now();
        let upstream = timeout(self.upstream.timeout, builder.send())
            .await
            .map_err(|_| ProxyError::Timeout(self.upstream.timeout))??;
        let status = upstream.status();

        if !status.is_success() {
            let error_text = upstream.text().await.unwrap_or_default();
            let elapsed = upstream_start.elapsed();
            error_fmt!(request.route, "Backend error: {} {}", status.as_u16(), error_text);

            let envelope = ErrorEnvelope::new("Backend request failed")
                .with_status(status.as_u16())
                .with_path(&request.route);
            return Ok((ProxyResponse::error(status.as_u16(), envelope), Some(elapsed)));
        }

        let bytes = upstream.bytes().await?;
        let elapsed = upstream_start.elapsed();
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| ProxyError::InvalidBody(e.to_string()))?;

        let mut response = ProxyResponse::json(200, body);
        let cache_control = HeaderValue::from_str(&policy.cache_control())
            .map_err(|e| ProxyError::Other(e.to_string()))?;
        response.headers.insert(CACHE_CONTROL, cache_control);

        Ok((response, Some(elapsed)))
    }

    fn outbound_headers(&self, policy: &RoutePolicy) -> Result<HeaderMap, ProxyError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if !policy.skip_api_key {
            if let Some(key) = &self.upstream.api_key {
                let mut value = HeaderValue::from_str(key)
                    .map_err(|e| ProxyError::ConfigError(format!("invalid API key: {e}")))?;
                value.set_sensitive(true);
                headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
            }
        }

        Ok(headers)
    }
}
