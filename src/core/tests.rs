// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;
use crate::router::RouteTable;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn core_for(server: &MockServer, api_key: Option<&str>, routes: RouteTable) -> ProxyCore {
    let mut upstream = UpstreamSettings::new(server.uri());
    if let Some(key) = api_key {
        upstream = upstream.with_api_key(key);
    }
    ProxyCore::new(upstream, routes).unwrap()
}

fn policy_table(route: &str, policy: RoutePolicy) -> RouteTable {
    let mut table = RouteTable::new();
    table.insert(route, RouteConfig::Policy(policy));
    table
}

#[test]
fn test_http_method_serde_and_display() {
    let method: HttpMethod = serde_json::from_value(json!("POST")).unwrap();
    assert_eq!(method, HttpMethod::Post);
    assert_eq!(serde_json::to_value(HttpMethod::Delete).unwrap(), json!("DELETE"));
    assert_eq!(HttpMethod::Patch.to_string(), "PATCH");
    assert!(serde_json::from_value::<HttpMethod>(json!("post")).is_err());
}

#[test]
fn test_http_method_reqwest_conversions() {
    assert_eq!(HttpMethod::try_from(&reqwest::Method::PUT).unwrap(), HttpMethod::Put);
    let custom = reqwest::Method::from_bytes(b"PURGE").unwrap();
    assert!(HttpMethod::try_from(&custom).is_err());
    assert_eq!(reqwest::Method::from(HttpMethod::Head), reqwest::Method::HEAD);
}

#[test]
fn test_upstream_urls() {
    let upstream = UpstreamSettings::new("https://api.example.com/");
    assert_eq!(upstream.route_url("games/today"), "https://api.example.com/api/games/today");
    assert_eq!(upstream.url("/health"), "https://api.example.com/health");
}

#[test]
fn test_upstream_debug_redacts_key() {
    let upstream = UpstreamSettings::new("https://api.example.com").with_api_key("s3cret");
    let debug = format!("{upstream:?}");
    assert!(!debug.contains("s3cret"));
    assert!(debug.contains("<redacted>"));
}

#[test]
fn test_error_envelopes() {
    let response = ProxyResponse::method_not_allowed();
    assert_eq!(response.status, 405);
    assert_eq!(response.body, json!({"error": "Method not allowed"}));

    let response = ProxyResponse::internal_error("games/today");
    assert_eq!(response.status, 500);
    assert_eq!(response.body, json!({"error": "Internal server error", "path": "games/today"}));

    let envelope = ErrorEnvelope::new("Backend request failed").with_status(503).with_path("x");
    assert_eq!(
        envelope.into_value(),
        json!({"error": "Backend request failed", "status": 503, "path": "x"})
    );
}

#[test]
fn test_request_ids_are_unique() {
    let a = ProxyRequest::new(HttpMethod::Get, "games/today");
    let b = ProxyRequest::new(HttpMethod::Get, "games/today");
    assert_ne!(a.request_id, b.request_id);
    assert!(a.body.is_none());
}

#[tokio::test]
async fn test_forward_success_sets_cache_control() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/games/today"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"games": []})))
        .expect(1)
        .mount(&server)
        .await;

    let core = core_for(&server, None, RouteTable::builtin());
    let response = core
        .process_request(ProxyRequest::new(HttpMethod::Get, "games/today"))
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"games": []}));
    assert_eq!(response.cache_control(), Some("s-maxage=30, stale-while-revalidate=60"));
}

#[tokio::test]
async fn test_forward_zero_cache_is_no_store() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/live/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let routes = policy_table(
        "live/feed",
        RoutePolicy {
            cache_duration: 0,
            ..RoutePolicy::default()
        },
    );
    let core = core_for(&server, None, routes);
    let response = core.process_request(ProxyRequest::new(HttpMethod::Get, "live/feed")).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.cache_control(), Some("no-store"));
}

#[tokio::test]
async fn test_disallowed_method_never_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let core = core_for(&server, Some("key"), RouteTable::builtin());
    let response = core
        .process_request(ProxyRequest::new(HttpMethod::Post, "games/today").with_body(json!({})))
        .await;

    assert_eq!(response.status, 405);
    assert_eq!(response.body, json!({"error": "Method not allowed"}));
}

#[tokio::test]
async fn test_upstream_error_status_is_passed_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/games/today"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let core = core_for(&server, None, RouteTable::builtin());
    let response = core
        .process_request(ProxyRequest::new(HttpMethod::Get, "games/today"))
        .await;

    assert_eq!(response.status, 503);
    assert_eq!(
        response.body,
        json!({"error": "Backend request failed", "status": 503, "path": "games/today"})
    );
    assert_eq!(response.cache_control(), None);
}

#[tokio::test]
async fn test_api_key_injected_unless_skipped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/private"))
        .and(header("x-api-key", "s3cret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"private": true})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/public"))
        .respond_with(|req: &Request| {
            let has_key = req.headers.contains_key("x-api-key");
            ResponseTemplate::new(200).set_body_json(json!({"has_key": has_key}))
        })
        .expect(1)
        .mount(&server)
        .await;

    let mut routes = RouteTable::new();
    routes.insert("private", RouteConfig::Policy(RoutePolicy::default()));
    routes.insert(
        "public",
        RouteConfig::Policy(RoutePolicy {
            skip_api_key: true,
            ..RoutePolicy::default()
        }),
    );
    let core = core_for(&server, Some("s3cret"), routes);

    let private = core.process_request(ProxyRequest::new(HttpMethod::Get, "private")).await;
    assert_eq!(private.status, 200);

    let public = core.process_request(ProxyRequest::new(HttpMethod::Get, "public")).await;
    assert_eq!(public.body, json!({"has_key": false}));
}

#[tokio::test]
async fn test_no_api_key_configured_sends_no_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/games/today"))
        .respond_with(|req: &Request| {
            let has_key = req.headers.contains_key("x-api-key");
            ResponseTemplate::new(200).set_body_json(json!({"has_key": has_key}))
        })
        .mount(&server)
        .await;

    let core = core_for(&server, None, RouteTable::builtin());
    let response = core
        .process_request(ProxyRequest::new(HttpMethod::Get, "games/today"))
        .await;
    assert_eq!(response.body, json!({"has_key": false}));
}

#[tokio::test]
async fn test_post_body_is_forwarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/picks"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"game": 42, "winner": "LAL"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"saved": true})))
        .expect(1)
        .mount(&server)
        .await;

    let routes = policy_table(
        "picks",
        RoutePolicy {
            methods: vec![HttpMethod::Get, HttpMethod::Post],
            ..RoutePolicy::default()
        },
    );
    let core = core_for(&server, None, routes);
    let response = core
        .process_request(
            ProxyRequest::new(HttpMethod::Post, "picks").with_body(json!({"game": 42, "winner": "LAL"})),
        )
        .await;

    assert_eq!(response.status, 200);
    assert_eq!(response.body, json!({"saved": true}));
}

#[tokio::test]
async fn test_non_json_success_body_is_internal_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/games/today"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let core = core_for(&server, None, RouteTable::builtin());
    let response = core
        .process_request(ProxyRequest::new(HttpMethod::Get, "games/today"))
        .await;

    assert_eq!(response.status, 500);
    assert_eq!(response.body, json!({"error": "Internal server error", "path": "games/today"}));
}

#[tokio::test]
async fn test_unreachable_upstream_is_internal_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let upstream = UpstreamSettings::new(format!("http://127.0.0.1:{port}"));
    let core = ProxyCore::new(upstream, RouteTable::builtin()).unwrap();

    let response = core
        .process_request(ProxyRequest::new(HttpMethod::Get, "games/today"))
        .await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body["path"], "games/today");
}

#[derive(Debug)]
struct Failing;

#[async_trait::async_trait]
impl RouteHandler for Failing {
    fn name(&self) -> &str {
        "failing"
    }

    async fn handle(&self, _core: &ProxyCore, _request: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
        Err(ProxyError::Other("boom".to_string()))
    }
}

#[tokio::test]
async fn test_failing_handler_becomes_internal_error() {
    let server = MockServer::start().await;
    let mut routes = RouteTable::new();
    routes.insert("broken", RouteConfig::Custom(Arc::new(Failing)));

    let core = core_for(&server, None, routes);
    let response = core.process_request(ProxyRequest::new(HttpMethod::Delete, "broken")).await;
    assert_eq!(response.status, 500);
    assert_eq!(response.body, json!({"error": "Internal server error", "path": "broken"}));
}
