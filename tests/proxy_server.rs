// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The proxy exercised over real HTTP, with a wiremock upstream.

mod common;

use common::{RunningProxy, closed_port, games_payload};
use courtside::{HttpMethod, RouteConfig, RoutePolicy, RouteTable, UpstreamSettings};
use serde_json::{Value, json};
use wiremock::matchers::{any, body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn proxy_for(upstream: &MockServer) -> RunningProxy {
    let settings = UpstreamSettings::new(upstream.uri()).with_api_key("test-key");
    RunningProxy::start(settings, RouteTable::builtin()).await
}

#[tokio::test]
async fn games_today_is_forwarded_with_key_and_cache_headers() {
    let upstream = MockServer::start().await;
    let payload = games_payload(&[(1, "in_progress", "1st Qtr 3:00")]);
    Mock::given(method("GET"))
        .and(path("/api/games/today"))
        .and(header("x-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(payload.clone()))
        .expect(1)
        .mount(&upstream)
        .await;

    let proxy = proxy_for(&upstream).await;
    let response = reqwest::get(proxy.url("/api/games/today")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["cache-control"],
        "s-maxage=30, stale-while-revalidate=60"
    );
    assert_eq!(response.headers()["content-type"], "application/json");
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, payload);

    proxy.stop().await;
}

#[tokio::test]
async fn disallowed_method_is_rejected_without_upstream_call() {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let proxy = proxy_for(&upstream).await;
    let response = reqwest::Client::new()
        .post(proxy.url("/api/games/today"))
        .json(&json!({"hello": "world"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 405);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Method not allowed"}));
}

#[tokio::test]
async fn upstream_failure_status_is_passed_through() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/games/today"))
        .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
        .mount(&upstream)
        .await;

    let proxy = proxy_for(&upstream).await;
    let response = reqwest::get(proxy.url("/api/games/today")).await.unwrap();

    assert_eq!(response.status(), 503);
    assert!(response.headers().get("cache-control").is_none());
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body,
        json!({"error": "Backend request failed", "status": 503, "path": "games/today"})
    );
}

#[tokio::test]
async fn unconfigured_route_uses_default_policy() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/games/today/extra"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"extra": true})))
        .expect(1)
        .mount(&upstream)
        .await;

    let proxy = proxy_for(&upstream).await;
    let response = reqwest::get(proxy.url("/api/games/today/extra")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["cache-control"],
        "s-maxage=30, stale-while-revalidate=60"
    );
}

#[tokio::test]
async fn post_route_forwards_json_body() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/picks"))
        .and(body_json(json!({"game": 1, "winner": "BOS"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"saved": true})))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut routes = RouteTable::builtin();
    routes.insert(
        "picks",
        RouteConfig::Policy(RoutePolicy {
            cache_duration: 0,
            methods: vec![HttpMethod::Post],
            ..RoutePolicy::default()
        }),
    );
    let proxy = RunningProxy::start(UpstreamSettings::new(upstream.uri()), routes).await;
    let client = reqwest::Client::new();

    let response = client
        .post(proxy.url("/api/picks"))
        .json(&json!({"game": 1, "winner": "BOS"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["cache-control"], "no-store");

    let response = client
        .post(proxy.url("/api/picks"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Invalid JSON body", "path": "picks"}));
}

#[tokio::test]
async fn health_route_combines_frontend_and_backend() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let proxy = proxy_for(&upstream).await;
    let response = reqwest::get(proxy.url("/api/health")).await.unwrap();

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"frontend": "ok", "backend": {"status": "ok"}}));
}

#[tokio::test]
async fn paths_outside_api_are_not_found() {
    let upstream = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;

    let proxy = proxy_for(&upstream).await;
    for target in ["/", "/games/today", "/api/"] {
        let response = reqwest::get(proxy.url(target)).await.unwrap();
        assert_eq!(response.status(), 404, "{target}");
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["error"], "Not found");
        assert_eq!(body["path"], target);
    }
}

#[tokio::test]
async fn unreachable_upstream_is_internal_error() {
    let settings = UpstreamSettings::new(format!("http://127.0.0.1:{}", closed_port()));
    let proxy = RunningProxy::start(settings, RouteTable::builtin()).await;

    let response = reqwest::get(proxy.url("/api/games/today")).await.unwrap();
    assert_eq!(response.status(), 500);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({"error": "Internal server error", "path": "games/today"}));
}
