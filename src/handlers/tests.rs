// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use super::*;
use crate::core::UpstreamSettings;
use crate::router::RouteTable;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn core_for(base_url: String) -> ProxyCore {
    let upstream = UpstreamSettings::new(base_url).with_api_key("s3cret");
    ProxyCore::new(upstream, RouteTable::builtin()).unwrap()
}

async fn get_health(core: &ProxyCore) -> ProxyResponse {
    core.process_request(ProxyRequest::new(HttpMethod::Get, "health")).await
}

#[tokio::test]
async fn test_healthy_upstream_is_embedded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(|req: &Request| {
            // The key is never sent to the health endpoint
            assert!(!req.headers.contains_key("x-api-key"));
            ResponseTemplate::new(200).set_body_json(json!({"status": "healthy", "db": "up"}))
        })
        .expect(1)
        .mount(&server)
        .await;

    let response = get_health(&core_for(server.uri())).await;
    assert_eq!(response.status, 200);
    assert_eq!(
        response.body,
        json!({"frontend": "ok", "backend": {"status": "healthy", "db": "up"}})
    );
}

#[tokio::test]
async fn test_unhealthy_upstream_status_is_returned() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let response = get_health(&core_for(server.uri())).await;
    assert_eq!(response.status, 502);
    assert_eq!(
        response.body,
        json!({"frontend": "ok", "backend": "error", "backend_status": 502})
    );
}

#[tokio::test]
async fn test_unreachable_upstream_still_reports_frontend() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };

    let response = get_health(&core_for(format!("http://127.0.0.1:{port}"))).await;
    assert_eq!(response.status, 200);
    assert_eq!(response.body["frontend"], "ok");
    assert_eq!(response.body["backend"], "unreachable");
    assert!(response.body["error"].is_string());
}

#[tokio::test]
async fn test_health_rejects_other_methods() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let response = core_for(server.uri())
        .process_request(ProxyRequest::new(HttpMethod::Post, "health"))
        .await;
    assert_eq!(response.status, 405);
}

#[tokio::test]
async fn test_configured_upstream_path() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!("green")))
        .expect(1)
        .mount(&server)
        .await;

    let handler = HandlerFactory::default()
        .create_handler("health", json!({"upstream_path": "/status"}))
        .unwrap();
    let core = core_for(server.uri());

    let response = handler
        .handle(&core, ProxyRequest::new(HttpMethod::Get, "health"))
        .await
        .unwrap();
    assert_eq!(response.body, json!({"frontend": "ok", "backend": "green"}));
}

#[test]
fn test_factory_unknown_handler() {
    let err = HandlerFactory::new().create_handler("nope", Value::Null).unwrap_err();
    assert_eq!(err.to_string(), "configuration error: Unknown handler: nope");
}

#[test]
fn test_factory_rejects_bad_handler_config() {
    let err = HandlerFactory::new()
        .create_handler("health", json!({"upstream_path": 5}))
        .unwrap_err();
    assert!(matches!(err, ProxyError::ConfigError(_)));
}

#[test]
fn test_factory_register_custom() {
    #[derive(Debug)]
    struct Static;

    #[async_trait]
    impl RouteHandler for Static {
        fn name(&self) -> &str {
            "static"
        }

        async fn handle(&self, _: &ProxyCore, _: ProxyRequest) -> Result<ProxyResponse, ProxyError> {
            Ok(ProxyResponse::json(200, json!({})))
        }
    }

    let mut factory = HandlerFactory::new();
    factory.register("static", |_| Ok(Arc::new(Static)));
    let handler = factory.create_handler("static", Value::Null).unwrap();
    assert_eq!(handler.name(), "static");
}
