//! Integration tests for the reqwest-backed transport against a real HTTP
//! server.

use std::net::TcpListener;
use std::time::Duration;

use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use syncline::{HttpMethod, ReqwestTransport, SyncErrorKind, Transport, TransportRequest};

fn transport() -> ReqwestTransport {
    ReqwestTransport::new(Duration::from_secs(5)).expect("transport")
}

/// Status, headers, and body pass through untouched.
#[tokio::test]
async fn passes_response_through() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/records"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("Retry-After", "3")
                .set_body_string(r#"{"data": []}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let response = transport()
        .send(TransportRequest::new(
            HttpMethod::Get,
            format!("{}/api/records", server.uri()),
        ))
        .await
        .expect("response");

    assert_eq!(response.status, 200);
    assert!(response.is_success());
    assert_eq!(response.header("retry-after"), Some("3"));
    assert_eq!(response.body, r#"{"data": []}"#);
}

/// Request headers and body reach the server.
#[tokio::test]
async fn delivers_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(header("Authorization", "Basic dXNlcjpwdw=="))
        .and(header("Content-Type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(1)
        .mount(&server)
        .await;

    let response = transport()
        .send(
            TransportRequest::new(HttpMethod::Post, format!("{}/auth/login", server.uri()))
                .with_header("Authorization", "Basic dXNlcjpwdw==")
                .with_header("Content-Type", "application/json")
                .with_body("{}"),
        )
        .await
        .expect("response");

    assert_eq!(response.status, 200);
}

/// Non-2xx statuses are returned for the pipeline to classify, not turned
/// into transport errors.
#[tokio::test]
async fn does_not_classify_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let response = transport()
        .send(TransportRequest::new(HttpMethod::Get, server.uri()))
        .await
        .expect("response");

    assert_eq!(response.status, 503);
    assert!(!response.is_success());
}

/// A connection refused maps to the retryable network-failure variant.
#[tokio::test]
async fn connection_refused_is_network_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener); // release the port so the request fails with ECONNREFUSED

    let error = transport()
        .send(TransportRequest::new(HttpMethod::Get, format!("http://{addr}")))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), SyncErrorKind::Network);
    assert!(error.is_retryable());
}
