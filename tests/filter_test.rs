mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use wiremock::matchers::{header as has_header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{bearer, config, expired_bearer, json_body, router, send, text_body};

async fn upstream() -> MockServer {
    MockServer::start().await
}

fn local(upstream: &MockServer) -> axum::Router {
    router(&config(&[("UPSTREAM_URL", upstream.uri().as_str())]))
}

#[tokio::test]
async fn public_login_is_forwarded_without_credentials() {
    let upstream = upstream().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_string("token"))
        .expect(1)
        .mount(&upstream)
        .await;
    let app = local(&upstream);

    let response = send(
        &app,
        Request::post("/api/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"email":"a@example.com","password":"pw"}"#))
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(text_body(response).await, "token");

    let received = upstream.received_requests().await.unwrap();
    assert!(received[0].headers.get("x-user-id").is_none());
    assert_eq!(received[0].body, br#"{"email":"a@example.com","password":"pw"}"#);
}

#[tokio::test]
async fn public_path_ignores_garbage_authorization() {
    let upstream = upstream().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/register"))
        .and(has_header("authorization", "Bearer not-a-token"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&upstream)
        .await;
    let app = local(&upstream);

    let response = send(
        &app,
        Request::post("/api/auth/register")
            .header(header::AUTHORIZATION, "Bearer not-a-token")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn missing_header_is_rejected() {
    let upstream = upstream().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let app = local(&upstream);

    let response = send(&app, Request::get("/api/orders").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "MISSING_AUTHORIZATION");
}

#[tokio::test]
async fn two_segment_token_is_malformed() {
    let upstream = upstream().await;
    let app = local(&upstream);

    for value in ["Bearer abc.def", "bearer a.b.c", "Token a.b.c"] {
        let response = send(
            &app,
            Request::get("/api/orders")
                .header(header::AUTHORIZATION, value)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{value}");
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "MALFORMED_AUTHORIZATION", "{value}");
    }
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn expired_and_forged_tokens_are_invalid() {
    let upstream = upstream().await;
    let app = local(&upstream);

    let forged = {
        let issuer = edge_gateway::services::auth::TokenIssuer::new(
            b"some-other-secret-some-other-secret",
            std::time::Duration::from_secs(60),
        );
        format!("Bearer {}", issuer.issue("a@example.com", 1, &[]).unwrap())
    };

    for value in [expired_bearer("a@example.com", 1), forged] {
        let response = send(
            &app,
            Request::get("/api/orders")
                .header(header::AUTHORIZATION, value)
                .body(Body::empty())
                .unwrap(),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
        // The concrete reason is never disclosed.
        assert_eq!(body["error"]["message"], "authentication required");
    }
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn valid_token_forwards_identity_headers() {
    let upstream = upstream().await;
    let authorization = bearer("alice@example.com", 42);
    Mock::given(method("GET"))
        .and(path("/api/orders"))
        .and(has_header("x-user-id", "42"))
        .and(has_header("x-user-email", "alice@example.com"))
        .and(has_header("authorization", authorization.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_string("orders"))
        .expect(1)
        .mount(&upstream)
        .await;
    let app = local(&upstream);

    let response = send(
        &app,
        Request::get("/api/orders?page=2")
            .header(header::AUTHORIZATION, authorization.as_str())
            .header("x-user-id", "1")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(text_body(response).await, "orders");

    let received = upstream.received_requests().await.unwrap();
    assert_eq!(received[0].url.query(), Some("page=2"));
    // Client-supplied identity headers are replaced, not appended.
    assert_eq!(received[0].headers.get_all("x-user-id").iter().count(), 1);
}

#[tokio::test]
async fn preflight_is_answered_without_credentials() {
    let upstream = upstream().await;
    let app = local(&upstream);

    let response = send(
        &app,
        Request::builder()
            .method(Method::OPTIONS)
            .uri("/api/orders")
            .header(header::ORIGIN, "https://app.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn health_is_outside_the_filter() {
    let upstream = upstream().await;
    let app = local(&upstream);

    let response = send(&app, Request::get("/health").body(Body::empty()).unwrap()).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["identity_mode"], "local");
    assert!(body.get("identity_circuit").is_none());
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    // Default test config points the upstream at a closed port.
    let app = router(&config(&[]));

    let response = send(
        &app,
        Request::get("/api/orders")
            .header(header::AUTHORIZATION, bearer("alice@example.com", 42))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "BAD_GATEWAY");
}

#[tokio::test]
async fn dot_segments_cannot_escape_public_prefix() {
    let upstream = upstream().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&upstream)
        .await;
    let app = local(&upstream);

    for uri in ["/api/auth/login/../../orders", "/api/auth/login/%2e%2e/%2E%2E/orders"] {
        let response = send(&app, Request::get(uri).body(Body::empty()).unwrap()).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body = json_body(response).await;
        assert_eq!(body["error"]["code"], "INVALID_PATH", "{uri}");
    }
    assert!(upstream.received_requests().await.unwrap().is_empty());
}
