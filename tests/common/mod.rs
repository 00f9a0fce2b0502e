#![allow(dead_code)]

use std::collections::HashMap;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use chrono::Utc;
use edge_gateway::app::{build_router, build_state};
use edge_gateway::config::Config;
use edge_gateway::services::auth::TokenIssuer;
use http_body_util::BodyExt;
use tower::ServiceExt;

pub const SECRET: &str = "0123456789abcdef0123456789abcdef";

pub fn config(pairs: &[(&str, &str)]) -> Config {
    let mut vars: HashMap<String, String> = HashMap::from([
        ("JWT_SECRET".to_string(), SECRET.to_string()),
        ("UPSTREAM_URL".to_string(), "http://127.0.0.1:1".to_string()),
    ]);
    for (k, v) in pairs {
        vars.insert(k.to_string(), v.to_string());
    }
    Config::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn router(config: &Config) -> Router {
    let state = build_state(config).unwrap();
    build_router(state, config)
}

pub fn issuer() -> TokenIssuer {
    TokenIssuer::new(SECRET.as_bytes(), Duration::from_secs(3600))
}

/// `Authorization` value for a fresh token.
pub fn bearer(email: &str, user_id: i64) -> String {
    format!("Bearer {}", issuer().issue(email, user_id, &[]).unwrap())
}

pub fn expired_bearer(email: &str, user_id: i64) -> String {
    let two_hours_ago = Utc::now() - chrono::Duration::hours(2);
    let token = issuer().issue_at(email, user_id, &[], two_hours_ago).unwrap();
    format!("Bearer {}", token)
}

pub async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn text_body(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
