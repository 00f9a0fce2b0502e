//! Browser access to the gateway.
//!
//! - Development: any origin.
//! - Production: only origins listed in `CORS_ALLOWED_ORIGINS`; an empty list allows none.
//!
//! Credentials are never allowed. Pre-flights are answered here, outside the
//! authentication filter, and forwarded identity headers are exposed to scripts.

use std::time::Duration;

use axum::Router;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use super::http::REQUEST_ID_HEADER;
use crate::config::Config;
use crate::services::auth::{USER_EMAIL_HEADER, USER_ID_HEADER};

const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(10 * 60);

/// Exact-match allowlist. Browsers send `Origin` without a trailing slash.
fn origin_allowlist(origins: &[String]) -> AllowOrigin {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            let origin = origin.trim_end_matches('/');
            match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(%origin, "ignoring unusable CORS origin");
                    None
                }
            }
        })
        .collect();

    AllowOrigin::predicate(move |origin: &HeaderValue, _| allowed.contains(origin))
}

pub fn layer(config: &Config) -> CorsLayer {
    let cors = if config.app_env.is_production() {
        CorsLayer::new().allow_origin(origin_allowlist(&config.cors_allowed_origins))
    } else {
        CorsLayer::new().allow_origin(Any)
    };

    cors.allow_methods([
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::PATCH,
        Method::DELETE,
        Method::OPTIONS,
    ])
    .allow_headers([
        header::AUTHORIZATION,
        header::CONTENT_TYPE,
        header::ACCEPT,
        REQUEST_ID_HEADER,
    ])
    .expose_headers([USER_ID_HEADER, USER_EMAIL_HEADER])
    .max_age(PREFLIGHT_MAX_AGE)
}

pub fn apply(router: Router, config: &Config) -> Router {
    router.layer(layer(config))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;
    use axum::routing::get;
    use tower::ServiceExt;

    use super::*;

    fn production(origins: &str) -> Config {
        let vars = HashMap::from([
            ("APP_ENV", "production"),
            ("CORS_ALLOWED_ORIGINS", origins),
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("UPSTREAM_URL", "http://localhost:9000"),
        ]);
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
    }

    async fn preflight(config: &Config, origin: &str) -> Response {
        let router = apply(Router::new().route("/api/orders", get(|| async { "ok" })), config);
        router
            .oneshot(
                Request::builder()
                    .method(Method::OPTIONS)
                    .uri("/api/orders")
                    .header(header::ORIGIN, origin)
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn production_echoes_only_listed_origins() {
        let config = production("https://app.example.com/, https://admin.example.com");

        let response = preflight(&config, "https://app.example.com").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "https://app.example.com"
        );

        let response = preflight(&config, "https://evil.example.com").await;
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn identity_headers_are_exposed_and_credentials_are_not() {
        let config = production("https://app.example.com");
        let router = apply(Router::new().route("/api/orders", get(|| async { "ok" })), &config);

        let response = router
            .oneshot(
                Request::get("/api/orders")
                    .header(header::ORIGIN, "https://app.example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let exposed = response.headers()[header::ACCESS_CONTROL_EXPOSE_HEADERS]
            .to_str()
            .unwrap()
            .to_owned();
        assert!(exposed.contains("x-user-id"));
        assert!(exposed.contains("x-user-email"));
        assert!(!response.headers().contains_key(header::ACCESS_CONTROL_ALLOW_CREDENTIALS));
    }
}
