//! Request authentication filter.
//!
//! Per request, strictly in order:
//! 1. `.` / `..` path segment (literal or percent-encoded) -> `InvalidPath`
//! 2. public path prefix or pre-flight (`OPTIONS`) -> forward unmodified
//! 3. no `Authorization` header -> `MissingHeader`
//! 4. not `Bearer <compact token>` -> `MalformedHeader`
//! 5. resolve the caller identity; any failure -> `InvalidToken`
//! 6. derive a new request carrying `X-User-ID` / `X-User-Email`
//!
//! Note:
//! - The sub-reason of an `InvalidToken` is logged, never sent to the client.
//! - Identity-service outages are rejected as well (fail closed) but logged at
//!   `error` with an `outage` field, so they can be told apart from bad tokens.
use std::sync::Arc;

use axum::http::header::{self, HeaderName, HeaderValue, InvalidHeaderValue};
use axum::http::{Method, Request};
use thiserror::Error;

use super::token::BearerToken;
use crate::services::identity::{CallerIdentity, IdentityResolver, ResolveError};
use crate::services::request_path::has_dot_segment;

pub const USER_ID_HEADER: HeaderName = HeaderName::from_static("x-user-id");
pub const USER_EMAIL_HEADER: HeaderName = HeaderName::from_static("x-user-email");

/// Path prefixes exempt from authentication. Fixed at startup.
#[derive(Debug, Clone, Default)]
pub struct PublicEndpoints {
    prefixes: Vec<String>,
}

impl PublicEndpoints {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefixes = prefixes
            .into_iter()
            .map(Into::into)
            .filter(|p: &String| !p.is_empty())
            .collect();
        Self { prefixes }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.prefixes.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }
}

#[derive(Debug, Error)]
pub enum AuthRejection {
    #[error("path contains dot segments")]
    InvalidPath,
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("malformed Authorization header")]
    MalformedHeader,
    #[error("invalid token: {0}")]
    InvalidToken(#[source] ResolveError),
}

#[derive(Debug, Error)]
pub enum FilterError {
    #[error(transparent)]
    Rejected(#[from] AuthRejection),
    #[error("identity cannot be encoded as a header: {0}")]
    IdentityHeader(#[from] InvalidHeaderValue),
}

/// Outcome of the public-or-protected decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Public path or pre-flight: pass the request through untouched.
    Forward,
    Authenticated(CallerIdentity),
}

pub struct AuthFilter {
    public: PublicEndpoints,
    resolver: Arc<dyn IdentityResolver>,
}

impl AuthFilter {
    pub fn new(public: PublicEndpoints, resolver: Arc<dyn IdentityResolver>) -> Self {
        Self { public, resolver }
    }

    pub fn public_endpoints(&self) -> &PublicEndpoints {
        &self.public
    }

    pub fn resolver_mode(&self) -> &'static str {
        self.resolver.mode()
    }

    pub async fn evaluate(
        &self,
        method: &Method,
        path: &str,
        authorization: Option<&HeaderValue>,
    ) -> Result<Decision, AuthRejection> {
        // URL parsing resolves these segments, so the prefix match would not see
        // the path that reaches the backend.
        if has_dot_segment(path) {
            tracing::warn!(%path, reason = "dot_segment", "request rejected");
            return Err(AuthRejection::InvalidPath);
        }

        if *method == Method::OPTIONS || self.public.matches(path) {
            return Ok(Decision::Forward);
        }

        let Some(value) = authorization else {
            tracing::warn!(%path, reason = "missing_header", "request rejected");
            return Err(AuthRejection::MissingHeader);
        };

        let Some(token) = value.to_str().ok().and_then(BearerToken::from_authorization) else {
            tracing::warn!(%path, reason = "malformed_header", "request rejected");
            return Err(AuthRejection::MalformedHeader);
        };

        match self.resolver.resolve(&token).await {
            Ok(identity) => {
                tracing::debug!(%path, user_id = identity.user_id, "request authenticated");
                Ok(Decision::Authenticated(identity))
            }
            Err(err) => {
                if let Some(outage) = err.outage() {
                    tracing::error!(
                        %path,
                        %outage,
                        mode = self.resolver.mode(),
                        "identity service unavailable, request rejected"
                    );
                } else {
                    tracing::warn!(%path, reason = %err, "invalid token");
                }
                Err(AuthRejection::InvalidToken(err))
            }
        }
    }

    /// Runs the filter over an owned request and returns the request to forward.
    pub async fn filter<B>(&self, request: Request<B>) -> Result<Request<B>, FilterError> {
        let method = request.method().clone();
        let path = request.uri().path().to_owned();
        let authorization = request.headers().get(header::AUTHORIZATION).cloned();

        match self.evaluate(&method, &path, authorization.as_ref()).await? {
            Decision::Forward => Ok(request),
            Decision::Authenticated(identity) => Ok(derive_request(request, identity)?),
        }
    }
}

/// Builds the forwarded request from the inbound one.
///
/// The inbound request is consumed; the `Authorization` header is left in place
/// byte-for-byte and any client-supplied identity headers are overwritten.
pub fn derive_request<B>(
    request: Request<B>,
    identity: CallerIdentity,
) -> Result<Request<B>, InvalidHeaderValue> {
    let email = HeaderValue::from_str(&identity.email)?;
    let (mut parts, body) = request.into_parts();

    parts.headers.insert(USER_ID_HEADER, HeaderValue::from(identity.user_id));
    parts.headers.insert(USER_EMAIL_HEADER, email);
    parts.extensions.insert(identity);

    Ok(Request::from_parts(parts, body))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use async_trait::async_trait;

    use super::*;
    use crate::services::auth::VerificationError;
    use crate::services::identity::{IdentityServiceUnavailable, Outage};

    /// Resolver stub: any token is accepted unless it starts with `bad` / `down`.
    struct Stub;

    #[async_trait]
    impl IdentityResolver for Stub {
        fn mode(&self) -> &'static str {
            "stub"
        }

        async fn resolve(&self, token: &BearerToken) -> Result<CallerIdentity, ResolveError> {
            if token.as_str().starts_with("bad") {
                return Err(VerificationError::Expired.into());
            }
            if token.as_str().starts_with("down") {
                return Err(IdentityServiceUnavailable(Outage::CircuitOpen).into());
            }
            Ok(CallerIdentity {
                user_id: 5,
                email: "carol@example.com".into(),
                authorities: BTreeSet::new(),
            })
        }
    }

    fn filter() -> AuthFilter {
        AuthFilter::new(
            PublicEndpoints::new(["/api/auth/register", "/api/auth/login"]),
            Arc::new(Stub),
        )
    }

    fn bearer(value: &str) -> HeaderValue {
        HeaderValue::from_str(value).unwrap()
    }

    #[test]
    fn public_endpoints_match_by_prefix() {
        let public = PublicEndpoints::new(["/api/auth/login", ""]);
        assert!(public.matches("/api/auth/login"));
        assert!(public.matches("/api/auth/login/sso"));
        assert!(!public.matches("/api/users"));
        assert_eq!(public.prefixes().len(), 1);
    }

    #[tokio::test]
    async fn public_and_preflight_requests_skip_authentication() {
        let filter = filter();

        let decision = filter
            .evaluate(&Method::POST, "/api/auth/login", Some(&bearer("garbage")))
            .await
            .unwrap();
        assert_eq!(decision, Decision::Forward);

        let decision = filter.evaluate(&Method::OPTIONS, "/api/orders", None).await.unwrap();
        assert_eq!(decision, Decision::Forward);
    }

    #[tokio::test]
    async fn dot_segments_are_rejected_before_public_match() {
        let filter = filter();

        for path in ["/api/auth/login/../../orders", "/api/auth/login/%2e%2e/%2E%2E/orders"] {
            for method in [Method::GET, Method::OPTIONS] {
                assert!(
                    matches!(
                        filter.evaluate(&method, path, Some(&bearer("Bearer ok.b.c"))).await,
                        Err(AuthRejection::InvalidPath)
                    ),
                    "{method} {path}"
                );
            }
        }
    }

    #[tokio::test]
    async fn header_checks_run_before_resolution() {
        let filter = filter();

        assert!(matches!(
            filter.evaluate(&Method::GET, "/api/orders", None).await,
            Err(AuthRejection::MissingHeader)
        ));
        for value in ["bearer a.b.c", "Basic dXNlcjpwYXNz", "Bearer abc.def", "Bearer a..c"] {
            assert!(
                matches!(
                    filter.evaluate(&Method::GET, "/api/orders", Some(&bearer(value))).await,
                    Err(AuthRejection::MalformedHeader)
                ),
                "{value}"
            );
        }
    }

    #[tokio::test]
    async fn resolver_failures_become_invalid_token() {
        let filter = filter();

        let err = filter
            .evaluate(&Method::GET, "/api/orders", Some(&bearer("Bearer bad.b.c")))
            .await
            .unwrap_err();
        assert!(matches!(&err, AuthRejection::InvalidToken(e) if !e.is_outage()));

        let err = filter
            .evaluate(&Method::GET, "/api/orders", Some(&bearer("Bearer down.b.c")))
            .await
            .unwrap_err();
        assert!(matches!(&err, AuthRejection::InvalidToken(e) if e.is_outage()));
    }

    #[tokio::test]
    async fn authenticated_request_is_derived_with_identity_headers() {
        let request = Request::builder()
            .uri("/api/orders?page=2")
            .header(header::AUTHORIZATION, "Bearer ok.b.c")
            .header(USER_ID_HEADER, "999")
            .body(())
            .unwrap();

        let derived = filter().filter(request).await.unwrap();

        assert_eq!(derived.uri(), "/api/orders?page=2");
        assert_eq!(derived.headers()[header::AUTHORIZATION], "Bearer ok.b.c");
        assert_eq!(derived.headers()[USER_ID_HEADER], "5");
        assert_eq!(derived.headers().get_all(USER_ID_HEADER).iter().count(), 1);
        assert_eq!(derived.headers()[USER_EMAIL_HEADER], "carol@example.com");
        assert_eq!(
            derived.extensions().get::<CallerIdentity>().map(|i| i.user_id),
            Some(5)
        );
    }

    #[test]
    fn unencodable_email_cannot_be_derived() {
        let identity = CallerIdentity {
            user_id: 1,
            email: "bad\nheader@example.com".into(),
            authorities: BTreeSet::new(),
        };
        assert!(derive_request(Request::new(()), identity).is_err());
    }
}
