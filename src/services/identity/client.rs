//! Identity service interface used by the remote resolver.
use async_trait::async_trait;
use thiserror::Error;

use super::types::UserDetails;

pub type IdentityResult<T> = Result<T, IdentityClientError>;

/// Dependency-level failures (transport/status/decoding).
///
/// Note:
/// - A 4xx answer is not an error here: it means "no" (validation) or "absent"
///   (extraction), and does not count against the circuit breaker.
#[derive(Debug, Error)]
pub enum IdentityClientError {
    #[error("identity service unreachable at {endpoint}: {message}")]
    Transport { endpoint: String, message: String },
    #[error("identity service {endpoint} returned {status}")]
    Status { endpoint: String, status: u16 },
    #[error("unexpected response from {endpoint}: {message}")]
    Decode { endpoint: String, message: String },
    #[error("invalid identity service url: {0}")]
    Url(String),
}

/// The identity service operations the gateway depends on.
///
/// Every method takes the full `Authorization` header value (`Bearer <token>`),
/// except the detail lookup, which is keyed by email.
#[async_trait]
pub trait IdentityClient: Send + Sync + 'static {
    // Backend name (for logging).
    fn backend_name(&self) -> &'static str;

    async fn validate_token(&self, authorization: &str) -> IdentityResult<bool>;

    // `Ok(None)` when the service has no email for this token.
    async fn extract_email(&self, authorization: &str) -> IdentityResult<Option<String>>;

    // `Ok(None)` when the service has no user id for this token.
    async fn extract_user_id(&self, authorization: &str) -> IdentityResult<Option<i64>>;

    // `Ok(None)` when no account exists for `email`.
    async fn user_details(&self, email: &str) -> IdentityResult<Option<UserDetails>>;
}
