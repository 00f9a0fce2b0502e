//! Circuit-breaker-guarded access to the identity service.
//!
//! Every operation has its own fallback, so callers receive a value and never
//! a raw transport error:
//! - token validation   -> `TokenValidity::Invalid(Cause::Outage(..))` (fail closed)
//! - claim extraction   -> `Extracted::Absent(Cause::Outage(..))`
//! - detail lookup      -> `Err(IdentityServiceUnavailable)`
use std::sync::Arc;

use thiserror::Error;

use super::client::{IdentityClient, IdentityClientError};
use super::types::{Cause, Extracted, Outage, TokenValidity, UserDetails};
use crate::services::resilience::{CallError, CircuitBreaker};

/// Fatal fallback of the detail lookup: no identity can be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("identity service unavailable ({0})")]
pub struct IdentityServiceUnavailable(pub Outage);

pub struct ResilientIdentityClient<C: IdentityClient> {
    inner: C,
    breaker: Arc<CircuitBreaker>,
}

impl<C: IdentityClient> ResilientIdentityClient<C> {
    pub fn new(inner: C, breaker: Arc<CircuitBreaker>) -> Self {
        Self { inner, breaker }
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub async fn validate_token(&self, authorization: &str) -> TokenValidity {
        match self.breaker.call(self.inner.validate_token(authorization)).await {
            Ok(true) => TokenValidity::Valid,
            Ok(false) => TokenValidity::Invalid(Cause::Reported),
            Err(err) => TokenValidity::Invalid(Cause::Outage(self.outage("validate-token", err))),
        }
    }

    pub async fn extract_email(&self, authorization: &str) -> Extracted<String> {
        match self.breaker.call(self.inner.extract_email(authorization)).await {
            Ok(Some(email)) => Extracted::Present(email),
            Ok(None) => Extracted::Absent(Cause::Reported),
            Err(err) => Extracted::Absent(Cause::Outage(self.outage("extract-email", err))),
        }
    }

    pub async fn extract_user_id(&self, authorization: &str) -> Extracted<i64> {
        match self.breaker.call(self.inner.extract_user_id(authorization)).await {
            Ok(Some(user_id)) => Extracted::Present(user_id),
            Ok(None) => Extracted::Absent(Cause::Reported),
            Err(err) => Extracted::Absent(Cause::Outage(self.outage("extract-user-id", err))),
        }
    }

    /// `Ok(None)` means the service answered that no such account exists.
    pub async fn user_details(
        &self,
        email: &str,
    ) -> Result<Option<UserDetails>, IdentityServiceUnavailable> {
        self.breaker
            .call(self.inner.user_details(email))
            .await
            .map_err(|err| IdentityServiceUnavailable(self.outage("user-details", err)))
    }

    fn outage(&self, operation: &'static str, err: CallError<IdentityClientError>) -> Outage {
        let outage = match &err {
            CallError::Rejected(_) => Outage::CircuitOpen,
            CallError::Timeout(_) => Outage::Timeout,
            CallError::Failed(_) => Outage::Failed,
        };

        if err.is_rejected() {
            tracing::warn!(
                dependency = self.inner.backend_name(),
                operation,
                state = %self.breaker.state(),
                "identity call short-circuited, using fallback"
            );
        } else {
            tracing::error!(
                dependency = self.inner.backend_name(),
                operation,
                error = %err,
                "identity call failed, using fallback"
            );
        }

        outage
    }
}
