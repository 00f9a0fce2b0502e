/*
 * Responsibility
 * - 検証済み bearer token → CallerIdentity の解決
 * - local (claims をそのまま使う) / remote (identity service に問い合わせる) の 2 戦略
 */
use std::collections::BTreeSet;

use async_trait::async_trait;
use thiserror::Error;

use super::client::IdentityClient;
use super::resilient::{IdentityServiceUnavailable, ResilientIdentityClient};
use super::types::{Cause, CallerIdentity, Extracted, Outage, TokenValidity};
use crate::services::auth::{BearerToken, TokenVerifier, VerificationError};

/// Why a token could not be turned into an identity.
///
/// Only logged; the client always sees a plain invalid-token rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("token verification failed: {0}")]
    Verification(#[from] VerificationError),
    #[error("identity service rejected the token")]
    Rejected,
    #[error("identity service returned no {0}")]
    ClaimAbsent(&'static str),
    #[error("no account for token subject")]
    AccountNotFound,
    #[error("account disabled")]
    AccountDisabled,
    #[error(transparent)]
    Unavailable(#[from] IdentityServiceUnavailable),
}

impl ResolveError {
    /// The failure came from a dependency outage, not from the token itself.
    pub fn outage(&self) -> Option<Outage> {
        match self {
            ResolveError::Unavailable(IdentityServiceUnavailable(outage)) => Some(*outage),
            _ => None,
        }
    }

    pub fn is_outage(&self) -> bool {
        self.outage().is_some()
    }
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    // Mode name (for logging / health).
    fn mode(&self) -> &'static str;

    async fn resolve(&self, token: &BearerToken) -> Result<CallerIdentity, ResolveError>;
}

/// Resolves identities from the token's own claims.
#[derive(Debug, Clone)]
pub struct LocalIdentityResolver {
    verifier: TokenVerifier,
}

impl LocalIdentityResolver {
    pub fn new(verifier: TokenVerifier) -> Self {
        Self { verifier }
    }
}

#[async_trait]
impl IdentityResolver for LocalIdentityResolver {
    fn mode(&self) -> &'static str {
        "local"
    }

    async fn resolve(&self, token: &BearerToken) -> Result<CallerIdentity, ResolveError> {
        let claims = self.verifier.verify(token)?;

        Ok(CallerIdentity {
            user_id: claims.user_id(),
            email: claims.subject().to_string(),
            authorities: claims.authorities().clone(),
        })
    }
}

/// Resolves identities by asking the identity service, one call at a time.
///
/// Stops at the first negative answer; later calls are never issued.
pub struct RemoteIdentityResolver<C: IdentityClient> {
    client: ResilientIdentityClient<C>,
    fetch_details: bool,
}

impl<C: IdentityClient> RemoteIdentityResolver<C> {
    pub fn new(client: ResilientIdentityClient<C>, fetch_details: bool) -> Self {
        Self {
            client,
            fetch_details,
        }
    }
}

fn absent(claim: &'static str, cause: Cause) -> ResolveError {
    match cause {
        Cause::Reported => ResolveError::ClaimAbsent(claim),
        Cause::Outage(outage) => ResolveError::Unavailable(IdentityServiceUnavailable(outage)),
    }
}

#[async_trait]
impl<C: IdentityClient> IdentityResolver for RemoteIdentityResolver<C> {
    fn mode(&self) -> &'static str {
        "remote"
    }

    async fn resolve(&self, token: &BearerToken) -> Result<CallerIdentity, ResolveError> {
        let authorization = token.authorization_value();

        match self.client.validate_token(&authorization).await {
            TokenValidity::Valid => {}
            TokenValidity::Invalid(Cause::Reported) => return Err(ResolveError::Rejected),
            TokenValidity::Invalid(Cause::Outage(outage)) => {
                return Err(IdentityServiceUnavailable(outage).into());
            }
        }

        let email = match self.client.extract_email(&authorization).await {
            Extracted::Present(email) => email,
            Extracted::Absent(cause) => return Err(absent("email", cause)),
        };

        let user_id = match self.client.extract_user_id(&authorization).await {
            Extracted::Present(user_id) => user_id,
            Extracted::Absent(cause) => return Err(absent("user id", cause)),
        };

        let mut authorities = BTreeSet::new();
        if self.fetch_details {
            let details = self
                .client
                .user_details(&email)
                .await?
                .ok_or(ResolveError::AccountNotFound)?;
            if !details.enabled {
                return Err(ResolveError::AccountDisabled);
            }
            authorities.extend(details.authorities);
        }

        Ok(CallerIdentity {
            user_id,
            email,
            authorities,
        })
    }
}
