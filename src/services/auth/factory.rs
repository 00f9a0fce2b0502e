/// Factory: build the authentication filter and its identity resolver from `Config`.
use std::sync::Arc;

use crate::config::{Config, IdentityMode};
use crate::error::AppError;
use crate::services::auth::{AuthFilter, PublicEndpoints, TokenVerifier};
use crate::services::identity::{
    HttpIdentityClient, IdentityResolver, LocalIdentityResolver, RemoteIdentityResolver,
    ResilientIdentityClient,
};
use crate::services::resilience::CircuitBreaker;

pub const IDENTITY_CIRCUIT: &str = "identity-service";

pub struct AuthStack {
    pub filter: Arc<AuthFilter>,
    /// Present in remote mode only.
    pub identity_circuit: Option<Arc<CircuitBreaker>>,
}

pub fn build_auth_stack(config: &Config) -> Result<AuthStack, AppError> {
    let public = PublicEndpoints::new(config.public_paths.iter().cloned());

    let (resolver, identity_circuit): (Arc<dyn IdentityResolver>, Option<Arc<CircuitBreaker>>) =
        match &config.identity_mode {
            IdentityMode::Local => {
                let verifier = TokenVerifier::new(config.jwt_secret.as_bytes());
                (Arc::new(LocalIdentityResolver::new(verifier)), None)
            }
            IdentityMode::Remote {
                service_url,
                fetch_details,
            } => {
                let client = HttpIdentityClient::new(service_url.clone()).map_err(|e| {
                    tracing::error!(error = %e, "failed to build identity service client");
                    AppError::Internal
                })?;
                let breaker = Arc::new(CircuitBreaker::new(IDENTITY_CIRCUIT, config.circuit.clone()));
                let client = ResilientIdentityClient::new(client, breaker.clone());

                (
                    Arc::new(RemoteIdentityResolver::new(client, *fetch_details)),
                    Some(breaker),
                )
            }
        };

    tracing::info!(
        mode = resolver.mode(),
        public_paths = ?public.prefixes(),
        "authentication filter ready"
    );

    Ok(AuthStack {
        filter: Arc::new(AuthFilter::new(public, resolver)),
        identity_circuit,
    })
}
