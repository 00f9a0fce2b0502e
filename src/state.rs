/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - auth_filter: AuthFilter, upstream: UpstreamClient, identity_circuit: CircuitBreaker
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::services::auth::AuthFilter;
use crate::services::resilience::CircuitBreaker;
use crate::services::upstream::UpstreamClient;

#[derive(Clone)]
pub struct AppState {
    pub auth_filter: Arc<AuthFilter>,
    pub upstream: UpstreamClient,
    pub identity_circuit: Option<Arc<CircuitBreaker>>,
}

impl AppState {
    pub fn new(
        auth_filter: Arc<AuthFilter>,
        upstream: UpstreamClient,
        identity_circuit: Option<Arc<CircuitBreaker>>,
    ) -> Self {
        Self {
            auth_filter,
            upstream,
            identity_circuit,
        }
    }
}
