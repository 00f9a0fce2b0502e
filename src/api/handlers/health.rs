/*
 * Responsibility
 * - GET /health (疎通用、認証 filter の外)
 * - identity service の circuit 状態を返す (remote mode のみ)
 */
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::services::resilience::{CircuitSnapshot, CircuitState};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub identity_mode: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_circuit: Option<CircuitSnapshot>,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let identity_circuit = state.identity_circuit.as_ref().map(|breaker| breaker.snapshot());

    // Still 200 while the circuit is open: the gateway itself is up.
    let status = match identity_circuit.as_ref().map(|s| s.state) {
        Some(CircuitState::Open) => "degraded",
        _ => "ok",
    };

    (
        StatusCode::OK,
        Json(HealthResponse {
            status,
            identity_mode: state.auth_filter.resolver_mode(),
            identity_circuit,
        }),
    )
}
