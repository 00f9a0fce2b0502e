/*
 * Responsibility
 * - 認証 filter を通過した request を upstream に転送する (fallback handler)
 */
use axum::{extract::Request, extract::State, response::Response};

use crate::error::AppError;
use crate::state::AppState;

pub async fn proxy(State(state): State<AppState>, request: Request) -> Result<Response, AppError> {
    Ok(state.upstream.forward(request).await?)
}
