/*
 * Responsibility
 * - gateway の URL 構造を定義
 * - /health は認証の外、それ以外はすべて認証 filter → upstream 転送
 */
use axum::{Router, routing::get};

use crate::api::handlers::{health::health, proxy::proxy};
use crate::middleware;
use crate::state::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    let proxied = Router::new().fallback(proxy);
    let proxied = middleware::auth::access::apply(proxied, state.auth_filter.clone());

    Router::new().route("/health", get(health)).merge(proxied)
}
