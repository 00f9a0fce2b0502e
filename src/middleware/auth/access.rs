//! bearer token 検証 → identity header を付与した derived request を次段へ渡す
//!
//! - public path / pre-flight はそのまま通す
//! - 失敗時は 401 (JSON body + `WWW-Authenticate: Bearer`) で打ち切る
//! - 判定ロジックは `services::auth::AuthFilter` 側にあり、ここは配線だけ

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::error::AppError;
use crate::services::auth::AuthFilter;

/// 転送対象の Router に認証を掛ける。
///
/// 例：
/// ```ignore
/// let proxied = Router::new().fallback(proxy);
/// let proxied = middleware::auth::access::apply(proxied, state.auth_filter.clone());
/// ```
pub fn apply<S>(router: Router<S>, filter: Arc<AuthFilter>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    // axum 0.8 の from_fn は State extractor を受け取れないため、`from_fn_with_state` で明示的に state を渡す
    router.layer(middleware::from_fn_with_state(filter, access_middleware))
}

async fn access_middleware(
    State(filter): State<Arc<AuthFilter>>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    // 元の request は消費され、以降は derived request だけが流れる
    let req = filter.filter(req).await?;

    Ok(next.run(req).await)
}
