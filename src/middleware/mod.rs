/*
 * Responsibility
 * - middleware の公開インターフェース
 * - auth (認証 filter), cors, http (request-id / trace / limit / timeout / panic)
 */
pub mod auth;
pub mod cors;
pub mod http;
