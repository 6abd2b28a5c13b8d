/*
 * Responsibility
 * - middleware の公開インターフェース
 * - http: request-id / trace / body limit / timeout
 * - route_guard: ページ遷移前の RouteGuard 判定 (cookie → redirect)
 */
pub mod http;
pub mod route_guard;
