/*
 * Responsibility
 * - gate の URL 構造を定義
 * - ナビゲーション (pages / health) には RouteGuard を掛ける
 * - /api/auth/ 配下は guard の外に merge
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::handlers::{
    auth::{login, logout, unlock},
    health::health,
    pages::{forbidden_page, home, login_page, not_found},
};
use crate::middleware;
use crate::state::AppState;

pub fn routes(state: AppState) -> Router {
    let navigation = Router::new()
        .route("/", get(home))
        .route("/login", get(login_page))
        .route("/forbidden", get(forbidden_page))
        .route("/api/health", get(health))
        .fallback(not_found);
    let navigation = middleware::route_guard::apply(navigation);

    let auth = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/unlock", post(unlock));

    Router::new()
        .merge(navigation)
        .merge(auth)
        .with_state(state)
}
