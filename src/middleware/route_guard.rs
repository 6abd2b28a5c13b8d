//! ページ遷移の前に RouteGuard を掛ける middleware
//!
//! - `Cookie` から `ta_token` / `ta_role` を取り出して `GuardInput` を組み立てる
//! - Unauthenticated → 307 /login, Forbidden → 307 /forbidden
//! - それ以外はそのまま次へ
//!
//! ```ignore
//! let pages = middleware::route_guard::apply(pages);
//! ```

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, Request, header},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::services::route_guard::{GuardInput, RouteGuard};
use crate::state::AppState;

pub const TOKEN_COOKIE: &str = "ta_token";
pub const ROLE_COOKIE: &str = "ta_role";

pub fn apply(router: Router<AppState>) -> Router<AppState> {
    router.layer(middleware::from_fn(route_guard_middleware))
}

async fn route_guard_middleware(req: Request<Body>, next: Next) -> Response {
    let token = cookie_value(req.headers(), TOKEN_COOKIE);
    let role = cookie_value(req.headers(), ROLE_COOKIE);

    let decision = RouteGuard::decide(&GuardInput {
        path: req.uri().path(),
        token: token.as_deref(),
        role: role.as_deref(),
    });

    match decision.redirect_target() {
        Some(target) => {
            debug!(
                path = %req.uri().path(),
                decision = decision.as_str(),
                "navigation redirected"
            );
            Redirect::temporary(target).into_response()
        }
        None => next.run(req).await,
    }
}

/// First value of `name` across all `Cookie` headers.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}
