/*
 * Responsibility
 * - ナビゲーション用の placeholder (ページ描画は外部)
 * - RouteGuard を通過した後に到達する
 */
use axum::{http::StatusCode, response::Html};

use crate::error::AppError;

pub async fn home() -> Html<&'static str> {
    Html("<!doctype html><title>TarlaAnaliz</title>")
}

pub async fn login_page() -> Html<&'static str> {
    Html("<!doctype html><title>Login</title>")
}

pub async fn forbidden_page() -> (StatusCode, Html<&'static str>) {
    (
        StatusCode::FORBIDDEN,
        Html("<!doctype html><title>Forbidden</title>"),
    )
}

pub async fn not_found() -> AppError {
    AppError::not_found("page")
}
