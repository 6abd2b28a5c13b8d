/*
 * Responsibility
 * - POST /api/auth/login  : backend login → ta_token / ta_role cookie
 * - POST /api/auth/logout : cookie を失効 (204)
 * - POST /api/auth/unlock : PIN artifact によるローカル unlock 判定
 *   - ta_token cookie が同じ subject の保存 token と一致する場合のみ
 *   - 連続失敗で artifact は破棄される (SessionController 側)
 * - RouteGuard の外側に mount される (未ログインでも叩ける)
 */
use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse, Response},
};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::api::dto::auth::{CredentialsRequest, LoginResponse};
use crate::error::AppError;
use crate::middleware::route_guard::{ROLE_COOKIE, TOKEN_COOKIE, cookie_value};
use crate::services::correlation;
use crate::services::session::{LoginOptions, SessionController, SessionPolicy};
use crate::state::AppState;

pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CredentialsRequest>,
) -> Result<Response, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_CREDENTIALS", msg))?;

    let options = LoginOptions {
        corr_id: correlation::from_headers(&headers).corr_id,
    };
    let session = session_for(&state, &req.phone)
        .login_with(&req.phone, &req.pin, options)
        .await?;

    let (Some(token), Some(user)) = (session.token, session.user) else {
        return Err(AppError::Internal);
    };

    let max_age = state.config.session_token_ttl.as_secs();
    let secure = state.config.cookie_secure;
    let cookies = AppendHeaders([
        (
            header::SET_COOKIE,
            session_cookie(TOKEN_COOKIE, &token, max_age, secure),
        ),
        (
            header::SET_COOKIE,
            session_cookie(ROLE_COOKIE, user.role.as_str(), max_age, secure),
        ),
    ]);

    Ok((cookies, Json(LoginResponse { user: user.into() })).into_response())
}

pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    let secure = state.config.cookie_secure;
    (
        StatusCode::NO_CONTENT,
        AppendHeaders([
            (header::SET_COOKIE, session_cookie(TOKEN_COOKIE, "", 0, secure)),
            (header::SET_COOKIE, session_cookie(ROLE_COOKIE, "", 0, secure)),
        ]),
    )
}

pub async fn unlock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<CredentialsRequest>,
) -> Result<StatusCode, AppError> {
    req.validate()
        .map_err(|msg| AppError::bad_request("INVALID_CREDENTIALS", msg))?;

    let Some(cookie_token) = cookie_value(&headers, TOKEN_COOKIE) else {
        return Err(AppError::unauthorized("UNLOCK_FAILED"));
    };

    let session = session_for(&state, &req.phone);
    // the cookie must belong to this subject's stored session
    if session.restore().await.token.as_deref() != Some(cookie_token.as_str()) {
        return Err(AppError::unauthorized("UNLOCK_FAILED"));
    }

    if session.verify_pin(&req.phone, &req.pin).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::unauthorized("UNLOCK_FAILED"))
    }
}

// 1 request = 1 SessionController. Slots are namespaced per phone (hashed).
fn session_for(state: &AppState, phone: &str) -> SessionController {
    let config = &state.config;
    SessionController::new(
        state.client.clone(),
        state.credentials.scoped(subject_scope(phone)),
        SessionPolicy {
            login_path: config.auth_login_path.clone(),
            token_ttl: config.session_token_ttl,
            pin_ttl: config.pin_artifact_ttl,
        },
        state.telemetry.clone(),
    )
}

fn subject_scope(phone: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(phone.trim().as_bytes()))
}

fn session_cookie(name: &str, value: &str, max_age: u64, secure: bool) -> String {
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age}; HttpOnly; SameSite=Lax");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
