/*
 * Responsibility
 * - Config読み込み → 依存生成 (RequestClient / CredentialStore / Telemetry) → Router 組み立て
 * - Middleware の適用 (request-id / trace / RouteGuard)
 * - axum::serve() で起動
 */
use std::{panic, process};

use anyhow::Result;
use axum::Router;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api;
use crate::config::Config;
use crate::middleware;
use crate::services::clock::system_clock;
use crate::services::credential_store::CredentialStore;
use crate::services::request_client::RequestClient;
use crate::services::route_guard::RolePolicy;
use crate::services::telemetry::Telemetry;
use crate::state::AppState;

fn init_tracing() {
    // Prefer RUST_LOG if set; otherwise use a sensible default.
    // Ex:
    // RUST_LOG=info,tarla_web=debug,tower_http=debug cargo run
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn init_panic_hook(abort_on_panic: bool) {
    let default_hook = panic::take_hook();

    panic::set_hook(Box::new(move |info| {
        // Always surface panics via tracing (stderr can be hidden depending on how we are launched).
        tracing::error!(?info, "panic");

        // development: fail fast. production: default hook, keep serving.
        if abort_on_panic {
            process::abort();
        } else {
            default_hook(info);
        }
    }))
}

pub async fn run() -> Result<()> {
    init_tracing();
    let config = Config::from_env()?;

    init_panic_hook(!config.app_env.is_production());

    tracing::info!(
        "starting web gate in {:?} mode on {}",
        config.app_env,
        config.addr
    );
    log_role_policy();

    let addr = config.addr;
    let state = build_state(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(config: Config) -> Result<AppState> {
    let telemetry = Telemetry::default();
    let client = RequestClient::http(
        config.api_base_url.clone(),
        config.request_timeout,
        telemetry.clone(),
    )?;
    let credentials = CredentialStore::resolve(config.valkey_url.as_deref(), system_clock()).await;
    tracing::info!(backend = credentials.backend_name(), "credential store ready");

    Ok(AppState::new(config, client, credentials, telemetry))
}

pub fn build_router(state: AppState) -> Router {
    middleware::http::apply(api::routes(state))
}

fn log_role_policy() {
    for (role, prefixes) in RolePolicy::entries() {
        tracing::debug!(%role, ?prefixes, "role policy");
    }
    for problem in RolePolicy::audit() {
        tracing::warn!(%problem, "role policy problem");
    }
}
