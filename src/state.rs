/*
 * Responsibility
 * - Router に紐づける共有コンテキスト (AppState)
 *   - config / RequestClient / CredentialStore / Telemetry
 * - Clone 前提で持つ (内部は Arc/Clone cheap)
 */
use std::sync::Arc;

use crate::config::Config;
use crate::services::credential_store::CredentialStore;
use crate::services::request_client::RequestClient;
use crate::services::telemetry::Telemetry;

#[derive(Clone, Debug)]
pub struct AppState {
    pub config: Arc<Config>,
    pub client: RequestClient,
    pub credentials: CredentialStore,
    pub telemetry: Telemetry,
}

impl AppState {
    pub fn new(
        config: Config,
        client: RequestClient,
        credentials: CredentialStore,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            config: Arc::new(config),
            client,
            credentials,
            telemetry,
        }
    }
}
