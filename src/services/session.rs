//! Login / logout orchestration.
//!
//! SessionController is the only writer of the in-memory `Session`. The token it
//! keeps is mirrored into CredentialStore with the configured TTL.
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::services::credential_store::{CredentialStore, SecretKind};
use crate::services::request_client::{
    ApiClientError, RequestBody, RequestClient, RequestOptions,
};
use crate::services::route_guard::Role;
use crate::services::telemetry::{Telemetry, TelemetryEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub role: Role,
    #[serde(
        default,
        alias = "phoneMasked",
        skip_serializing_if = "Option::is_none"
    )]
    pub phone_masked: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<SessionUser>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Wrong PINs tolerated before the stored artifact is discarded.
pub const MAX_PIN_ATTEMPTS: u32 = 5;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token: String,
    user: SessionUser,
}

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub login_path: String,
    pub token_ttl: Duration,
    // Duration::ZERO disables the PIN artifact.
    pub pin_ttl: Duration,
}

/// Per-call knobs for `login`.
#[derive(Debug, Clone, Default)]
pub struct LoginOptions {
    pub corr_id: Option<String>,
}

#[derive(Debug)]
pub struct SessionController {
    client: RequestClient,
    store: CredentialStore,
    policy: SessionPolicy,
    telemetry: Telemetry,
    session: RwLock<Session>,
}

impl SessionController {
    pub fn new(
        client: RequestClient,
        store: CredentialStore,
        policy: SessionPolicy,
        telemetry: Telemetry,
    ) -> Self {
        Self {
            client,
            store,
            policy,
            telemetry,
            session: RwLock::new(Session::default()),
        }
    }

    /// Rebuild the session on mount: the token comes from CredentialStore, the user
    /// profile is not persisted and stays `None` until the next login.
    pub async fn restore(&self) -> Session {
        let token = self.store.auth_token().await;
        let mut session = self.session.write().await;
        if session.token != token {
            *session = Session { token, user: None };
        }
        session.clone()
    }

    pub async fn login(&self, phone: &str, pin: &str) -> Result<Session, ApiClientError> {
        self.login_with(phone, pin, LoginOptions::default()).await
    }

    /// Errors from RequestClient are returned unchanged.
    pub async fn login_with(
        &self,
        phone: &str,
        pin: &str,
        options: LoginOptions,
    ) -> Result<Session, ApiClientError> {
        let (phone, pin) = (phone.trim(), pin.trim());

        let mut request = RequestOptions::post(RequestBody::Json(serde_json::json!({
            "phone": phone,
            "pin": pin,
        })));
        request.corr_id = options.corr_id;

        let resp = self
            .client
            .request::<LoginResponse>(&self.policy.login_path, request)
            .await?;
        let LoginResponse { access_token, user } = resp.data;

        self.store
            .set_auth_token(&access_token, self.policy.token_ttl)
            .await;
        self.store.remove(SecretKind::PinFailures).await;
        if !self.policy.pin_ttl.is_zero() {
            self.store
                .set_pin_artifact(&pin_artifact(phone, pin), self.policy.pin_ttl)
                .await;
        }

        let session = Session {
            token: Some(access_token),
            user: Some(user),
        };
        *self.session.write().await = session.clone();

        info!(
            corr_id = %resp.corr_id,
            user_id = session.user.as_ref().map(|u| u.id.as_str()).unwrap_or_default(),
            "login succeeded"
        );
        self.telemetry.track(
            TelemetryEvent::new("session.login")
                .with_ids(&resp.corr_id, &resp.request_id)
                .with(
                    "role",
                    session.user.as_ref().map(|u| u.role.as_str()).unwrap_or_default(),
                ),
        );

        Ok(session)
    }

    /// Local unlock check against the stored PIN artifact. No network.
    ///
    /// After `MAX_PIN_ATTEMPTS` consecutive misses the artifact is removed, so only a
    /// fresh login can unlock again.
    pub async fn verify_pin(&self, phone: &str, pin: &str) -> bool {
        let Some(stored) = self.store.pin_artifact().await else {
            return false;
        };

        if stored == pin_artifact(phone.trim(), pin.trim()) {
            self.store.remove(SecretKind::PinFailures).await;
            return true;
        }

        let failures = self
            .store
            .load(SecretKind::PinFailures)
            .await
            .and_then(|raw| raw.parse::<u32>().ok())
            .unwrap_or(0)
            .saturating_add(1);

        if failures >= MAX_PIN_ATTEMPTS {
            self.store.remove(SecretKind::PinArtifact).await;
            self.store.remove(SecretKind::PinFailures).await;
            warn!(failures, "too many wrong PINs, unlock artifact discarded");
            self.telemetry
                .track(TelemetryEvent::new("session.pin_locked").with("failures", failures));
        } else {
            self.store
                .save(
                    SecretKind::PinFailures,
                    &failures.to_string(),
                    self.policy.pin_ttl,
                )
                .await;
        }
        false
    }

    /// Always succeeds: clears stored credentials and resets the session.
    pub async fn logout(&self) {
        self.store.clear().await;
        *self.session.write().await = Session::default();
        debug!("session cleared");
        self.telemetry.track(TelemetryEvent::new("session.logout"));
    }

    pub async fn session(&self) -> Session {
        self.session.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_authenticated()
    }
}

fn pin_artifact(phone: &str, pin: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", phone, pin).as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::clock::testing::ManualClock;
    use crate::services::credential_store::{MemoryKv, SecretKind};
    use crate::services::request_client::ApiErrorKind;
    use crate::services::request_client::body::TransportBody;
    use crate::services::request_client::transport::testing::StubTransport;
    use axum::http::StatusCode;
    use std::sync::Arc;
    use url::Url;

    const STUB_LOGIN: &str =
        r#"{"access_token":"stub-token","user":{"id":"u-farmer-1","role":"farmer"}}"#;

    struct Fixture {
        controller: SessionController,
        store: CredentialStore,
        clock: Arc<ManualClock>,
        transport: Arc<StubTransport>,
    }

    fn fixture(transport: StubTransport, pin_ttl: Duration) -> Fixture {
        let transport = Arc::new(transport);
        let clock = Arc::new(ManualClock::at(1_000_000));
        let kv = Arc::new(MemoryKv::with_clock(clock.clone()));
        let store = CredentialStore::new(kv, clock.clone());
        let client = RequestClient::new(transport.clone(), Telemetry::disabled())
            .with_base_url(Url::parse("http://api.local").unwrap());
        let controller = SessionController::new(
            client,
            store.clone(),
            SessionPolicy {
                login_path: "/api/auth/login".into(),
                token_ttl: Duration::from_secs(3600),
                pin_ttl,
            },
            Telemetry::disabled(),
        );
        Fixture {
            controller,
            store,
            clock,
            transport,
        }
    }

    #[tokio::test]
    async fn login_stores_token_and_updates_session() {
        let f = fixture(
            StubTransport::responding(StatusCode::OK, STUB_LOGIN),
            Duration::ZERO,
        );

        let session = f.controller.login("5551234567", "1234").await.unwrap();

        let expected = Session {
            token: Some("stub-token".into()),
            user: Some(SessionUser {
                id: "u-farmer-1".into(),
                role: Role::Farmer,
                phone_masked: None,
            }),
        };
        assert_eq!(session, expected);
        assert_eq!(f.controller.session().await, expected);
        assert!(f.controller.is_authenticated().await);
        assert_eq!(f.store.load(SecretKind::Token).await.as_deref(), Some("stub-token"));
        assert_eq!(f.store.load(SecretKind::PinArtifact).await, None);

        let sent = &f.transport.requests()[0];
        assert_eq!(sent.url.as_str(), "http://api.local/api/auth/login");
        assert_eq!(
            sent.body,
            Some(TransportBody::Text(r#"{"phone":"5551234567","pin":"1234"}"#.into()))
        );
    }

    #[tokio::test]
    async fn token_expires_with_configured_ttl() {
        let f = fixture(
            StubTransport::responding(StatusCode::OK, STUB_LOGIN),
            Duration::ZERO,
        );
        f.controller.login("5551234567", "1234").await.unwrap();

        f.clock.advance_millis(3_600_000);

        assert_eq!(f.store.auth_token().await, None);
        assert_eq!(f.controller.restore().await, Session::default());
    }

    #[tokio::test]
    async fn failed_login_propagates_client_error_unchanged() {
        let f = fixture(
            StubTransport::responding(StatusCode::UNAUTHORIZED, r#"{"detail":"bad pin"}"#),
            Duration::ZERO,
        );

        let err = f.controller.login("5551234567", "0000").await.unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Http);
        assert_eq!(err.status, 401);
        assert_eq!(err.to_string(), "API request failed: 401");
        assert_eq!(f.controller.session().await, Session::default());
        assert_eq!(f.store.auth_token().await, None);
    }

    #[tokio::test]
    async fn login_reuses_supplied_corr_id() {
        let f = fixture(
            StubTransport::responding(StatusCode::OK, STUB_LOGIN),
            Duration::ZERO,
        );

        f.controller
            .login_with(
                "5551234567",
                "1234",
                LoginOptions {
                    corr_id: Some("corr_login".into()),
                },
            )
            .await
            .unwrap();

        let sent = &f.transport.requests()[0];
        assert_eq!(sent.headers.get("x-corr-id").unwrap(), "corr_login");
    }

    #[tokio::test]
    async fn pin_artifact_allows_local_unlock_until_it_expires() {
        let f = fixture(
            StubTransport::responding(StatusCode::OK, STUB_LOGIN),
            Duration::from_secs(300),
        );
        f.controller.login(" 5551234567 ", "1234").await.unwrap();

        assert!(f.controller.verify_pin("5551234567", "1234").await);
        assert!(!f.controller.verify_pin("5551234567", "9999").await);

        f.clock.advance_millis(300_000);
        assert!(!f.controller.verify_pin("5551234567", "1234").await);
    }

    #[tokio::test]
    async fn repeated_wrong_pins_discard_the_artifact() {
        let f = fixture(
            StubTransport::responding(StatusCode::OK, STUB_LOGIN),
            Duration::from_secs(300),
        );
        f.controller.login("5551234567", "1234").await.unwrap();

        for _ in 0..MAX_PIN_ATTEMPTS - 1 {
            assert!(!f.controller.verify_pin("5551234567", "0000").await);
        }
        assert!(f.store.pin_artifact().await.is_some());

        assert!(!f.controller.verify_pin("5551234567", "0000").await);
        assert_eq!(f.store.pin_artifact().await, None);
        assert_eq!(f.store.load(SecretKind::PinFailures).await, None);

        // the right PIN no longer helps
        assert!(!f.controller.verify_pin("5551234567", "1234").await);
    }

    #[tokio::test]
    async fn correct_pin_resets_the_failure_count() {
        let f = fixture(
            StubTransport::responding(StatusCode::OK, STUB_LOGIN),
            Duration::from_secs(300),
        );
        f.controller.login("5551234567", "1234").await.unwrap();

        for _ in 0..MAX_PIN_ATTEMPTS - 1 {
            assert!(!f.controller.verify_pin("5551234567", "0000").await);
        }
        assert!(f.controller.verify_pin("5551234567", "1234").await);
        assert!(!f.controller.verify_pin("5551234567", "0000").await);

        assert!(f.store.pin_artifact().await.is_some());
        assert_eq!(f.store.load(SecretKind::PinFailures).await.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn logout_clears_everything_even_without_network() {
        let f = fixture(
            StubTransport::responding(StatusCode::OK, STUB_LOGIN),
            Duration::from_secs(300),
        );
        f.controller.login("5551234567", "1234").await.unwrap();

        f.controller.logout().await;

        assert_eq!(f.controller.session().await, Session::default());
        assert!(!f.controller.is_authenticated().await);
        assert_eq!(f.store.auth_token().await, None);
        assert_eq!(f.store.pin_artifact().await, None);
    }

    #[tokio::test]
    async fn restore_picks_up_stored_token() {
        let f = fixture(StubTransport::failing(), Duration::ZERO);
        f.store.set_auth_token("persisted", Duration::from_secs(60)).await;

        let session = f.controller.restore().await;

        assert_eq!(session.token.as_deref(), Some("persisted"));
        assert_eq!(session.user, None);
    }

    #[test]
    fn user_accepts_camel_case_phone_mask() {
        let user: SessionUser = serde_json::from_str(
            r#"{"id":"u-1","role":"pilot","phoneMasked":"555****567"}"#,
        )
        .unwrap();

        assert_eq!(user.role, Role::Pilot);
        assert_eq!(user.phone_masked.as_deref(), Some("555****567"));
    }
}
