/*
 * Responsibility
 * - 環境変数や設定の読み込み (API_BASE_URL, TTL, Valkey など)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Staging,
    Production,
    Test,
}

impl AppEnv {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            _ => Err(ConfigError::Invalid("APP_ENV")),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(&'static str),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

#[derive(Clone, Debug)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub service_name: String,

    pub api_base_url: Url,
    pub auth_login_path: String,
    pub request_timeout: Duration,

    pub session_token_ttl: Duration,
    pub pin_artifact_ttl: Duration,
    pub cookie_secure: bool,

    pub valkey_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary lookup so tests do not have to touch
    /// the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&lookup, "PORT", 3000)?;
        let addr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = match lookup("APP_ENV") {
            Some(raw) => AppEnv::parse(&raw)?,
            None => AppEnv::Development,
        };

        let service_name = lookup("SERVICE_NAME")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "tarlaanaliz-web".to_string());

        let api_base_url = lookup("API_BASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("API_BASE_URL"))?;
        let api_base_url =
            Url::parse(api_base_url.trim()).map_err(|_| ConfigError::Invalid("API_BASE_URL"))?;

        let auth_login_path =
            lookup("AUTH_LOGIN_PATH").unwrap_or_else(|| "/api/auth/login".to_string());
        if !auth_login_path.starts_with('/') {
            return Err(ConfigError::Invalid("AUTH_LOGIN_PATH"));
        }

        let request_timeout_ms: u64 = parse_or(&lookup, "REQUEST_TIMEOUT_MS", 10_000)?;
        let session_token_ttl_seconds: u64 = parse_or(&lookup, "SESSION_TOKEN_TTL_SECONDS", 3600)?;
        let pin_artifact_ttl_seconds: u64 = parse_or(&lookup, "PIN_ARTIFACT_TTL_SECONDS", 300)?;

        let cookie_secure = match lookup("COOKIE_SECURE") {
            Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => return Err(ConfigError::Invalid("COOKIE_SECURE")),
            },
            None => app_env.is_production(),
        };

        let valkey_url = lookup("VALKEY_URL").filter(|s| !s.trim().is_empty());

        Ok(Self {
            addr,
            app_env,
            service_name,
            api_base_url,
            auth_login_path,
            request_timeout: Duration::from_millis(request_timeout_ms),
            session_token_ttl: Duration::from_secs(session_token_ttl_seconds),
            pin_artifact_ttl: Duration::from_secs(pin_artifact_ttl_seconds),
            cookie_secure,
            valkey_url,
        })
    }
}

// Missing → default, present but unparsable → Invalid.
fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}
