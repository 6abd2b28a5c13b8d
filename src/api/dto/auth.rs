/*
 * Responsibility
 * - /api/auth/ 配下の request/response DTO
 * - validate() は形式チェックのみ (phone/pin の中身は backend が判定)
 */
use serde::{Deserialize, Serialize};

use crate::services::route_guard::Role;
use crate::services::session::SessionUser;

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub phone: String,
    pub pin: String,
}

impl CredentialsRequest {
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.phone.trim().is_empty() {
            return Err("phone is required");
        }
        if self.pin.trim().is_empty() {
            return Err("pin is required");
        }

        Ok(())
    }
}

impl std::fmt::Debug for CredentialsRequest {
    // never print the credentials themselves
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsRequest").finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_masked: Option<String>,
}

impl From<SessionUser> for UserResponse {
    fn from(user: SessionUser) -> Self {
        Self {
            id: user.id,
            role: user.role,
            phone_masked: user.phone_masked,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user: UserResponse,
}
