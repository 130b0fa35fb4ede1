use serde::{Deserialize, Serialize};

use crate::database::PermissionId;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: i64,
    pub username: String,
    pub role_key: String,
    pub permissions: Vec<PermissionId>,
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckTokenResponse {
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenResponse {
    pub token: String,
    pub expires_at: i64,
}

#[derive(Debug, Serialize)]
pub struct RotateCredentialResponse {
    pub rotated: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub username: String,
    pub password: String,
    pub role_key: String,
}

#[derive(Debug, Serialize)]
pub struct CreateAccountResponse {
    pub user_id: i64,
}
