use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{AuthError, AuthResult};

/// 身份令牌载荷，只包含用户ID和用户名，权限随登录响应单独返回
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 用户ID
    pub username: String,
    pub iat: i64, // 签发时间
    pub exp: i64, // 过期时间
}

impl Claims {
    pub fn subject_id(&self) -> AuthResult<i64> {
        self.sub.parse().map_err(|_| AuthError::Unauthorized)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: i64,
}

pub fn issue_token(
    subject_id: i64,
    username: &str,
    secret: &str,
    lifetime_secs: i64,
) -> AuthResult<IssuedToken> {
    if secret.is_empty() {
        tracing::error!("refusing to sign token: empty secret");
        return Err(AuthError::Signing);
    }
    if lifetime_secs <= 0 {
        tracing::error!("refusing to sign token: lifetime {}s", lifetime_secs);
        return Err(AuthError::Signing);
    }

    let now = Utc::now().timestamp();
    let expires_at = now.checked_add(lifetime_secs).ok_or(AuthError::Signing)?;
    let claims = Claims {
        sub: subject_id.to_string(),
        username: username.to_owned(),
        iat: now,
        exp: expires_at,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!("failed to sign token: {}", e);
        AuthError::Signing
    })?;

    Ok(IssuedToken { token, expires_at })
}

pub fn verify_token(token: &str, secret: &str) -> AuthResult<Claims> {
    if secret.is_empty() {
        return Err(AuthError::Signing);
    }
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("rejected token: {}", e);
        AuthError::Unauthorized
    })
}

/// 持有签名密钥和有效期的令牌签发器
#[derive(Clone)]
pub struct TokenIssuer {
    secret: String,
    lifetime_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: impl Into<String>, lifetime_secs: i64) -> Self {
        Self {
            secret: secret.into(),
            lifetime_secs,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.jwt_secret.clone(), config.jwt_expiration_secs)
    }

    pub fn issue(&self, subject_id: i64, username: &str) -> AuthResult<IssuedToken> {
        issue_token(subject_id, username, &self.secret, self.lifetime_secs)
    }

    pub fn verify(&self, token: &str) -> AuthResult<Claims> {
        verify_token(token, &self.secret)
    }
}
