use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::utils::{error_codes, error_to_api_response};

/// 认证核心对外暴露的错误分类
///
/// 内部错误（数据库、Redis、签名库、加解密细节）在模块边界处记录日志后
/// 转换为以下分类之一，调用方只会看到分类和通用提示。
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// 用户不存在或密码错误，两种情况对调用方不可区分
    #[error("authentication failed")]
    Authentication,
    #[error("malformed credential ciphertext")]
    Crypto,
    #[error("token signing misconfigured")]
    Signing,
    #[error("qr session expired or unknown")]
    SessionExpired,
    #[error("invalid qr session state transition")]
    InvalidStateTransition,
    #[error("downstream service unavailable")]
    DownstreamUnavailable,
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("missing or invalid bearer token")]
    Unauthorized,
    #[error("permission denied")]
    Forbidden,
}

pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    pub fn code(&self) -> i32 {
        match self {
            AuthError::Authentication => error_codes::AUTH_FAILED,
            AuthError::Crypto => error_codes::CRYPTO_ERROR,
            AuthError::Signing => error_codes::SIGNING_ERROR,
            AuthError::SessionExpired => error_codes::SESSION_EXPIRED,
            AuthError::InvalidStateTransition => error_codes::INVALID_STATE,
            AuthError::DownstreamUnavailable => error_codes::DOWNSTREAM_UNAVAILABLE,
            AuthError::Validation(_) => error_codes::VALIDATION_ERROR,
            AuthError::Unauthorized => error_codes::UNAUTHORIZED,
            AuthError::Forbidden => error_codes::PERMISSION_DENIED,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AuthError::Authentication | AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::SessionExpired => StatusCode::NOT_FOUND,
            AuthError::InvalidStateTransition => StatusCode::CONFLICT,
            AuthError::Crypto | AuthError::Signing => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::DownstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn message(&self) -> String {
        match self {
            AuthError::Authentication => "用户名或密码错误".into(),
            AuthError::Crypto => "凭据数据异常".into(),
            AuthError::Signing => "生成令牌失败".into(),
            AuthError::SessionExpired => "二维码已过期，请刷新".into(),
            AuthError::InvalidStateTransition => "二维码状态无效".into(),
            AuthError::DownstreamUnavailable => "服务暂不可用，请稍后重试".into(),
            AuthError::Validation(reason) => reason.clone(),
            AuthError::Unauthorized => "未授权访问".into(),
            AuthError::Forbidden => "权限不足".into(),
        }
    }
}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("relational store error: {}", e);
        AuthError::DownstreamUnavailable
    }
}

impl From<redis::RedisError> for AuthError {
    fn from(e: redis::RedisError) -> Self {
        tracing::error!("session store error: {}", e);
        AuthError::DownstreamUnavailable
    }
}

impl From<tokio::time::error::Elapsed> for AuthError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        tracing::warn!("downstream call exceeded request deadline");
        AuthError::DownstreamUnavailable
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, error_to_api_response::<()>(self.code(), self.message())).into_response()
    }
}
