use axum::{
    extract::{Extension, Json, State},
    response::IntoResponse,
};

use crate::{
    AppState,
    auth::Claims,
    error::{AuthError, AuthResult},
    utils::success_to_api_response,
};

use super::model::{
    CheckTokenResponse, CreateAccountRequest, CreateAccountResponse, LoginRequest, LoginResponse,
    RefreshTokenResponse, RotateCredentialResponse,
};

/// 可以创建账号的角色
const ADMIN_ROLE_KEY: &str = "admin";

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AuthResult<impl IntoResponse> {
    if req.username.trim().is_empty() || req.password.is_empty() {
        return Err(AuthError::Validation("用户名和密码不能为空".into()));
    }

    let subject = state
        .auth
        .verify_credential(req.username.trim(), &req.password, state.deadline())
        .await?;
    let issued = state.auth.issue_token(subject.subject_id, &subject.username)?;

    Ok(success_to_api_response(LoginResponse {
        user_id: subject.subject_id,
        username: subject.username,
        role_key: subject.role_key,
        permissions: subject.permission_ids,
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

/// 中间件已经校验过令牌，这里直接返回令牌中的身份
#[axum::debug_handler]
pub async fn check_token(Extension(claims): Extension<Claims>) -> impl IntoResponse {
    success_to_api_response(CheckTokenResponse {
        user_id: claims.sub,
        username: claims.username,
    })
}

#[axum::debug_handler]
pub async fn refresh_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AuthResult<impl IntoResponse> {
    let issued = state
        .auth
        .issue_token(claims.subject_id()?, &claims.username)?;

    Ok(success_to_api_response(RefreshTokenResponse {
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}

#[axum::debug_handler]
pub async fn rotate_credential(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> AuthResult<impl IntoResponse> {
    let rotated = state
        .auth
        .rotate_credential(claims.subject_id()?, state.deadline())
        .await?;

    Ok(success_to_api_response(RotateCredentialResponse { rotated }))
}

#[axum::debug_handler]
pub async fn create_account(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateAccountRequest>,
) -> AuthResult<impl IntoResponse> {
    let deadline = state.deadline();
    let caller = state
        .auth
        .resolve_permissions(claims.subject_id()?, deadline)
        .await?;
    if caller.role_key != ADMIN_ROLE_KEY {
        tracing::warn!("subject {} tried to create an account", claims.sub);
        return Err(AuthError::Forbidden);
    }

    let user_id = state
        .auth
        .create_account(&req.username, &req.password, &req.role_key, deadline)
        .await?;

    Ok(success_to_api_response(CreateAccountResponse { user_id }))
}
