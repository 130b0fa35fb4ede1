use axum::{
    extract::{Extension, Json, Path, State},
    response::IntoResponse,
};
use base64::{Engine as _, engine::general_purpose};

use crate::{
    AppState,
    auth::Claims,
    error::{AuthError, AuthResult},
    qr_login::EXPIRED_CODE,
    utils::success_to_api_response,
};

use super::model::{
    ConfirmQrSessionResponse, CreateQrSessionResponse, QrSessionStateResponse,
    UpdateQrSessionRequest,
};

#[axum::debug_handler]
pub async fn create_session(State(state): State<AppState>) -> AuthResult<impl IntoResponse> {
    let ticket = state.qr_login.create_session(state.deadline()).await?;

    Ok(success_to_api_response(CreateQrSessionResponse {
        token: ticket.token,
        image: general_purpose::STANDARD.encode(ticket.image),
    }))
}

/// Web 端轮询；会话不存在时返回状态码 0 而不是错误
#[axum::debug_handler]
pub async fn poll_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AuthResult<impl IntoResponse> {
    let response = match state.qr_login.get_session(&token, state.deadline()).await {
        Ok(view) => QrSessionStateResponse {
            state: view.state.code(),
            token: view.token,
        },
        Err(AuthError::SessionExpired) => QrSessionStateResponse {
            state: EXPIRED_CODE,
            token: None,
        },
        Err(e) => return Err(e),
    };

    Ok(success_to_api_response(response))
}

#[axum::debug_handler]
pub async fn update_session(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(req): Json<UpdateQrSessionRequest>,
) -> AuthResult<impl IntoResponse> {
    let current = state
        .qr_login
        .update_session(&token, req.state, state.deadline())
        .await?;

    Ok(success_to_api_response(QrSessionStateResponse {
        state: current.code(),
        token: None,
    }))
}

/// 扫码端用自己的登录身份确认 Web 端登录
#[axum::debug_handler]
pub async fn confirm_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(token): Path<String>,
) -> AuthResult<impl IntoResponse> {
    let issued = state
        .qr_login
        .complete_login(&token, claims.subject_id()?, state.deadline())
        .await?;

    Ok(success_to_api_response(ConfirmQrSessionResponse {
        token: issued.token,
        expires_at: issued.expires_at,
    }))
}
