use axum::{
    Router,
    routing::{get, post},
};

use crate::{AppState, middleware::auth_middleware};

pub mod auth;
pub mod qr;

/// 认证服务的全部路由，调用方负责挂载到 API 前缀下
pub fn router(state: AppState) -> Router {
    // 将路由分为公开路由和受保护路由
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login))
        // 扫码登录：Web 端创建与轮询，扫码端推进状态
        .route("/auth/qr/sessions", post(qr::create_session))
        .route(
            "/auth/qr/sessions/{token}",
            get(qr::poll_session).put(qr::update_session),
        );

    let protected_routes = Router::new()
        .route("/auth/check-token", get(auth::check_token))
        .route("/auth/refresh-token", post(auth::refresh_token))
        .route("/auth/rotate-credential", post(auth::rotate_credential))
        .route("/auth/accounts", post(auth::create_account))
        .route(
            "/auth/qr/sessions/{token}/confirm",
            post(qr::confirm_session),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
}
