use std::time::Duration;

use auth::{AuthService, Deadline};
use qr_login::QrLoginService;

pub mod auth;
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod infrastructure;
pub mod middleware;
pub mod qr_login;
pub mod utils;

pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub auth: AuthService,
    pub qr_login: QrLoginService,
    pub request_deadline: Duration,
}

impl AppState {
    /// 每个请求从进入处理函数开始计算截止时间
    pub fn deadline(&self) -> Deadline {
        Deadline::after(self.request_deadline)
    }
}
