// 扫码登录：Web 端创建并轮询会话，扫码端推进会话状态

pub mod service;
pub mod state;

pub use service::{QrLoginService, QrSessionTicket, QrSessionView};
pub use state::{EXPIRED_CODE, QrState};
