/// 缓存键模块
/// 提供各种缓存键生成函数
pub mod qr_keys;

pub use qr_keys::{qr_event_channel, qr_session_key, rate_limit_key};
