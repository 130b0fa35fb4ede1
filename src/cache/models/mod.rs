/// 缓存数据模型
pub mod qr_session;

pub use qr_session::CachedQrSession;
