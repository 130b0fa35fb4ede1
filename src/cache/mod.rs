// 缓存模块
// 扫码登录会话的短期存储，记录按租约过期，不做显式删除

pub mod keys;
pub mod models;
pub mod operations;

pub use models::CachedQrSession;
pub use operations::{MemorySessionStore, RedisSessionStore, SessionStore};
