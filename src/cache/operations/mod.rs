/// 缓存操作
pub mod qr_session;

pub use qr_session::{MemorySessionStore, RedisSessionStore, SessionStore};
