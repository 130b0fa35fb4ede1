use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};
use tokio::time::Instant;

use crate::cache::keys::qr_session_key;
use crate::cache::models::CachedQrSession;
use crate::error::{AuthError, AuthResult};
use crate::utils::token_prefix;

/// 扫码会话的租约存储：一个会话令牌对应一条小记录
///
/// 没有比较并交换，后写覆盖先写；过期的记录与从未创建的记录不可区分。
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, token: &str) -> AuthResult<Option<CachedQrSession>>;

    /// 写入记录并把租约重置为 `ttl`
    async fn put(&self, token: &str, record: &CachedQrSession, ttl: Duration) -> AuthResult<()>;
}

/// Redis 实现，`SET key value EX ttl`
#[derive(Clone)]
pub struct RedisSessionStore {
    redis: Arc<RedisClient>,
}

impl RedisSessionStore {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn get(&self, token: &str) -> AuthResult<Option<CachedQrSession>> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let result: Option<String> = conn.get(qr_session_key(token)).await?;
        match result {
            Some(json) => match serde_json::from_str(&json) {
                Ok(record) => Ok(Some(record)),
                Err(e) => {
                    // 无法解析的记录按不存在处理
                    tracing::warn!(
                        "discarding unreadable qr session {}: {}",
                        token_prefix(token),
                        e
                    );
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn put(&self, token: &str, record: &CachedQrSession, ttl: Duration) -> AuthResult<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let json = serde_json::to_string(record).map_err(|e| {
            tracing::error!("failed to serialize qr session: {}", e);
            AuthError::DownstreamUnavailable
        })?;
        let _: () = conn
            .set_ex(qr_session_key(token), json, ttl.as_secs().max(1))
            .await?;

        Ok(())
    }
}

/// 进程内实现，用于单节点部署和开发环境
#[derive(Default)]
pub struct MemorySessionStore {
    entries: Mutex<HashMap<String, (CachedQrSession, Instant)>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清理已过期的记录
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        before - entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, token: &str) -> AuthResult<Option<CachedQrSession>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(token) {
            Some((record, expires_at)) if *expires_at > now => Ok(Some(record.clone())),
            Some(_) => {
                entries.remove(token);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, token: &str, record: &CachedQrSession, ttl: Duration) -> AuthResult<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(token.to_owned(), (record.clone(), expires_at));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: i32) -> CachedQrSession {
        CachedQrSession { state, token: None }
    }

    #[tokio::test(start_paused = true)]
    async fn record_disappears_after_lease() {
        let store = MemorySessionStore::new();
        store.put("t", &record(1), Duration::from_secs(300)).await.unwrap();

        tokio::time::advance(Duration::from_secs(299)).await;
        assert_eq!(store.get("t").await.unwrap(), Some(record(1)));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get("t").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn put_overwrites_and_renews() {
        let store = MemorySessionStore::new();
        store.put("t", &record(1), Duration::from_secs(300)).await.unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;
        store.put("t", &record(2), Duration::from_secs(300)).await.unwrap();
        tokio::time::advance(Duration::from_secs(200)).await;

        assert_eq!(store.get("t").await.unwrap(), Some(record(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_drops_only_expired() {
        let store = MemorySessionStore::new();
        store.put("old", &record(1), Duration::from_secs(10)).await.unwrap();
        store.put("new", &record(1), Duration::from_secs(300)).await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.purge_expired(), 1);
        assert!(store.get("new").await.unwrap().is_some());
    }

    #[test]
    fn wire_shape_is_state_code_with_optional_token() {
        let json = serde_json::to_string(&record(2)).unwrap();
        assert_eq!(json, r#"{"state":2}"#);
        let confirmed = CachedQrSession {
            state: 5,
            token: Some("jwt".into()),
        };
        let parsed: CachedQrSession =
            serde_json::from_str(&serde_json::to_string(&confirmed).unwrap()).unwrap();
        assert_eq!(parsed, confirmed);
    }
}
