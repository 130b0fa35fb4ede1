use std::sync::Arc;

use async_trait::async_trait;
use redis::{AsyncCommands, Client as RedisClient};

use crate::cache::keys::qr_event_channel;
use crate::error::AuthResult;
use crate::qr_login::QrState;
use crate::utils::token_prefix;

/// 扫码状态变更通知，用于唤醒等待中的轮询端
///
/// 投递失败不影响状态机本身的结果。
#[async_trait]
pub trait SessionNotifier: Send + Sync {
    async fn publish(&self, token: &str, state: QrState) -> AuthResult<()>;
}

/// 只记录日志
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl SessionNotifier for LogNotifier {
    async fn publish(&self, token: &str, state: QrState) -> AuthResult<()> {
        tracing::info!(
            "qr session {} moved to state {}",
            token_prefix(token),
            state.code()
        );
        Ok(())
    }
}

/// `PUBLISH qr:session:events:<token> <state>`
#[derive(Clone)]
pub struct RedisNotifier {
    redis: Arc<RedisClient>,
}

impl RedisNotifier {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }
}

#[async_trait]
impl SessionNotifier for RedisNotifier {
    async fn publish(&self, token: &str, state: QrState) -> AuthResult<()> {
        let mut conn = self.redis.get_multiplexed_async_connection().await?;
        let receivers: i64 = conn.publish(qr_event_channel(token), state.code()).await?;
        tracing::debug!(
            "published state {} for qr session {} to {} receivers",
            state.code(),
            token_prefix(token),
            receivers
        );
        Ok(())
    }
}
