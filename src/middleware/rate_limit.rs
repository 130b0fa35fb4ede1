use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::{AsyncCommands, Client as RedisClient};

use crate::{
    cache::keys::rate_limit_key,
    config::Config,
    utils::{error_codes, error_to_api_response},
};

/// 按客户端IP计数的固定窗口限流，计数保存在 Redis
#[derive(Clone)]
pub struct RateLimiter {
    redis: Arc<RedisClient>,
    window: Duration,
    max_requests: u32,
    /// 计数请求的等待上限，超时按限流存储不可用处理
    timeout: Duration,
}

/// 客户端IP：优先代理头，其次连接地址
fn client_ip(req: &Request<Body>) -> String {
    let remote_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string());

    req.headers()
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .or_else(|| {
            req.headers()
                .get("x-forwarded-for")
                .and_then(|h| h.to_str().ok())
                .and_then(|s| s.split(',').find(|ip| !ip.trim().is_empty()))
        })
        .or(remote_ip.as_deref())
        .unwrap_or("unknown")
        .trim()
        .to_string()
}

/// 在时限内等待计数结果，失败或超时记录日志并返回 None
async fn bounded<F>(timeout: Duration, fut: F) -> Option<i64>
where
    F: Future<Output = Result<i64, redis::RedisError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(count)) => Some(count),
        Ok(Err(e)) => {
            tracing::warn!("rate limiter unavailable: {}", e);
            None
        }
        Err(_) => {
            tracing::warn!("rate limiter timed out after {:?}", timeout);
            None
        }
    }
}

impl RateLimiter {
    pub fn new(redis: Arc<RedisClient>, config: &Config) -> Self {
        Self {
            redis,
            window: config.rate_limit_window(),
            max_requests: config.rate_limit_requests,
            timeout: config.request_deadline(),
        }
    }

    async fn hit(&self, ip: &str) -> Result<i64, redis::RedisError> {
        let key = rate_limit_key(ip);
        let mut conn = self.redis.get_multiplexed_async_connection().await?;

        let count: i64 = conn.incr(&key, 1).await?;
        if count == 1 {
            // 窗口内第一次请求时设置过期时间
            let _: () = conn.expire(&key, self.window.as_secs() as i64).await?;
        }
        Ok(count)
    }

    pub async fn check_rate_limit(&self, req: Request<Body>, next: Next) -> Response {
        let ip = client_ip(&req);

        // 限流存储不可用或超时时放行，不影响登录
        let count = bounded(self.timeout, self.hit(&ip)).await;
        if count.is_some_and(|c| c > self.max_requests as i64) {
            tracing::warn!("rate limit exceeded for {}", ip);
            return (
                StatusCode::TOO_MANY_REQUESTS,
                error_to_api_response::<()>(
                    error_codes::RATE_LIMIT,
                    format!("请求过于频繁，请在{}秒后重试", self.window.as_secs()),
                ),
            )
                .into_response();
        }

        next.run(req).await
    }
}

pub async fn rate_limit(
    State(limiter): State<Arc<RateLimiter>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    limiter.check_rate_limit(req, next).await
}
