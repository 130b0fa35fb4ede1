use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::error::{AuthError, AuthResult};

/// 调用方提供的截止时间，所有外部调用（数据库、Redis、二维码服务）都受其约束
#[derive(Debug, Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self(Instant::now() + budget)
    }

    pub fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub fn instant(&self) -> Instant {
        self.0
    }

    /// 在截止时间内执行外部调用，超时视为下游不可用
    pub async fn run<F, T, E>(&self, fut: F) -> AuthResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<AuthError>,
    {
        tokio::time::timeout_at(self.0, fut).await?.map_err(Into::into)
    }
}
