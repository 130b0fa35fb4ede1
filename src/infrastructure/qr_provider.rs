use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::AuthError;

/// 二维码服务调用失败
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("qr provider url not configured")]
    NotConfigured,
    #[error("qr provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("qr provider returned status {0}")]
    Status(u16),
    #[error("qr provider returned an empty image")]
    Empty,
}

impl From<ProvisionError> for AuthError {
    fn from(e: ProvisionError) -> Self {
        tracing::error!("qr code provisioning failed: {}", e);
        AuthError::DownstreamUnavailable
    }
}

/// 第三方二维码生成服务，把场景值编码进可扫描的图片
#[async_trait]
pub trait QrCodeProvider: Send + Sync {
    async fn provision(&self, scene: &str) -> Result<Vec<u8>, ProvisionError>;
}

#[derive(Serialize)]
struct ProvisionRequest<'a> {
    scene: &'a str,
}

/// 通过 HTTP 调用二维码服务，返回图片原始字节
#[derive(Clone)]
pub struct HttpQrCodeProvider {
    client: reqwest::Client,
    url: String,
}

impl HttpQrCodeProvider {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ProvisionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl QrCodeProvider for HttpQrCodeProvider {
    async fn provision(&self, scene: &str) -> Result<Vec<u8>, ProvisionError> {
        if self.url.is_empty() {
            return Err(ProvisionError::NotConfigured);
        }

        let response = self
            .client
            .post(&self.url)
            .json(&ProvisionRequest { scene })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::Status(status.as_u16()));
        }

        let image = response.bytes().await?;
        if image.is_empty() {
            return Err(ProvisionError::Empty);
        }
        Ok(image.to_vec())
    }
}
