use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct CreateQrSessionResponse {
    pub token: String,
    /// base64 编码的二维码图片
    pub image: String,
}

#[derive(Debug, Serialize)]
pub struct QrSessionStateResponse {
    pub state: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQrSessionRequest {
    pub state: i32,
}

#[derive(Debug, Serialize)]
pub struct ConfirmQrSessionResponse {
    pub token: String,
    pub expires_at: i64,
}
