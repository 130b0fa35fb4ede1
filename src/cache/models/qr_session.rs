use serde::{Deserialize, Serialize};

/// 扫码登录会话缓存数据模型
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CachedQrSession {
    /// 状态码，见 `QrState`
    pub state: i32,
    /// 确认登录后签发给轮询端的身份令牌
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
