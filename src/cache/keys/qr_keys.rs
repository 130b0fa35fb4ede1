/// 扫码登录会话缓存键前缀
const QR_SESSION_PREFIX: &str = "qr:session:";

/// 扫码状态变更发布频道前缀
const QR_EVENT_PREFIX: &str = "qr:session:events:";

/// 限流计数键前缀
const RATE_LIMIT_PREFIX: &str = "rate_limit:";

/// 生成扫码会话缓存键
pub fn qr_session_key(token: &str) -> String {
    format!("{}{}", QR_SESSION_PREFIX, token)
}

/// 生成扫码状态变更频道名
pub fn qr_event_channel(token: &str) -> String {
    format!("{}{}", QR_EVENT_PREFIX, token)
}

/// 生成客户端IP的限流计数键
pub fn rate_limit_key(ip: &str) -> String {
    format!("{}{}", RATE_LIMIT_PREFIX, ip)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(qr_session_key("abc"), "qr:session:abc");
        assert_eq!(qr_event_channel("abc"), "qr:session:events:abc");
        assert_eq!(rate_limit_key("127.0.0.1"), "rate_limit:127.0.0.1");
    }
}
