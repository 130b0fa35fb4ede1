use serde::Serialize;

/// 扫码登录会话状态，数值即对外的状态码
///
/// 状态码 0（失败/过期）不对应任何存储记录，由记录缺失隐式表示。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(into = "i32")]
pub enum QrState {
    PendingScan = 1,
    Scanned = 2,
    Authorizing = 3,
    Cancelled = 4,
    Confirmed = 5,
}

/// 会话不存在时对轮询端报告的状态码
pub const EXPIRED_CODE: i32 = 0;

impl QrState {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(QrState::PendingScan),
            2 => Some(QrState::Scanned),
            3 => Some(QrState::Authorizing),
            4 => Some(QrState::Cancelled),
            5 => Some(QrState::Confirmed),
            _ => None,
        }
    }

    /// 扫码端可以直接写入的目标状态
    pub fn is_update_target(self) -> bool {
        matches!(
            self,
            QrState::Scanned | QrState::Authorizing | QrState::Cancelled
        )
    }
}

impl From<QrState> for i32 {
    fn from(state: QrState) -> Self {
        state.code()
    }
}
