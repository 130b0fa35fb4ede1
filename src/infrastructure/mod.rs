// 外部协作方：二维码生成服务、扫码状态通知

pub mod notifier;
pub mod qr_provider;

pub use notifier::{LogNotifier, RedisNotifier, SessionNotifier};
pub use qr_provider::{HttpQrCodeProvider, ProvisionError, QrCodeProvider};
