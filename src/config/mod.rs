use std::collections::BTreeMap;
use std::env;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose};

/// 配置加载错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// 会话存储后端
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStoreKind {
    Redis,
    Memory,
}

/// 扫码状态变更通知方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifierKind {
    Log,
    Redis,
}

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_secs: i64,
    /// 密码加密密钥，按版本号索引，每个 32 字节
    pub credential_keys: BTreeMap<u16, [u8; 32]>,
    pub credential_key_version: u16,
    pub qr_session_ttl_secs: u64,
    pub qr_provider_url: String,
    pub qr_provider_timeout_ms: u64,
    pub request_deadline_ms: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_requests: u32,
    pub session_store: SessionStoreKind,
    pub notifier: NotifierKind,
    pub server_host: String,
    pub server_port: u16,
    pub api_base_uri: String,
}

// 密钥和签名密钥不进入日志
impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field(
                "credential_key_versions",
                &self.credential_keys.keys().collect::<Vec<_>>(),
            )
            .field("credential_key_version", &self.credential_key_version)
            .field("qr_session_ttl_secs", &self.qr_session_ttl_secs)
            .field("qr_provider_url", &self.qr_provider_url)
            .field("session_store", &self.session_store)
            .field("notifier", &self.notifier)
            .field("server_host", &self.server_host)
            .field("server_port", &self.server_port)
            .field("api_base_uri", &self.api_base_uri)
            .finish_non_exhaustive()
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::Missing(name))
}

fn optional<T: std::str::FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("cannot parse {:?}", raw),
        }),
        Err(_) => Ok(default),
    }
}

/// 解析 `version:base64key` 逗号分隔的密钥列表
pub fn parse_credential_keys(raw: &str) -> Result<BTreeMap<u16, [u8; 32]>, ConfigError> {
    let invalid = |reason: String| ConfigError::Invalid {
        name: "CREDENTIAL_KEYS",
        reason,
    };

    let mut keys = BTreeMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (version, encoded) = entry
            .split_once(':')
            .ok_or_else(|| invalid("expected version:base64key".into()))?;
        let version = version
            .trim()
            .parse::<u16>()
            .map_err(|_| invalid(format!("bad key version {:?}", version)))?;
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|_| invalid(format!("key version {} is not base64", version)))?;
        let key: [u8; 32] = bytes
            .try_into()
            .map_err(|_| invalid(format!("key version {} must be 32 bytes", version)))?;
        if keys.insert(version, key).is_some() {
            return Err(invalid(format!("duplicate key version {}", version)));
        }
    }

    if keys.is_empty() {
        return Err(invalid("no keys configured".into()));
    }
    Ok(keys)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let jwt_expiration = env::var("JWT_EXPIRATION")
            .ok()
            .and_then(|v| v.trim().trim_end_matches('h').parse::<i64>().ok())
            .unwrap_or(24);

        let credential_keys = parse_credential_keys(&required("CREDENTIAL_KEYS")?)?;
        let newest = credential_keys.keys().next_back().copied().unwrap_or_default();
        let credential_key_version = optional("CREDENTIAL_KEY_VERSION", newest)?;
        if !credential_keys.contains_key(&credential_key_version) {
            return Err(ConfigError::Invalid {
                name: "CREDENTIAL_KEY_VERSION",
                reason: format!("version {} not present in CREDENTIAL_KEYS", credential_key_version),
            });
        }

        let session_store = match env::var("SESSION_STORE").as_deref() {
            Ok("memory") => SessionStoreKind::Memory,
            Ok("redis") | Err(_) => SessionStoreKind::Redis,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    name: "SESSION_STORE",
                    reason: format!("unknown backend {:?}", other),
                });
            }
        };
        let notifier = match env::var("QR_NOTIFY").as_deref() {
            Ok("redis") => NotifierKind::Redis,
            Ok("log") | Err(_) => NotifierKind::Log,
            Ok(other) => {
                return Err(ConfigError::Invalid {
                    name: "QR_NOTIFY",
                    reason: format!("unknown notifier {:?}", other),
                });
            }
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            redis_url: required("REDIS_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiration_secs: jwt_expiration * 3600,
            credential_keys,
            credential_key_version,
            qr_session_ttl_secs: optional("QR_SESSION_TTL", 300)?,
            qr_provider_url: env::var("QR_PROVIDER_URL").unwrap_or_default(),
            qr_provider_timeout_ms: optional("QR_PROVIDER_TIMEOUT_MS", 3000)?,
            request_deadline_ms: optional("REQUEST_DEADLINE_MS", 5000)?,
            rate_limit_window_secs: optional("RATE_LIMIT_WINDOW", 60)?,
            rate_limit_requests: optional("RATE_LIMIT_REQUESTS", 100)?,
            session_store,
            notifier,
            server_host: required("SERVER_HOST")?,
            server_port: required("SERVER_PORT")?.parse().unwrap_or(3000),
            api_base_uri: env::var("API_BASE_URI").unwrap_or_else(|_| "/api".into()),
        })
    }

    pub fn qr_session_ttl(&self) -> Duration {
        Duration::from_secs(self.qr_session_ttl_secs)
    }

    pub fn qr_provider_timeout(&self) -> Duration {
        Duration::from_millis(self.qr_provider_timeout_ms)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_millis(self.request_deadline_ms)
    }

    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}
