use serde::Serialize;
use sqlx::FromRow;

pub type PermissionId = i64;

/// 用户凭据，密码以密文形式保存
#[derive(Debug, Clone, FromRow)]
pub struct Credential {
    pub id: i64,
    pub username: String,
    pub password_cipher: String,
    /// 加密时使用的密钥版本
    pub password_key_version: i16,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub role_key: String,
    pub name: String,
}

/// 用户 → 角色 → 权限 连接查询的一行，角色没有权限时 permission_id 为空
#[derive(Debug, Clone, FromRow)]
pub struct RoleGrant {
    pub role_id: i64,
    pub role_key: String,
    pub permission_id: Option<PermissionId>,
}

/// 新建账号，密码已经加密
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub username: String,
    pub password_cipher: String,
    pub password_key_version: i16,
    pub role_key: String,
}
