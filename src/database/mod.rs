// 数据库模块
// 认证核心只使用显式类型的记录：凭据、角色、权限

pub mod models;
pub mod repositories;

#[cfg(test)]
pub mod memory;

pub use models::{Credential, NewAccount, PermissionId, Role, RoleGrant};
pub use repositories::{AccountStore, PgAccountStore};
