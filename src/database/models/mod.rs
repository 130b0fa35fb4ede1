/// 数据库实体定义
pub mod account;

pub use account::{Credential, NewAccount, PermissionId, Role, RoleGrant};
