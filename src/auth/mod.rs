// 认证核心：密码加解密、权限聚合、身份令牌

pub mod cipher;
pub mod credential;
pub mod deadline;
pub mod permission;
pub mod token;

pub use cipher::{CredentialCipher, CredentialKeyring};
pub use credential::{AuthService, VerifiedSubject};
pub use deadline::Deadline;
pub use permission::{PermissionAggregator, RolePermissions};
pub use token::{Claims, IssuedToken, TokenIssuer};
