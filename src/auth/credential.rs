use std::sync::Arc;

use serde::Serialize;

use crate::auth::cipher::{CredentialKeyring, constant_time_eq};
use crate::auth::permission::{PermissionAggregator, RolePermissions};
use crate::auth::token::{IssuedToken, TokenIssuer};
use crate::auth::Deadline;
use crate::database::{AccountStore, Credential, NewAccount, PermissionId};
use crate::error::{AuthError, AuthResult};

/// 密码校验通过的用户
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedSubject {
    pub subject_id: i64,
    pub username: String,
    pub role_key: String,
    pub permission_ids: Vec<PermissionId>,
}

/// 凭据校验、令牌签发与账号凭据维护
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AccountStore>,
    keyring: Arc<CredentialKeyring>,
    permissions: PermissionAggregator,
    issuer: TokenIssuer,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AccountStore>,
        keyring: Arc<CredentialKeyring>,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            permissions: PermissionAggregator::new(store.clone()),
            store,
            keyring,
            issuer,
        }
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    fn decrypt_stored(&self, credential: &Credential) -> AuthResult<String> {
        let version = u16::try_from(credential.password_key_version).map_err(|_| AuthError::Crypto)?;
        self.keyring.decrypt(version, &credential.password_cipher)
    }

    pub async fn verify_credential(
        &self,
        username: &str,
        password: &str,
        deadline: Deadline,
    ) -> AuthResult<VerifiedSubject> {
        let Some(credential) = deadline.run(self.store.find_by_username(username)).await? else {
            // 与密码错误走同样的解密和比较，避免通过耗时区分用户是否存在
            self.keyring.compare_decoy(password);
            tracing::debug!("login rejected: unknown username");
            return Err(AuthError::Authentication);
        };

        // 密文损坏对调用方同样表现为认证失败
        let stored = self.decrypt_stored(&credential).map_err(|_| {
            tracing::error!("stored credential for subject {} cannot be decrypted", credential.id);
            AuthError::Authentication
        })?;
        if !constant_time_eq(stored.as_bytes(), password.as_bytes()) {
            tracing::debug!("login rejected: wrong password for subject {}", credential.id);
            return Err(AuthError::Authentication);
        }

        let resolved = self.permissions.resolve(credential.id, deadline).await?;
        tracing::info!("subject {} authenticated", credential.id);

        Ok(VerifiedSubject {
            subject_id: credential.id,
            username: credential.username,
            role_key: resolved.role_key,
            permission_ids: resolved.permission_ids,
        })
    }

    pub async fn resolve_permissions(
        &self,
        subject_id: i64,
        deadline: Deadline,
    ) -> AuthResult<RolePermissions> {
        self.permissions.resolve(subject_id, deadline).await
    }

    pub fn issue_token(&self, subject_id: i64, username: &str) -> AuthResult<IssuedToken> {
        self.issuer.issue(subject_id, username)
    }

    pub async fn find_subject(&self, subject_id: i64, deadline: Deadline) -> AuthResult<Option<Credential>> {
        deadline.run(self.store.find_by_id(subject_id)).await
    }

    pub async fn create_account(
        &self,
        username: &str,
        password: &str,
        role_key: &str,
        deadline: Deadline,
    ) -> AuthResult<i64> {
        let username = username.trim();
        if username.is_empty() || username.len() > 64 {
            return Err(AuthError::Validation("用户名长度必须在1到64个字符之间".into()));
        }
        if password.chars().count() < 6 || password.chars().count() > 64 {
            return Err(AuthError::Validation("密码长度必须在6到64个字符之间".into()));
        }

        let (version, password_cipher) = self.keyring.encrypt(password);
        let account = NewAccount {
            username: username.to_owned(),
            password_cipher,
            password_key_version: i16::try_from(version).map_err(|_| AuthError::Crypto)?,
            role_key: role_key.to_owned(),
        };
        deadline.run(self.store.create_account(&account)).await
    }

    /// 用当前密钥版本重新加密用户密码，已经是当前版本时不做任何修改
    pub async fn rotate_credential(&self, subject_id: i64, deadline: Deadline) -> AuthResult<bool> {
        let credential = self
            .find_subject(subject_id, deadline)
            .await?
            .ok_or(AuthError::Unauthorized)?;

        let current = self.keyring.current_version();
        if u16::try_from(credential.password_key_version).ok() == Some(current) {
            return Ok(false);
        }

        let plaintext = self.decrypt_stored(&credential)?;
        let (version, new_cipher) = self.keyring.encrypt(&plaintext);
        let version = i16::try_from(version).map_err(|_| AuthError::Crypto)?;

        let replaced = deadline
            .run(self.store.replace_credential(
                subject_id,
                &credential.password_cipher,
                &new_cipher,
                version,
            ))
            .await?;
        if replaced {
            tracing::info!(
                "rotated credential of subject {} from key v{} to v{}",
                subject_id,
                credential.password_key_version,
                version
            );
        } else {
            tracing::warn!("credential of subject {} changed during rotation", subject_id);
        }
        Ok(replaced)
    }
}
