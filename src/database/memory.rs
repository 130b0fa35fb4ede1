//! 测试用的内存关系库

use std::sync::Mutex;

use async_trait::async_trait;

use crate::database::models::{Credential, NewAccount, PermissionId, Role, RoleGrant};
use crate::database::repositories::AccountStore;
use crate::error::{AuthError, AuthResult};

#[derive(Default)]
struct Tables {
    users: Vec<Credential>,
    roles: Vec<Role>,
    user_roles: Vec<(i64, i64)>,
    role_permissions: Vec<(i64, PermissionId)>,
}

#[derive(Default)]
pub struct MemoryAccountStore {
    tables: Mutex<Tables>,
    unavailable: Mutex<bool>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_role(&self, id: i64, role_key: &str, permissions: &[PermissionId]) {
        let mut t = self.tables.lock().unwrap();
        t.roles.push(Role {
            id,
            role_key: role_key.into(),
            name: role_key.into(),
        });
        t.role_permissions
            .extend(permissions.iter().map(|p| (id, *p)));
    }

    pub fn add_user(&self, id: i64, username: &str, password_cipher: &str, key_version: i16) {
        self.tables.lock().unwrap().users.push(Credential {
            id,
            username: username.into(),
            password_cipher: password_cipher.into(),
            password_key_version: key_version,
        });
    }

    pub fn assign_role(&self, user_id: i64, role_id: i64) {
        self.tables.lock().unwrap().user_roles.push((user_id, role_id));
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }

    pub fn credential(&self, user_id: i64) -> Option<Credential> {
        self.tables
            .lock()
            .unwrap()
            .users
            .iter()
            .find(|u| u.id == user_id)
            .cloned()
    }

    pub fn role_count(&self, user_id: i64) -> usize {
        self.tables
            .lock()
            .unwrap()
            .user_roles
            .iter()
            .filter(|(u, _)| *u == user_id)
            .count()
    }

    fn check(&self) -> AuthResult<()> {
        if *self.unavailable.lock().unwrap() {
            Err(AuthError::DownstreamUnavailable)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Credential>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        Ok(t.users.iter().find(|u| u.username == username).cloned())
    }

    async fn find_by_id(&self, subject_id: i64) -> AuthResult<Option<Credential>> {
        self.check()?;
        Ok(self.credential(subject_id))
    }

    async fn role_grants(&self, subject_id: i64) -> AuthResult<Vec<RoleGrant>> {
        self.check()?;
        let t = self.tables.lock().unwrap();
        let mut roles: Vec<&Role> = t
            .user_roles
            .iter()
            .filter(|(u, _)| *u == subject_id)
            .filter_map(|(_, r)| t.roles.iter().find(|role| role.id == *r))
            .collect();
        roles.sort_by_key(|r| r.id);

        let mut grants = Vec::new();
        for role in roles {
            let perms: Vec<PermissionId> = t
                .role_permissions
                .iter()
                .filter(|(r, _)| *r == role.id)
                .map(|(_, p)| *p)
                .collect();
            if perms.is_empty() {
                grants.push(RoleGrant {
                    role_id: role.id,
                    role_key: role.role_key.clone(),
                    permission_id: None,
                });
            }
            grants.extend(perms.into_iter().map(|p| RoleGrant {
                role_id: role.id,
                role_key: role.role_key.clone(),
                permission_id: Some(p),
            }));
        }
        Ok(grants)
    }

    async fn create_account(&self, account: &NewAccount) -> AuthResult<i64> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        let role_id = t
            .roles
            .iter()
            .find(|r| r.role_key == account.role_key)
            .map(|r| r.id)
            .ok_or_else(|| AuthError::Validation("角色不存在".into()))?;
        if t.users.iter().any(|u| u.username == account.username) {
            return Err(AuthError::Validation("用户已存在".into()));
        }
        let id = t.users.iter().map(|u| u.id).max().unwrap_or(0) + 1;
        t.users.push(Credential {
            id,
            username: account.username.clone(),
            password_cipher: account.password_cipher.clone(),
            password_key_version: account.password_key_version,
        });
        t.user_roles.push((id, role_id));
        Ok(id)
    }

    async fn replace_credential(
        &self,
        subject_id: i64,
        expected_cipher: &str,
        new_cipher: &str,
        key_version: i16,
    ) -> AuthResult<bool> {
        self.check()?;
        let mut t = self.tables.lock().unwrap();
        match t
            .users
            .iter_mut()
            .find(|u| u.id == subject_id && u.password_cipher == expected_cipher)
        {
            Some(user) => {
                user.password_cipher = new_cipher.into();
                user.password_key_version = key_version;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
