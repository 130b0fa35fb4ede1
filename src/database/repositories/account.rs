use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::database::models::{Credential, NewAccount, Role, RoleGrant};
use crate::error::{AuthError, AuthResult};

/// 认证核心依赖的关系库访问接口
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Credential>>;

    async fn find_by_id(&self, subject_id: i64) -> AuthResult<Option<Credential>>;

    /// 用户经由角色可达的全部 (角色, 权限) 行，按角色ID排序
    async fn role_grants(&self, subject_id: i64) -> AuthResult<Vec<RoleGrant>>;

    /// 在同一事务中创建用户并绑定角色，返回新用户ID
    async fn create_account(&self, account: &NewAccount) -> AuthResult<i64>;

    /// 密文仍为 `expected_cipher` 时才替换，返回是否更新
    async fn replace_credential(
        &self,
        subject_id: i64,
        expected_cipher: &str,
        new_cipher: &str,
        key_version: i16,
    ) -> AuthResult<bool>;
}

/// PostgreSQL 实现
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// 建号事务的全部语句；任何错误都由调用方回滚
async fn insert_account(
    tx: &mut Transaction<'_, Postgres>,
    account: &NewAccount,
) -> AuthResult<(i64, Role)> {
    let role = sqlx::query_as::<_, Role>("SELECT id, role_key, name FROM roles WHERE role_key = $1")
        .bind(&account.role_key)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| AuthError::Validation(format!("角色不存在: {}", account.role_key)))?;

    let (user_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO users (username, password_cipher, password_key_version)
        VALUES ($1, $2, $3)
        ON CONFLICT (username) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&account.username)
    .bind(&account.password_cipher)
    .bind(account.password_key_version)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| AuthError::Validation("用户已存在".into()))?;

    sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2)")
        .bind(user_id)
        .bind(role.id)
        .execute(&mut **tx)
        .await?;

    Ok((user_id, role))
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_username(&self, username: &str) -> AuthResult<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            r#"
            SELECT id, username, password_cipher, password_key_version
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn find_by_id(&self, subject_id: i64) -> AuthResult<Option<Credential>> {
        let credential = sqlx::query_as::<_, Credential>(
            r#"
            SELECT id, username, password_cipher, password_key_version
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(subject_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(credential)
    }

    async fn role_grants(&self, subject_id: i64) -> AuthResult<Vec<RoleGrant>> {
        let grants = sqlx::query_as::<_, RoleGrant>(
            r#"
            SELECT r.id AS role_id, r.role_key, rp.permission_id
            FROM user_roles ur
            JOIN roles r ON r.id = ur.role_id
            LEFT JOIN role_permissions rp ON rp.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.id, rp.permission_id
            "#,
        )
        .bind(subject_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(grants)
    }

    async fn create_account(&self, account: &NewAccount) -> AuthResult<i64> {
        let mut tx = self.pool.begin().await?;

        match insert_account(&mut tx, account).await {
            Ok((user_id, role)) => {
                tx.commit().await?;
                tracing::info!("Created account {} with role {}", user_id, role.role_key);
                Ok(user_id)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    tracing::error!("failed to roll back account creation: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn replace_credential(
        &self,
        subject_id: i64,
        expected_cipher: &str,
        new_cipher: &str,
        key_version: i16,
    ) -> AuthResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password_cipher = $1, password_key_version = $2
            WHERE id = $3 AND password_cipher = $4
            "#,
        )
        .bind(new_cipher)
        .bind(key_version)
        .bind(subject_id)
        .bind(expected_cipher)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 需要 TEST_DATABASE_URL 指向可写的 PostgreSQL，未设置时跳过
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        sqlx::raw_sql(include_str!("../../../migrations/0001_auth.sql"))
            .execute(&pool)
            .await
            .ok()?;
        Some(pool)
    }

    fn account(username: &str, role_key: &str) -> NewAccount {
        NewAccount {
            username: username.into(),
            password_cipher: "cipher".into(),
            password_key_version: 1,
            role_key: role_key.into(),
        }
    }

    async fn user_count(pool: &PgPool, username: &str) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE username = $1")
            .bind(username)
            .fetch_one(pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn failed_steps_leave_no_partial_account() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = PgAccountStore::new(pool.clone());

        // 超出 VARCHAR(64)，插入语句本身失败
        let too_long = "x".repeat(100);
        assert!(matches!(
            store.create_account(&account(&too_long, "admin")).await,
            Err(AuthError::DownstreamUnavailable)
        ));
        assert_eq!(user_count(&pool, &too_long).await, 0);

        let name = format!("u{}", uuid::Uuid::new_v4().simple());
        assert!(matches!(
            store.create_account(&account(&name, "no-such-role")).await,
            Err(AuthError::Validation(_))
        ));
        assert_eq!(user_count(&pool, &name).await, 0);

        let id = store.create_account(&account(&name, "admin")).await.unwrap();
        assert!(matches!(
            store.create_account(&account(&name, "admin")).await,
            Err(AuthError::Validation(_))
        ));
        let grants = store.role_grants(id).await.unwrap();
        assert!(grants.iter().all(|g| g.role_key == "admin"));
        assert!(!grants.is_empty());
    }
}
