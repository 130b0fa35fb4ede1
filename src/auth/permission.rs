use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::auth::Deadline;
use crate::database::{AccountStore, PermissionId, RoleGrant};
use crate::error::AuthResult;

/// 用户的角色和权限集合
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RolePermissions {
    /// 没有角色时为空字符串
    pub role_key: String,
    /// 去重且升序
    pub permission_ids: Vec<PermissionId>,
}

/// 把连接查询的行折叠为 (角色, 权限集合)
///
/// 连接结果已按角色ID排序，角色取第一行。库表约束每个用户只有一个角色，
/// 出现多个角色时权限取并集并记录警告。
pub fn aggregate(subject_id: i64, grants: &[RoleGrant]) -> RolePermissions {
    let role_key = grants
        .first()
        .map(|g| g.role_key.clone())
        .unwrap_or_default();

    let roles: BTreeSet<i64> = grants.iter().map(|g| g.role_id).collect();
    if roles.len() > 1 {
        tracing::warn!(
            "subject {} holds {} roles, using {:?}",
            subject_id,
            roles.len(),
            role_key
        );
    }

    let permission_ids: BTreeSet<PermissionId> =
        grants.iter().filter_map(|g| g.permission_id).collect();

    RolePermissions {
        role_key,
        permission_ids: permission_ids.into_iter().collect(),
    }
}

#[derive(Clone)]
pub struct PermissionAggregator {
    store: Arc<dyn AccountStore>,
}

impl PermissionAggregator {
    pub fn new(store: Arc<dyn AccountStore>) -> Self {
        Self { store }
    }

    pub async fn resolve(&self, subject_id: i64, deadline: Deadline) -> AuthResult<RolePermissions> {
        let grants = deadline.run(self.store.role_grants(subject_id)).await?;
        Ok(aggregate(subject_id, &grants))
    }
}
