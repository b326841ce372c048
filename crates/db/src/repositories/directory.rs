use std::collections::{BTreeMap, BTreeSet};

use quorum_core::approvals::ports::DirectoryRepository;
use quorum_core::domain::directory::{
    Group, GroupDirectory, GroupId, GroupRoleMembership, Permission, ProfileId, Role, RoleName,
};
use quorum_core::errors::ApprovalError;

use super::{column, RepositoryError};
use crate::DbPool;

pub struct SqlDirectoryRepository {
    pool: DbPool,
}

impl SqlDirectoryRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn load(&self, group_id: &GroupId) -> Result<Option<GroupDirectory>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, allow_auto_approval, quorum_json FROM groups WHERE id = ?",
        )
        .bind(&group_id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let quorum_json: Option<String> = column(&row, "quorum_json")?;
        let quorum = quorum_json
            .as_deref()
            .map(serde_json::from_str::<Vec<String>>)
            .transpose()?
            .map(|roles| roles.into_iter().map(RoleName::new).collect());
        let group = Group {
            id: GroupId(column(&row, "id")?),
            name: column(&row, "name")?,
            allow_auto_approval: column::<i64>(&row, "allow_auto_approval")? != 0,
            quorum,
        };

        let role_rows = sqlx::query(
            "SELECT r.name AS name, r.label AS label, p.permission AS permission
             FROM roles r
             LEFT JOIN role_permissions p ON p.role_name = r.name
             ORDER BY r.name",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut roles: BTreeMap<RoleName, Role> = BTreeMap::new();
        for row in &role_rows {
            let name = RoleName::new(column::<String>(row, "name")?);
            let label: String = column(row, "label")?;
            let permission: Option<String> = column(row, "permission")?;
            let role = roles.entry(name.clone()).or_insert_with(|| Role {
                name,
                label,
                permissions: BTreeSet::new(),
            });
            if let Some(permission) = permission {
                role.permissions.insert(Permission(permission));
            }
        }

        let membership_rows = sqlx::query(
            "SELECT profile_id, group_id, role_name FROM group_role_memberships
             WHERE group_id = ? ORDER BY profile_id, role_name",
        )
        .bind(&group_id.0)
        .fetch_all(&self.pool)
        .await?;

        let memberships = membership_rows
            .iter()
            .map(|row| {
                Ok(GroupRoleMembership {
                    profile_id: ProfileId(column(row, "profile_id")?),
                    group_id: GroupId(column(row, "group_id")?),
                    role: RoleName::new(column::<String>(row, "role_name")?),
                })
            })
            .collect::<Result<Vec<_>, RepositoryError>>()?;

        Ok(Some(GroupDirectory { group, roles, memberships }))
    }

    /// Upserts the group, every role in the catalog and the group's memberships.
    pub async fn save_directory(&self, directory: &GroupDirectory) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let group = &directory.group;
        let quorum_json = group
            .quorum
            .as_ref()
            .map(|roles| {
                serde_json::to_string(&roles.iter().map(RoleName::as_str).collect::<Vec<_>>())
            })
            .transpose()?;

        sqlx::query(
            "INSERT INTO groups (id, name, allow_auto_approval, quorum_json) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 allow_auto_approval = excluded.allow_auto_approval,
                 quorum_json = excluded.quorum_json",
        )
        .bind(&group.id.0)
        .bind(&group.name)
        .bind(i64::from(group.allow_auto_approval))
        .bind(quorum_json)
        .execute(&mut *tx)
        .await?;

        for role in directory.roles.values() {
            sqlx::query(
                "INSERT INTO roles (name, label) VALUES (?, ?)
                 ON CONFLICT(name) DO UPDATE SET label = excluded.label",
            )
            .bind(role.name.as_str())
            .bind(&role.label)
            .execute(&mut *tx)
            .await?;

            sqlx::query("DELETE FROM role_permissions WHERE role_name = ?")
                .bind(role.name.as_str())
                .execute(&mut *tx)
                .await?;
            for permission in &role.permissions {
                sqlx::query("INSERT INTO role_permissions (role_name, permission) VALUES (?, ?)")
                    .bind(role.name.as_str())
                    .bind(permission.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query("DELETE FROM group_role_memberships WHERE group_id = ?")
            .bind(&group.id.0)
            .execute(&mut *tx)
            .await?;
        for membership in &directory.memberships {
            sqlx::query(
                "INSERT INTO group_role_memberships (profile_id, group_id, role_name)
                 VALUES (?, ?, ?)
                 ON CONFLICT DO NOTHING",
            )
            .bind(&membership.profile_id.0)
            .bind(&membership.group_id.0)
            .bind(membership.role.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DirectoryRepository for SqlDirectoryRepository {
    async fn find_group_directory(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<GroupDirectory>, ApprovalError> {
        Ok(self.load(group_id).await?)
    }
}
