use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProfileId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RoleName(pub String);

impl RoleName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission(pub String);

impl Permission {
    pub const ORDER_APPROVE: &'static str = "order.approve";

    pub fn order_approve() -> Self {
        Self(Self::ORDER_APPROVE.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: RoleName,
    pub label: String,
    pub permissions: BTreeSet<Permission>,
}

impl Role {
    pub fn grants(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    pub allow_auto_approval: bool,
    /// Explicit approval quorum. When unset the quorum is derived from the
    /// group's role memberships.
    pub quorum: Option<Vec<RoleName>>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GroupRoleMembership {
    pub profile_id: ProfileId,
    pub group_id: GroupId,
    pub role: RoleName,
}

impl GroupRoleMembership {
    pub fn new(
        profile_id: impl Into<String>,
        group_id: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            profile_id: ProfileId(profile_id.into()),
            group_id: GroupId(group_id.into()),
            role: RoleName::new(role),
        }
    }
}

/// A group together with the role catalog and memberships scoped to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDirectory {
    pub group: Group,
    pub roles: BTreeMap<RoleName, Role>,
    pub memberships: Vec<GroupRoleMembership>,
}

impl GroupDirectory {
    pub fn role(&self, name: &RoleName) -> Option<&Role> {
        self.roles.get(name)
    }

    pub fn role_label(&self, name: &RoleName) -> String {
        self.role(name).map(|role| role.label.clone()).unwrap_or_else(|| name.0.clone())
    }

    pub fn memberships_of<'a>(
        &'a self,
        profile: &'a ProfileId,
    ) -> impl Iterator<Item = &'a GroupRoleMembership> + 'a {
        self.memberships
            .iter()
            .filter(move |m| &m.profile_id == profile && m.group_id == self.group.id)
    }

    pub fn profiles_holding<'a>(
        &'a self,
        roles: impl IntoIterator<Item = &'a RoleName>,
    ) -> BTreeSet<ProfileId> {
        let roles: BTreeSet<&RoleName> = roles.into_iter().collect();
        self.memberships
            .iter()
            .filter(|m| m.group_id == self.group.id && roles.contains(&m.role))
            .map(|m| m.profile_id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{Permission, Role, RoleName};

    #[test]
    fn role_names_are_normalized() {
        assert_eq!(RoleName::new("  Finance "), RoleName("finance".to_string()));
    }

    #[test]
    fn role_grants_only_listed_permissions() {
        let role = Role {
            name: RoleName::new("finance"),
            label: "Finance".to_string(),
            permissions: [Permission::order_approve()].into_iter().collect(),
        };

        assert!(role.grants(&Permission::order_approve()));
        assert!(!role.grants(&Permission("order.cancel".to_string())));
    }
}
