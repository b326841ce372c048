use std::collections::BTreeSet;

use crate::domain::directory::{
    GroupDirectory, GroupRoleMembership, Permission, ProfileId, RoleName,
};

pub const DEFAULT_GENERIC_APPROVER_ROLE: &str = "approver";

/// Resolves which approval roles a group requires and which of them a
/// profile holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QuorumResolver {
    generic_role: RoleName,
    approve_permission: Permission,
}

impl Default for QuorumResolver {
    fn default() -> Self {
        Self::new(RoleName::new(DEFAULT_GENERIC_APPROVER_ROLE), Permission::order_approve())
    }
}

impl QuorumResolver {
    pub fn new(generic_role: RoleName, approve_permission: Permission) -> Self {
        Self { generic_role, approve_permission }
    }

    pub fn generic_role(&self) -> &RoleName {
        &self.generic_role
    }

    fn confers_approval(&self, directory: &GroupDirectory, role: &RoleName) -> bool {
        directory.role(role).is_some_and(|role| role.grants(&self.approve_permission))
    }

    /// Memberships `profile` holds on the group that confer approval. The
    /// generic approver membership is dropped when the profile holds more than
    /// one such membership.
    pub fn approving_memberships(
        &self,
        profile: &ProfileId,
        directory: &GroupDirectory,
    ) -> BTreeSet<GroupRoleMembership> {
        let held: BTreeSet<GroupRoleMembership> = directory
            .memberships_of(profile)
            .filter(|membership| self.confers_approval(directory, &membership.role))
            .cloned()
            .collect();

        if held.len() > 1 {
            return held.into_iter().filter(|m| m.role != self.generic_role).collect();
        }
        held
    }

    pub fn holds_approve_permission(&self, profile: &ProfileId, directory: &GroupDirectory) -> bool {
        !self.approving_memberships(profile, directory).is_empty()
    }

    /// The quorum: every role that must sign off on the group's orders.
    pub fn required_roles(&self, directory: &GroupDirectory) -> BTreeSet<RoleName> {
        if let Some(quorum) = &directory.group.quorum {
            return quorum.iter().cloned().collect();
        }

        let granted: BTreeSet<RoleName> = directory
            .memberships
            .iter()
            .filter(|m| m.group_id == directory.group.id)
            .filter(|m| self.confers_approval(directory, &m.role))
            .map(|m| m.role.clone())
            .collect();

        if granted.len() > 1 {
            return granted.into_iter().filter(|role| role != &self.generic_role).collect();
        }
        granted
    }

    pub fn is_multilevel(&self, required: &BTreeSet<RoleName>) -> bool {
        required.iter().any(|role| role != &self.generic_role)
    }

    /// True when `profile` alone covers every required role.
    pub fn has_all_approver_roles(&self, profile: &ProfileId, directory: &GroupDirectory) -> bool {
        let required = self.required_roles(directory);
        if required.is_empty() {
            return false;
        }

        let owned: BTreeSet<RoleName> = self
            .approving_memberships(profile, directory)
            .into_iter()
            .map(|membership| membership.role)
            .collect();
        required.is_subset(&owned)
    }
}
