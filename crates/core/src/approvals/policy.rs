use serde::{Deserialize, Serialize};

use crate::approvals::quorum::QuorumResolver;
use crate::domain::directory::{GroupDirectory, ProfileId};
use crate::ledger::LedgerView;

/// Why an order may or may not skip human approval.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoApproval {
    GroupAllowsAutoApproval,
    SubmitterHoldsAllRoles,
    SubmitterIsApprover,
    NotEligible,
}

impl AutoApproval {
    pub fn approves(&self) -> bool {
        !matches!(self, Self::NotEligible)
    }

    /// Group-level auto-approval skips the multilevel quorum entirely.
    pub fn bypasses_quorum(&self) -> bool {
        matches!(self, Self::GroupAllowsAutoApproval)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GroupAllowsAutoApproval => "group_allows_auto_approval",
            Self::SubmitterHoldsAllRoles => "submitter_holds_all_roles",
            Self::SubmitterIsApprover => "submitter_is_approver",
            Self::NotEligible => "not_eligible",
        }
    }
}

/// First match wins: group flag, then the multilevel quorum, then the
/// submitter's own approval permission.
pub fn decide_auto_approval(
    resolver: &QuorumResolver,
    directory: &GroupDirectory,
    submitter: &ProfileId,
    view: &LedgerView,
) -> AutoApproval {
    if directory.group.allow_auto_approval {
        return AutoApproval::GroupAllowsAutoApproval;
    }

    if view.is_multilevel() {
        if resolver.has_all_approver_roles(submitter, directory) {
            return AutoApproval::SubmitterHoldsAllRoles;
        }
        return AutoApproval::NotEligible;
    }

    if resolver.holds_approve_permission(submitter, directory) {
        return AutoApproval::SubmitterIsApprover;
    }

    AutoApproval::NotEligible
}
