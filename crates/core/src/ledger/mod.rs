//! Per-order approval ledger.
//!
//! A ledger maps every role in an order's approval quorum to the profile that
//! signed off in that role. Entries start empty, are filled at most once, and
//! are never cleared: an order is fully approved once every entry is filled.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::directory::{ProfileId, RoleName};
use crate::domain::order::OrderId;

/// Suffix of blueprint arguments that carry legacy per-role approver IDs.
pub const LEDGER_FIELD_SUFFIX: &str = "_approver_id";

pub fn ledger_field_name(role: &RoleName) -> String {
    format!("{}{LEDGER_FIELD_SUFFIX}", role.as_str())
}

pub fn role_from_ledger_field(field_name: &str) -> Option<RoleName> {
    let base = field_name.trim().strip_suffix(LEDGER_FIELD_SUFFIX)?;
    if base.is_empty() {
        return None;
    }
    Some(RoleName::new(base))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub role: RoleName,
    pub approver: Option<ProfileId>,
    pub approved_at: Option<DateTime<Utc>>,
}

impl LedgerEntry {
    pub fn empty(role: RoleName) -> Self {
        Self { role, approver: None, approved_at: None }
    }

    pub fn is_filled(&self) -> bool {
        self.approver.is_some()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClaimOutcome {
    Recorded,
    AlreadyApproved { by: ProfileId },
    NotTracked,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalLedger {
    pub order_id: OrderId,
    pub entries: BTreeMap<RoleName, LedgerEntry>,
}

impl ApprovalLedger {
    pub fn new(order_id: OrderId, roles: impl IntoIterator<Item = RoleName>) -> Self {
        let entries =
            roles.into_iter().map(|role| (role.clone(), LedgerEntry::empty(role))).collect();
        Self { order_id, entries }
    }

    /// Builds a ledger from `<role>_approver_id` blueprint arguments. Arguments
    /// that already hold a non-empty value are treated as filled entries.
    pub fn from_arguments(
        order_id: OrderId,
        arguments: &BTreeMap<String, serde_json::Value>,
    ) -> Self {
        let mut ledger = Self::new(order_id, std::iter::empty());
        for (name, value) in arguments {
            let Some(role) = role_from_ledger_field(name) else {
                continue;
            };
            let approver = approver_from_value(value);
            let approved_at = approver.as_ref().map(|_| Utc::now());
            ledger.entries.insert(role.clone(), LedgerEntry { role, approver, approved_at });
        }
        ledger
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        !self.entries.is_empty() && self.entries.values().all(LedgerEntry::is_filled)
    }

    pub fn outstanding_roles(&self) -> Vec<RoleName> {
        self.entries.values().filter(|entry| !entry.is_filled()).map(|e| e.role.clone()).collect()
    }

    pub fn approver_for(&self, role: &RoleName) -> Option<&ProfileId> {
        self.entries.get(role).and_then(|entry| entry.approver.as_ref())
    }

    /// Fills `role` for `approver` unless it is already filled.
    pub fn claim(
        &mut self,
        role: &RoleName,
        approver: &ProfileId,
        at: DateTime<Utc>,
    ) -> ClaimOutcome {
        let Some(entry) = self.entries.get_mut(role) else {
            return ClaimOutcome::NotTracked;
        };

        if let Some(existing) = &entry.approver {
            return ClaimOutcome::AlreadyApproved { by: existing.clone() };
        }

        entry.approver = Some(approver.clone());
        entry.approved_at = Some(at);
        ClaimOutcome::Recorded
    }
}

fn approver_from_value(value: &serde_json::Value) -> Option<ProfileId> {
    match value {
        serde_json::Value::String(raw) if !raw.trim().is_empty() => {
            Some(ProfileId(raw.trim().to_string()))
        }
        serde_json::Value::Number(number) if number.as_i64().is_some_and(|id| id != 0) => {
            Some(ProfileId(number.to_string()))
        }
        _ => None,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SingleLevelReason {
    NoOrderItems,
    NoLedger,
}

/// Approval tracking state of an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerView {
    Multilevel { ledger: ApprovalLedger },
    SingleLevel { reason: SingleLevelReason },
}

impl LedgerView {
    pub fn is_multilevel(&self) -> bool {
        matches!(self, Self::Multilevel { .. })
    }

    pub fn ledger(&self) -> Option<&ApprovalLedger> {
        match self {
            Self::Multilevel { ledger } => Some(ledger),
            Self::SingleLevel { .. } => None,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.ledger().is_some_and(ApprovalLedger::is_complete)
    }

    pub fn outstanding_roles(&self) -> Vec<RoleName> {
        self.ledger().map(ApprovalLedger::outstanding_roles).unwrap_or_default()
    }
}

/// Result of recording one profile's approvals against an order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerProgress {
    pub recorded: Vec<RoleName>,
    pub already_approved: Vec<RoleName>,
    pub view: LedgerView,
}
