//! Persistence and integration seams of the approval engine.
//!
//! `quorum-db` provides sqlite and in-memory implementations of the
//! repositories; hooks and notifiers live in this crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::directory::{GroupDirectory, GroupId, ProfileId, RoleName};
use crate::domain::job::Job;
use crate::domain::order::{Order, OrderId};
use crate::domain::quota::{QuotaSet, ResourceUsage};
use crate::errors::ApprovalError;
use crate::ledger::{ApprovalLedger, ClaimOutcome};

#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, ApprovalError>;
    async fn save(&self, order: Order) -> Result<(), ApprovalError>;
}

#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn find_group_directory(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<GroupDirectory>, ApprovalError>;
}

#[async_trait]
pub trait LedgerRepository: Send + Sync {
    async fn find_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<ApprovalLedger>, ApprovalError>;

    async fn create(&self, ledger: ApprovalLedger) -> Result<(), ApprovalError>;

    /// Atomically fills the entry for `role` unless it is already filled.
    async fn claim(
        &self,
        order_id: &OrderId,
        role: &RoleName,
        approver: &ProfileId,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, ApprovalError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create_jobs(&self, jobs: &[Job]) -> Result<(), ApprovalError>;
    async fn list_for_order(&self, order_id: &OrderId) -> Result<Vec<Job>, ApprovalError>;
}

#[async_trait]
pub trait QuotaRepository: Send + Sync {
    async fn find_for_group(&self, group_id: &GroupId) -> Result<Option<QuotaSet>, ApprovalError>;

    /// Checks `usage` against the group's limits and adds it to `used` as one
    /// atomic step. Negative usage releases capacity. Groups without a quota
    /// set are unlimited and nothing is recorded for them.
    async fn consume(
        &self,
        group_id: &GroupId,
        usage: &ResourceUsage,
    ) -> Result<(), ApprovalError>;
}
