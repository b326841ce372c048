use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use quorum_core::approvals::ports::{
    DirectoryRepository, JobRepository, LedgerRepository, OrderRepository, QuotaRepository,
};
use quorum_core::domain::directory::{GroupDirectory, GroupId, ProfileId, RoleName};
use quorum_core::domain::job::Job;
use quorum_core::domain::order::{Order, OrderId};
use quorum_core::domain::quota::{QuotaSet, ResourceUsage};
use quorum_core::errors::ApprovalError;
use quorum_core::ledger::{ApprovalLedger, ClaimOutcome};

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<String, Order>>,
}

#[async_trait::async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, ApprovalError> {
        let orders = self.orders.read().await;
        Ok(orders.get(&id.0).cloned())
    }

    async fn save(&self, order: Order) -> Result<(), ApprovalError> {
        let mut orders = self.orders.write().await;
        orders.insert(order.id.0.clone(), order);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryDirectoryRepository {
    directories: RwLock<HashMap<String, GroupDirectory>>,
}

impl InMemoryDirectoryRepository {
    pub async fn insert(&self, directory: GroupDirectory) {
        let mut directories = self.directories.write().await;
        directories.insert(directory.group.id.0.clone(), directory);
    }
}

#[async_trait::async_trait]
impl DirectoryRepository for InMemoryDirectoryRepository {
    async fn find_group_directory(
        &self,
        group_id: &GroupId,
    ) -> Result<Option<GroupDirectory>, ApprovalError> {
        let directories = self.directories.read().await;
        Ok(directories.get(&group_id.0).cloned())
    }
}

/// Ledger store whose claims hold the write lock, giving the same
/// compare-and-set behavior as the sqlite repository.
#[derive(Default)]
pub struct InMemoryLedgerRepository {
    ledgers: RwLock<HashMap<String, ApprovalLedger>>,
}

#[async_trait::async_trait]
impl LedgerRepository for InMemoryLedgerRepository {
    async fn find_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<ApprovalLedger>, ApprovalError> {
        let ledgers = self.ledgers.read().await;
        Ok(ledgers.get(&order_id.0).cloned())
    }

    async fn create(&self, ledger: ApprovalLedger) -> Result<(), ApprovalError> {
        let mut ledgers = self.ledgers.write().await;
        let stored = ledgers
            .entry(ledger.order_id.0.clone())
            .or_insert_with(|| ApprovalLedger::new(ledger.order_id.clone(), std::iter::empty()));
        for (role, entry) in ledger.entries {
            stored.entries.entry(role).or_insert(entry);
        }
        Ok(())
    }

    async fn claim(
        &self,
        order_id: &OrderId,
        role: &RoleName,
        approver: &ProfileId,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, ApprovalError> {
        let mut ledgers = self.ledgers.write().await;
        match ledgers.get_mut(&order_id.0) {
            Some(ledger) => Ok(ledger.claim(role, approver, at)),
            None => Ok(ClaimOutcome::NotTracked),
        }
    }
}

#[derive(Default)]
pub struct InMemoryJobRepository {
    jobs: RwLock<Vec<Job>>,
}

#[async_trait::async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create_jobs(&self, jobs: &[Job]) -> Result<(), ApprovalError> {
        let mut stored = self.jobs.write().await;
        stored.extend_from_slice(jobs);
        Ok(())
    }

    async fn list_for_order(&self, order_id: &OrderId) -> Result<Vec<Job>, ApprovalError> {
        let jobs = self.jobs.read().await;
        Ok(jobs.iter().filter(|job| &job.order_id == order_id).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryQuotaRepository {
    quotas: RwLock<HashMap<String, QuotaSet>>,
}

impl InMemoryQuotaRepository {
    pub async fn insert(&self, quota: QuotaSet) {
        let mut quotas = self.quotas.write().await;
        quotas.insert(quota.group_id.0.clone(), quota);
    }
}

#[async_trait::async_trait]
impl QuotaRepository for InMemoryQuotaRepository {
    async fn find_for_group(&self, group_id: &GroupId) -> Result<Option<QuotaSet>, ApprovalError> {
        let quotas = self.quotas.read().await;
        Ok(quotas.get(&group_id.0).cloned())
    }

    async fn consume(
        &self,
        group_id: &GroupId,
        usage: &ResourceUsage,
    ) -> Result<(), ApprovalError> {
        let mut quotas = self.quotas.write().await;
        match quotas.get_mut(&group_id.0) {
            Some(quota) => Ok(quota.consume(usage)?),
            None => Ok(()),
        }
    }
}
