use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::debug;

use quorum_core::approvals::ports::LedgerRepository;
use quorum_core::domain::directory::{ProfileId, RoleName};
use quorum_core::domain::order::OrderId;
use quorum_core::errors::ApprovalError;
use quorum_core::ledger::{ApprovalLedger, ClaimOutcome, LedgerEntry};

use super::{column, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlLedgerRepository {
    pool: DbPool,
}

impl SqlLedgerRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn load(&self, order_id: &OrderId) -> Result<Option<ApprovalLedger>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT role_name, approver_id, approved_at FROM approval_ledger_entry
             WHERE order_id = ? ORDER BY role_name",
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut entries = BTreeMap::new();
        for row in &rows {
            let role = RoleName::new(column::<String>(row, "role_name")?);
            let approver: Option<String> = column(row, "approver_id")?;
            let approved_at: Option<String> = column(row, "approved_at")?;
            let entry = LedgerEntry {
                role: role.clone(),
                approver: approver.map(ProfileId),
                approved_at: approved_at.as_deref().map(parse_timestamp).transpose()?,
            };
            entries.insert(role, entry);
        }

        Ok(Some(ApprovalLedger { order_id: order_id.clone(), entries }))
    }

    /// Inserts missing entries; existing entries keep their approver.
    pub async fn insert(&self, ledger: &ApprovalLedger) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for entry in ledger.entries.values() {
            sqlx::query(
                "INSERT INTO approval_ledger_entry (order_id, role_name, approver_id, approved_at)
                 VALUES (?, ?, ?, ?)
                 ON CONFLICT(order_id, role_name) DO NOTHING",
            )
            .bind(&ledger.order_id.0)
            .bind(entry.role.as_str())
            .bind(entry.approver.as_ref().map(|p| p.0.clone()))
            .bind(entry.approved_at.map(|dt| dt.to_rfc3339()))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Compare-and-set on an empty entry. Of two concurrent claims for the same
    /// role exactly one reports `Recorded`.
    pub async fn claim_entry(
        &self,
        order_id: &OrderId,
        role: &RoleName,
        approver: &ProfileId,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, RepositoryError> {
        let updated = sqlx::query(
            "UPDATE approval_ledger_entry SET approver_id = ?, approved_at = ?
             WHERE order_id = ? AND role_name = ? AND approver_id IS NULL",
        )
        .bind(&approver.0)
        .bind(at.to_rfc3339())
        .bind(&order_id.0)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(ClaimOutcome::Recorded);
        }

        let existing: Option<Option<String>> = sqlx::query_scalar(
            "SELECT approver_id FROM approval_ledger_entry WHERE order_id = ? AND role_name = ?",
        )
        .bind(&order_id.0)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        match existing {
            Some(Some(by)) => {
                debug!(
                    event_name = "db.ledger.claim_lost",
                    order_id = %order_id,
                    role = %role,
                    "ledger entry already filled"
                );
                Ok(ClaimOutcome::AlreadyApproved { by: ProfileId(by) })
            }
            _ => Ok(ClaimOutcome::NotTracked),
        }
    }
}

#[async_trait::async_trait]
impl LedgerRepository for SqlLedgerRepository {
    async fn find_for_order(
        &self,
        order_id: &OrderId,
    ) -> Result<Option<ApprovalLedger>, ApprovalError> {
        Ok(self.load(order_id).await?)
    }

    async fn create(&self, ledger: ApprovalLedger) -> Result<(), ApprovalError> {
        Ok(self.insert(&ledger).await?)
    }

    async fn claim(
        &self,
        order_id: &OrderId,
        role: &RoleName,
        approver: &ProfileId,
        at: DateTime<Utc>,
    ) -> Result<ClaimOutcome, ApprovalError> {
        Ok(self.claim_entry(order_id, role, approver, at).await?)
    }
}
