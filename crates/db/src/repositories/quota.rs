use quorum_core::approvals::ports::QuotaRepository;
use quorum_core::domain::directory::GroupId;
use quorum_core::domain::quota::{QuotaSet, ResourceLimits, ResourceUsage};
use quorum_core::errors::{ApprovalError, QuotaError};
use sqlx::sqlite::SqliteRow;

use super::{column, RepositoryError};
use crate::DbPool;

const CONSUME_ATTEMPTS: usize = 5;

pub struct SqlQuotaRepository {
    pool: DbPool,
}

impl SqlQuotaRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn load(&self, group_id: &GroupId) -> Result<Option<QuotaSet>, RepositoryError> {
        let row = sqlx::query("SELECT limits_json, used_json FROM quota_sets WHERE group_id = ?")
            .bind(&group_id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| row_to_quota(group_id, &row).map(|(quota, _)| quota)).transpose()
    }

    /// Check-and-increment as a compare-and-set on the stored usage document.
    /// A concurrent writer makes the update miss, and the check is redone
    /// against the fresh row.
    pub async fn consume_usage(
        &self,
        group_id: &GroupId,
        usage: &ResourceUsage,
    ) -> Result<Result<(), QuotaError>, RepositoryError> {
        for _ in 0..CONSUME_ATTEMPTS {
            let row =
                sqlx::query("SELECT limits_json, used_json FROM quota_sets WHERE group_id = ?")
                    .bind(&group_id.0)
                    .fetch_optional(&self.pool)
                    .await?;
            let Some(row) = row else {
                return Ok(Ok(()));
            };

            let (mut quota, used_raw) = row_to_quota(group_id, &row)?;
            if let Err(error) = quota.consume(usage) {
                return Ok(Err(error));
            }

            let updated = sqlx::query(
                "UPDATE quota_sets SET used_json = ? WHERE group_id = ? AND used_json = ?",
            )
            .bind(serde_json::to_string(&quota.used)?)
            .bind(&group_id.0)
            .bind(&used_raw)
            .execute(&self.pool)
            .await?;
            if updated.rows_affected() == 1 {
                return Ok(Ok(()));
            }
        }

        Err(RepositoryError::Conflict(format!("quota usage for group `{group_id}` kept changing")))
    }

    pub async fn save(&self, quota: &QuotaSet) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO quota_sets (group_id, limits_json, used_json) VALUES (?, ?, ?)
             ON CONFLICT(group_id) DO UPDATE SET
                 limits_json = excluded.limits_json,
                 used_json = excluded.used_json",
        )
        .bind(&quota.group_id.0)
        .bind(serde_json::to_string(&quota.limits)?)
        .bind(serde_json::to_string(&quota.used)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// The decoded quota plus the raw usage document it was read from.
fn row_to_quota(
    group_id: &GroupId,
    row: &SqliteRow,
) -> Result<(QuotaSet, String), RepositoryError> {
    let limits: String = column(row, "limits_json")?;
    let used: String = column(row, "used_json")?;
    let quota = QuotaSet {
        group_id: group_id.clone(),
        limits: serde_json::from_str::<ResourceLimits>(&limits)?,
        used: serde_json::from_str::<ResourceUsage>(&used)?,
    };
    Ok((quota, used))
}

#[async_trait::async_trait]
impl QuotaRepository for SqlQuotaRepository {
    async fn find_for_group(&self, group_id: &GroupId) -> Result<Option<QuotaSet>, ApprovalError> {
        Ok(self.load(group_id).await?)
    }

    async fn consume(
        &self,
        group_id: &GroupId,
        usage: &ResourceUsage,
    ) -> Result<(), ApprovalError> {
        Ok(self.consume_usage(group_id, usage).await??)
    }
}
