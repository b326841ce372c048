use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;

use quorum_core::audit::{AuditEvent, AuditOutcome, AuditSink};
use quorum_core::domain::order::OrderId;
use quorum_core::errors::ApprovalError;

use super::{column, parse_timestamp, RepositoryError};
use crate::DbPool;

/// Order history backed by the `order_history` table.
pub struct SqlOrderHistory {
    pool: DbPool,
}

impl SqlOrderHistory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn append(&self, event: &AuditEvent) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO order_history (id, order_id, correlation_id, event_type, actor, outcome,
                                        message, metadata_json, occurred_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.event_id)
        .bind(&event.order_id.0)
        .bind(&event.correlation_id)
        .bind(&event.event_type)
        .bind(&event.actor)
        .bind(event.outcome.as_str())
        .bind(&event.message)
        .bind(serde_json::to_string(&event.metadata)?)
        .bind(event.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn list(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, order_id, correlation_id, event_type, actor, outcome, message,
                    metadata_json, occurred_at
             FROM order_history WHERE order_id = ? ORDER BY occurred_at ASC, rowid ASC",
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_event).collect()
    }
}

fn row_to_event(row: &SqliteRow) -> Result<AuditEvent, RepositoryError> {
    let outcome_raw: String = column(row, "outcome")?;
    let metadata: String = column(row, "metadata_json")?;
    let occurred_at: String = column(row, "occurred_at")?;

    Ok(AuditEvent {
        event_id: column(row, "id")?,
        order_id: OrderId(column(row, "order_id")?),
        correlation_id: column(row, "correlation_id")?,
        event_type: column(row, "event_type")?,
        actor: column(row, "actor")?,
        outcome: AuditOutcome::parse(&outcome_raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown outcome `{outcome_raw}`")))?,
        message: column(row, "message")?,
        metadata: serde_json::from_str::<BTreeMap<String, String>>(&metadata)?,
        occurred_at: parse_timestamp(&occurred_at)?,
    })
}

#[async_trait::async_trait]
impl AuditSink for SqlOrderHistory {
    async fn emit(&self, event: AuditEvent) -> Result<(), ApprovalError> {
        Ok(self.append(&event).await?)
    }

    async fn history(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>, ApprovalError> {
        Ok(self.list(order_id).await?)
    }
}
