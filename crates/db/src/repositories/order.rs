use std::collections::BTreeMap;

use sqlx::sqlite::SqliteRow;

use quorum_core::approvals::ports::OrderRepository;
use quorum_core::domain::directory::{GroupId, ProfileId};
use quorum_core::domain::order::{
    Order, OrderId, OrderItem, OrderItemId, OrderItemKind, OrderStatus,
};
use quorum_core::domain::quota::ResourceUsage;
use quorum_core::errors::ApprovalError;

use super::{column, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlOrderRepository {
    pool: DbPool,
}

impl SqlOrderRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn load(&self, id: &OrderId) -> Result<Option<Order>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, group_id, owner_id, status, approved_by, approve_date, created_at, updated_at
             FROM orders WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let item_rows = sqlx::query(
            "SELECT id, kind, quantity, servers_json, arguments_json, usage_json
             FROM order_items WHERE order_id = ? ORDER BY position ASC",
        )
        .bind(&id.0)
        .fetch_all(&self.pool)
        .await?;

        let items = item_rows.iter().map(row_to_item).collect::<Result<Vec<_>, _>>()?;
        Ok(Some(row_to_order(&row, items)?))
    }

    /// Upserts the order row and replaces its items.
    pub async fn store(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO orders (id, group_id, owner_id, status, approved_by, approve_date,
                                 created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 status = excluded.status,
                 approved_by = excluded.approved_by,
                 approve_date = excluded.approve_date,
                 updated_at = excluded.updated_at",
        )
        .bind(&order.id.0)
        .bind(&order.group_id.0)
        .bind(&order.owner.0)
        .bind(order.status.as_str())
        .bind(order.approved_by.as_ref().map(|p| p.0.clone()))
        .bind(order.approve_date.map(|dt| dt.to_rfc3339()))
        .bind(order.created_at.to_rfc3339())
        .bind(order.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM order_items WHERE order_id = ?")
            .bind(&order.id.0)
            .execute(&mut *tx)
            .await?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, position, kind, quantity, servers_json,
                                          arguments_json, usage_json)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&item.id.0)
            .bind(&order.id.0)
            .bind(position as i64)
            .bind(item.kind.as_str())
            .bind(item.quantity.map(i64::from))
            .bind(serde_json::to_string(&item.servers)?)
            .bind(serde_json::to_string(&item.arguments)?)
            .bind(serde_json::to_string(&item.usage)?)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_order(row: &SqliteRow, items: Vec<OrderItem>) -> Result<Order, RepositoryError> {
    let status_raw: String = column(row, "status")?;
    let status = OrderStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order status `{status_raw}`")))?;
    let approved_by: Option<String> = column(row, "approved_by")?;
    let approve_date: Option<String> = column(row, "approve_date")?;
    let created_at: String = column(row, "created_at")?;
    let updated_at: String = column(row, "updated_at")?;

    Ok(Order {
        id: OrderId(column(row, "id")?),
        group_id: GroupId(column(row, "group_id")?),
        owner: ProfileId(column(row, "owner_id")?),
        status,
        approved_by: approved_by.map(ProfileId),
        approve_date: approve_date.as_deref().map(parse_timestamp).transpose()?,
        items,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_item(row: &SqliteRow) -> Result<OrderItem, RepositoryError> {
    let kind_raw: String = column(row, "kind")?;
    let kind = OrderItemKind::parse(&kind_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown order item kind `{kind_raw}`")))?;
    let quantity: Option<i64> = column(row, "quantity")?;
    let quantity = quantity
        .map(|q| u32::try_from(q).map_err(|_| RepositoryError::Decode(format!("quantity {q}"))))
        .transpose()?;
    let servers: String = column(row, "servers_json")?;
    let arguments: String = column(row, "arguments_json")?;
    let usage: String = column(row, "usage_json")?;

    Ok(OrderItem {
        id: OrderItemId(column(row, "id")?),
        kind,
        quantity,
        servers: serde_json::from_str::<Vec<String>>(&servers)?,
        arguments: serde_json::from_str::<BTreeMap<String, serde_json::Value>>(&arguments)?,
        usage: serde_json::from_str::<ResourceUsage>(&usage)?,
    })
}

#[async_trait::async_trait]
impl OrderRepository for SqlOrderRepository {
    async fn find_by_id(&self, id: &OrderId) -> Result<Option<Order>, ApprovalError> {
        Ok(self.load(id).await?)
    }

    async fn save(&self, order: Order) -> Result<(), ApprovalError> {
        Ok(self.store(&order).await?)
    }
}
