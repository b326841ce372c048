use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::directory::{GroupId, ProfileId};
use crate::domain::job::JobType;
use crate::domain::quota::ResourceUsage;
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OrderItemId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for OrderItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Cart,
    Pending,
    Active,
    Success,
    Failure,
    Denied,
    Canceled,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cart => "CART",
            Self::Pending => "PENDING",
            Self::Active => "ACTIVE",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Denied => "DENIED",
            Self::Canceled => "CANCELED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "CART" => Some(Self::Cart),
            "PENDING" => Some(Self::Pending),
            "ACTIVE" => Some(Self::Active),
            "SUCCESS" => Some(Self::Success),
            "FAILURE" => Some(Self::Failure),
            "DENIED" => Some(Self::Denied),
            "CANCELED" => Some(Self::Canceled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failure | Self::Denied | Self::Canceled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Order item kinds. The derived ordering puts decommissions first so that
/// capacity is released before new resources are provisioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderItemKind {
    Decommission,
    Modify,
    Provision,
}

impl OrderItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decommission => "decom",
            Self::Modify => "mod",
            Self::Provision => "prov",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "decom" | "decommission" => Some(Self::Decommission),
            "mod" | "modify" => Some(Self::Modify),
            "prov" | "provision" => Some(Self::Provision),
            _ => None,
        }
    }

    pub fn job_type(&self) -> JobType {
        match self {
            Self::Decommission => JobType::Decommission,
            Self::Modify => JobType::Modify,
            Self::Provision => JobType::Provision,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IllegalItem {
    #[error("order item `{item}` requests a quantity of zero")]
    ZeroQuantity { item: OrderItemId },
    #[error("order item `{item}` has no servers to act on")]
    NoServers { item: OrderItemId },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub kind: OrderItemKind,
    pub quantity: Option<u32>,
    pub servers: Vec<String>,
    /// Blueprint item arguments as submitted with the order.
    pub arguments: BTreeMap<String, serde_json::Value>,
    /// Per-unit resource footprint.
    pub usage: ResourceUsage,
}

impl OrderItem {
    pub fn effective_quantity(&self) -> u32 {
        self.quantity.unwrap_or(1)
    }

    pub fn legality(&self) -> Result<(), IllegalItem> {
        if self.quantity == Some(0) {
            return Err(IllegalItem::ZeroQuantity { item: self.id.clone() });
        }

        let needs_servers = matches!(self.kind, OrderItemKind::Decommission | OrderItemKind::Modify);
        if needs_servers && self.servers.is_empty() {
            return Err(IllegalItem::NoServers { item: self.id.clone() });
        }

        Ok(())
    }

    pub fn net_usage(&self) -> ResourceUsage {
        let total = self.usage * self.effective_quantity();
        match self.kind {
            OrderItemKind::Decommission => total.negated(),
            OrderItemKind::Modify | OrderItemKind::Provision => total,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub group_id: GroupId,
    pub owner: ProfileId,
    pub status: OrderStatus,
    pub approved_by: Option<ProfileId>,
    pub approve_date: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self.status, next),
            (OrderStatus::Cart, OrderStatus::Pending)
                | (OrderStatus::Pending, OrderStatus::Active)
                | (OrderStatus::Pending, OrderStatus::Success)
                | (OrderStatus::Pending, OrderStatus::Denied)
                | (OrderStatus::Active, OrderStatus::Success)
                | (OrderStatus::Active, OrderStatus::Failure)
                | (OrderStatus::Cart, OrderStatus::Canceled)
                | (OrderStatus::Pending, OrderStatus::Canceled)
        )
    }

    pub fn transition_to(&mut self, next: OrderStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            self.updated_at = Utc::now();
            return Ok(());
        }

        Err(DomainError::InvalidOrderTransition { from: self.status, to: next })
    }

    pub fn first_item(&self) -> Option<&OrderItem> {
        self.items.first()
    }

    /// Resources the order would add to its group's usage once executed.
    pub fn net_usage(&self) -> ResourceUsage {
        self.items.iter().fold(ResourceUsage::default(), |acc, item| acc + item.net_usage())
    }
}
