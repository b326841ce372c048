use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::OrderId;
use crate::errors::ApprovalError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Rejected,
    Failed,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "success" => Some(Self::Success),
            "rejected" => Some(Self::Rejected),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(correlation_id: impl Into<String>, actor: impl Into<String>) -> Self {
        Self { correlation_id: correlation_id.into(), actor: actor.into() }
    }
}

/// One entry of an order's history, e.g. `order.partially_approved`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub order_id: OrderId,
    pub correlation_id: String,
    pub event_type: String,
    pub actor: String,
    pub outcome: AuditOutcome,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        order_id: OrderId,
        context: &AuditContext,
        event_type: impl Into<String>,
        outcome: AuditOutcome,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            order_id,
            correlation_id: context.correlation_id.clone(),
            event_type: event_type.into(),
            actor: context.actor.clone(),
            outcome,
            message: message.into(),
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn emit(&self, event: AuditEvent) -> Result<(), ApprovalError>;

    async fn history(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>, ApprovalError>;
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), ApprovalError> {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
        Ok(())
    }

    async fn history(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>, ApprovalError> {
        Ok(self.events().into_iter().filter(|event| &event.order_id == order_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        audit::{AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink},
        domain::order::OrderId,
    };

    #[tokio::test]
    async fn in_memory_sink_records_events_per_order() {
        let sink = InMemoryAuditSink::default();
        let context = AuditContext::new("req-123", "alice");
        sink.emit(
            AuditEvent::new(
                OrderId("ORD-42".to_owned()),
                &context,
                "order.partially_approved",
                AuditOutcome::Success,
                "partially approved by Finance",
            )
            .with_metadata("role", "finance"),
        )
        .await
        .expect("emit");
        sink.emit(AuditEvent::new(
            OrderId("ORD-43".to_owned()),
            &context,
            "order.submitted",
            AuditOutcome::Success,
            "submitted",
        ))
        .await
        .expect("emit");

        let history = sink.history(&OrderId("ORD-42".to_owned())).await.expect("history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].correlation_id, "req-123");
        assert_eq!(history[0].actor, "alice");
        assert_eq!(history[0].metadata.get("role").map(String::as_str), Some("finance"));
    }
}
