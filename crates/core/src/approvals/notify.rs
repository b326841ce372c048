use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::info;

use crate::domain::directory::{ProfileId, RoleName};
use crate::domain::order::Order;
use crate::errors::ApprovalError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalNotice {
    pub order_id: String,
    pub recipients: Vec<ProfileId>,
    pub outstanding_roles: Vec<RoleName>,
}

/// Tells approvers that an order is waiting on them.
#[async_trait]
pub trait ApproverNotifier: Send + Sync {
    async fn notify_approvers(
        &self,
        order: &Order,
        recipients: &[ProfileId],
        outstanding_roles: &[RoleName],
    ) -> Result<(), ApprovalError>;
}

/// Emits approval notices as structured log events.
#[derive(Clone, Debug, Default)]
pub struct TracingNotifier;

#[async_trait]
impl ApproverNotifier for TracingNotifier {
    async fn notify_approvers(
        &self,
        order: &Order,
        recipients: &[ProfileId],
        outstanding_roles: &[RoleName],
    ) -> Result<(), ApprovalError> {
        let recipients: Vec<&str> = recipients.iter().map(|p| p.0.as_str()).collect();
        let roles: Vec<&str> = outstanding_roles.iter().map(RoleName::as_str).collect();
        info!(
            event_name = "approval.notify.approvers",
            order_id = %order.id,
            group_id = %order.group_id,
            recipients = ?recipients,
            outstanding_roles = ?roles,
            "order awaiting approval"
        );
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notices: Arc<Mutex<Vec<ApprovalNotice>>>,
}

impl RecordingNotifier {
    pub fn notices(&self) -> Vec<ApprovalNotice> {
        match self.notices.lock() {
            Ok(notices) => notices.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl ApproverNotifier for RecordingNotifier {
    async fn notify_approvers(
        &self,
        order: &Order,
        recipients: &[ProfileId],
        outstanding_roles: &[RoleName],
    ) -> Result<(), ApprovalError> {
        let notice = ApprovalNotice {
            order_id: order.id.0.clone(),
            recipients: recipients.to_vec(),
            outstanding_roles: outstanding_roles.to_vec(),
        };
        match self.notices.lock() {
            Ok(mut notices) => notices.push(notice),
            Err(poisoned) => poisoned.into_inner().push(notice),
        }
        Ok(())
    }
}
