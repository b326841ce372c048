use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::approvals::fanout::{plan_jobs, select_items};
use crate::approvals::hooks::{HookPoint, HookRunner};
use crate::approvals::notify::ApproverNotifier;
use crate::approvals::policy::{decide_auto_approval, AutoApproval};
use crate::approvals::ports::{
    DirectoryRepository, JobRepository, LedgerRepository, OrderRepository, QuotaRepository,
};
use crate::approvals::quorum::QuorumResolver;
use crate::audit::{AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::directory::{GroupDirectory, GroupRoleMembership, ProfileId, RoleName};
use crate::domain::job::{Job, JobId};
use crate::domain::order::{Order, OrderId, OrderStatus};
use crate::domain::quota::QuotaSet;
use crate::errors::{ApprovalError, DomainError, QuotaError};
use crate::ledger::{ApprovalLedger, ClaimOutcome, LedgerProgress, LedgerView, SingleLevelReason};

/// Jobs created by an approval call and a human-readable summary. An empty
/// job list with a PENDING order means the quorum is not complete yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalOutcome {
    pub order_status: OrderStatus,
    pub jobs: Vec<Job>,
    pub message: String,
}

impl ApprovalOutcome {
    pub fn is_partial(&self) -> bool {
        self.order_status == OrderStatus::Pending
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApprovalStart {
    DelegatedToHooks,
    AutoApproved { reason: AutoApproval, outcome: ApprovalOutcome },
    AwaitingApproval { notified: Vec<ProfileId>, outstanding_roles: Vec<RoleName> },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusReport {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub approved_by: Option<ProfileId>,
    pub approval: LedgerView,
    pub outstanding_roles: Vec<RoleName>,
    pub jobs: Vec<Job>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApprovalSettings {
    pub notify_approvers: bool,
}

impl Default for ApprovalSettings {
    fn default() -> Self {
        Self { notify_approvers: true }
    }
}

#[derive(Clone)]
pub struct ApprovalPorts {
    pub orders: Arc<dyn OrderRepository>,
    pub directory: Arc<dyn DirectoryRepository>,
    pub ledgers: Arc<dyn LedgerRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub quotas: Arc<dyn QuotaRepository>,
    pub hooks: Arc<dyn HookRunner>,
    pub notifier: Arc<dyn ApproverNotifier>,
    pub audit: Arc<dyn AuditSink>,
}

/// Drives orders from PENDING through multilevel approval to ACTIVE.
#[derive(Clone)]
pub struct ApprovalService {
    ports: ApprovalPorts,
    resolver: QuorumResolver,
    settings: ApprovalSettings,
}

impl ApprovalService {
    pub fn new(ports: ApprovalPorts, resolver: QuorumResolver, settings: ApprovalSettings) -> Self {
        Self { ports, resolver, settings }
    }

    pub fn resolver(&self) -> &QuorumResolver {
        &self.resolver
    }

    /// Approval memberships `profile` (default: the order owner) holds on the
    /// order's group.
    pub async fn get_my_grms(
        &self,
        order: &Order,
        profile: Option<&ProfileId>,
    ) -> Result<BTreeSet<GroupRoleMembership>, ApprovalError> {
        let directory = self.load_directory(order).await?;
        let profile = profile.unwrap_or(&order.owner);
        Ok(self.resolver.approving_memberships(profile, &directory))
    }

    pub async fn is_multilevel_approval(&self, order: &Order) -> Result<LedgerView, ApprovalError> {
        if order.items.is_empty() {
            return Ok(LedgerView::SingleLevel { reason: SingleLevelReason::NoOrderItems });
        }

        match self.ports.ledgers.find_for_order(&order.id).await? {
            Some(ledger) if !ledger.is_empty() => Ok(LedgerView::Multilevel { ledger }),
            _ => Ok(LedgerView::SingleLevel { reason: SingleLevelReason::NoLedger }),
        }
    }

    /// Records `profile`'s sign-off for every quorum role it holds that has
    /// not been approved yet.
    pub async fn approve_my_grms(
        &self,
        order: &Order,
        profile: &ProfileId,
        correlation_id: &str,
    ) -> Result<LedgerProgress, ApprovalError> {
        let directory = self.load_directory(order).await?;
        let context = AuditContext::new(correlation_id, profile.0.clone());
        self.record_approvals(order, &directory, profile, &context).await
    }

    pub async fn has_all_approver_roles(
        &self,
        profile: &ProfileId,
        order: &Order,
    ) -> Result<bool, ApprovalError> {
        let directory = self.load_directory(order).await?;
        Ok(self.resolver.has_all_approver_roles(profile, &directory))
    }

    pub async fn should_auto_approve(&self, order: &Order) -> Result<bool, ApprovalError> {
        Ok(self.auto_approval(order).await?.approves())
    }

    pub async fn auto_approval(&self, order: &Order) -> Result<AutoApproval, ApprovalError> {
        let directory = self.load_directory(order).await?;
        let view = self.is_multilevel_approval(order).await?;
        Ok(decide_auto_approval(&self.resolver, &directory, &order.owner, &view))
    }

    pub async fn approve(
        &self,
        order_id: &OrderId,
        approver: &ProfileId,
        parent_job: Option<&JobId>,
        correlation_id: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        let order = self.load_order(order_id).await?;
        self.approve_order(order, approver, parent_job, false, correlation_id).await
    }

    /// Entry point after submission: hooks, then auto-approval, then asking
    /// approvers.
    pub async fn start_approval_process(
        &self,
        order_id: &OrderId,
        requester: &ProfileId,
        correlation_id: &str,
    ) -> Result<ApprovalStart, ApprovalError> {
        let order = self.load_order(order_id).await?;
        ensure_pending(&order)?;
        let context = AuditContext::new(correlation_id, requester.0.clone());

        if self.ports.hooks.has_hooks(HookPoint::OrderApproval).await {
            self.ports.hooks.run(HookPoint::OrderApproval, &order).await.map_err(|failure| {
                ApprovalError::HookFailed {
                    order_id: order.id.clone(),
                    hook_point: HookPoint::OrderApproval.to_string(),
                    message: failure.to_string(),
                }
            })?;
            self.emit(
                AuditEvent::new(
                    order.id.clone(),
                    &context,
                    "order.approval_delegated",
                    AuditOutcome::Success,
                    "approval delegated to order_approval hooks",
                ),
            )
            .await?;
            info!(
                event_name = "approval.order.delegated_to_hooks",
                correlation_id,
                order_id = %order.id,
                "order approval delegated to hooks"
            );
            return Ok(ApprovalStart::DelegatedToHooks);
        }

        let directory = self.load_directory(&order).await?;
        let view = self.is_multilevel_approval(&order).await?;
        if view.is_multilevel() {
            self.record_approvals(&order, &directory, requester, &context).await?;
        }

        let decision = decide_auto_approval(&self.resolver, &directory, &order.owner, &view);
        if decision.approves() {
            info!(
                event_name = "approval.order.auto_approved",
                correlation_id,
                order_id = %order.id,
                reason = decision.as_str(),
                "order qualifies for auto-approval"
            );
            let outcome = self
                .approve_order(order, requester, None, decision.bypasses_quorum(), correlation_id)
                .await?;
            return Ok(ApprovalStart::AutoApproved { reason: decision, outcome });
        }

        let view = self.is_multilevel_approval(&order).await?;
        let outstanding_roles = view.outstanding_roles();
        let recipients: Vec<ProfileId> = if view.is_multilevel() {
            directory.profiles_holding(outstanding_roles.iter()).into_iter().collect()
        } else {
            self.single_level_approvers(&directory)
        };

        if self.settings.notify_approvers && !recipients.is_empty() {
            self.ports.notifier.notify_approvers(&order, &recipients, &outstanding_roles).await?;
        } else if recipients.is_empty() {
            warn!(
                event_name = "approval.order.no_approvers",
                correlation_id,
                order_id = %order.id,
                group_id = %order.group_id,
                "no profile can approve this order"
            );
        }

        Ok(ApprovalStart::AwaitingApproval { notified: recipients, outstanding_roles })
    }

    /// Moves a cart into PENDING, seeds its approval ledger and starts the
    /// approval process for the owner.
    pub async fn submit_order(
        &self,
        mut order: Order,
        correlation_id: &str,
    ) -> Result<ApprovalStart, ApprovalError> {
        let context = AuditContext::new(correlation_id, order.owner.0.clone());
        let directory = self.load_directory(&order).await?;
        order.transition_to(OrderStatus::Pending)?;

        self.ports.orders.save(order.clone()).await?;
        if let Some(ledger) = self.seed_ledger(&order, &directory) {
            self.ports.ledgers.create(ledger).await?;
        }
        self.emit(AuditEvent::new(
            order.id.clone(),
            &context,
            "order.submitted",
            AuditOutcome::Success,
            "submitted for approval",
        ))
        .await?;
        info!(
            event_name = "approval.order.submitted",
            correlation_id,
            order_id = %order.id,
            group_id = %order.group_id,
            "order submitted"
        );

        let owner = order.owner.clone();
        self.start_approval_process(&order.id, &owner, correlation_id).await
    }

    pub async fn deny(
        &self,
        order_id: &OrderId,
        profile: &ProfileId,
        reason: &str,
        correlation_id: &str,
    ) -> Result<Order, ApprovalError> {
        let mut order = self.load_order(order_id).await?;
        ensure_pending(&order)?;
        let directory = self.load_directory(&order).await?;
        if !self.may_decide(profile, &directory) {
            return Err(DomainError::NotAuthorized {
                profile: profile.clone(),
                order_id: order.id.clone(),
                action: "deny",
            }
            .into());
        }

        order.transition_to(OrderStatus::Denied)?;
        self.ports.orders.save(order.clone()).await?;
        let context = AuditContext::new(correlation_id, profile.0.clone());
        self.emit(
            AuditEvent::new(
                order.id.clone(),
                &context,
                "order.denied",
                AuditOutcome::Rejected,
                format!("denied: {reason}"),
            )
            .with_metadata("reason", reason),
        )
        .await?;
        info!(
            event_name = "approval.order.denied",
            correlation_id,
            order_id = %order.id,
            profile_id = %profile,
            "order denied"
        );
        Ok(order)
    }

    pub async fn cancel(
        &self,
        order_id: &OrderId,
        profile: &ProfileId,
        correlation_id: &str,
    ) -> Result<Order, ApprovalError> {
        let mut order = self.load_order(order_id).await?;
        if &order.owner != profile {
            return Err(DomainError::NotAuthorized {
                profile: profile.clone(),
                order_id: order.id.clone(),
                action: "cancel",
            }
            .into());
        }

        order.transition_to(OrderStatus::Canceled)?;
        self.ports.orders.save(order.clone()).await?;
        let context = AuditContext::new(correlation_id, profile.0.clone());
        self.emit(AuditEvent::new(
            order.id.clone(),
            &context,
            "order.canceled",
            AuditOutcome::Success,
            "canceled by owner",
        ))
        .await?;
        info!(
            event_name = "approval.order.canceled",
            correlation_id,
            order_id = %order.id,
            "order canceled"
        );
        Ok(order)
    }

    pub async fn status_report(
        &self,
        order_id: &OrderId,
    ) -> Result<OrderStatusReport, ApprovalError> {
        let order = self.load_order(order_id).await?;
        let approval = self.is_multilevel_approval(&order).await?;
        let jobs = self.ports.jobs.list_for_order(&order.id).await?;
        Ok(OrderStatusReport {
            order_id: order.id,
            status: order.status,
            approved_by: order.approved_by,
            outstanding_roles: approval.outstanding_roles(),
            approval,
            jobs,
        })
    }

    pub async fn history(&self, order_id: &OrderId) -> Result<Vec<AuditEvent>, ApprovalError> {
        self.ports.audit.history(order_id).await
    }

    async fn approve_order(
        &self,
        mut order: Order,
        approver: &ProfileId,
        parent_job: Option<&JobId>,
        bypass_quorum: bool,
        correlation_id: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        ensure_pending(&order)?;
        let context = AuditContext::new(correlation_id, approver.0.clone());
        let directory = self.load_directory(&order).await?;

        if !bypass_quorum && !self.may_decide(approver, &directory) {
            warn!(
                event_name = "approval.order.unauthorized",
                correlation_id,
                order_id = %order.id,
                profile_id = %approver,
                "profile holds no approval rights on the order's group"
            );
            return Err(DomainError::NotAuthorized {
                profile: approver.clone(),
                order_id: order.id.clone(),
                action: "approve",
            }
            .into());
        }

        let view = self.is_multilevel_approval(&order).await?;
        if view.is_multilevel() && !bypass_quorum {
            let progress = self.record_approvals(&order, &directory, approver, &context).await?;
            if !progress.view.is_complete() {
                let outstanding: Vec<String> = progress
                    .view
                    .outstanding_roles()
                    .iter()
                    .map(|role| directory.role_label(role))
                    .collect();
                info!(
                    event_name = "approval.order.partially_approved",
                    correlation_id,
                    order_id = %order.id,
                    recorded_roles = progress.recorded.len(),
                    outstanding_roles = outstanding.len(),
                    "order still awaiting approvals"
                );
                return Ok(ApprovalOutcome {
                    order_status: order.status,
                    jobs: Vec::new(),
                    message: format!(
                        "Order {} is partially approved and still awaits: {}",
                        order.id,
                        outstanding.join(", ")
                    ),
                });
            }
        }

        let quota = self
            .ports
            .quotas
            .find_for_group(&order.group_id)
            .await?
            .unwrap_or_else(|| QuotaSet::unlimited(order.group_id.clone()));
        let usage = order.net_usage();
        if let Err(error) = quota.can_use(&usage) {
            warn_quota_exceeded(correlation_id, &order.id, &error);
            return Err(error.into());
        }

        let selection = select_items(&order.items);
        for dropped in &selection.dropped {
            warn!(
                event_name = "approval.order.item_dropped",
                correlation_id,
                order_id = %order.id,
                reason = %dropped,
                "order item skipped"
            );
        }

        if selection.items.is_empty() {
            order.transition_to(OrderStatus::Success)?;
            self.ports.orders.save(order.clone()).await?;
            self.emit(AuditEvent::new(
                order.id.clone(),
                &context,
                "order.completed",
                AuditOutcome::Success,
                "nothing to execute",
            ))
            .await?;
            return Ok(ApprovalOutcome {
                order_status: order.status,
                jobs: Vec::new(),
                message: format!("Order {} has nothing to execute and is complete", order.id),
            });
        }

        // The read above may be stale; this check and increment is atomic.
        if let Err(error) = self.ports.quotas.consume(&order.group_id, &usage).await {
            if let ApprovalError::Quota(quota_error) = &error {
                warn_quota_exceeded(correlation_id, &order.id, quota_error);
            }
            return Err(error);
        }

        order.transition_to(OrderStatus::Active)?;
        order.approved_by = Some(approver.clone());
        order.approve_date = Some(Utc::now());
        self.ports.orders.save(order.clone()).await?;
        self.emit(AuditEvent::new(
            order.id.clone(),
            &context,
            "order.approved",
            AuditOutcome::Success,
            format!("approved by {approver}"),
        ))
        .await?;

        if let Err(failure) = self.ports.hooks.run(HookPoint::PreOrderExecution, &order).await {
            self.ports.quotas.consume(&order.group_id, &usage.negated()).await?;
            order.transition_to(OrderStatus::Failure)?;
            self.ports.orders.save(order.clone()).await?;
            self.emit(
                AuditEvent::new(
                    order.id.clone(),
                    &context,
                    "order.failed",
                    AuditOutcome::Failed,
                    failure.to_string(),
                )
                .with_metadata("hook", failure.hook.clone()),
            )
            .await?;
            warn!(
                event_name = "approval.order.hook_failed",
                correlation_id,
                order_id = %order.id,
                hook = %failure.hook,
                "pre-execution hook failed"
            );
            return Err(ApprovalError::HookFailed {
                order_id: order.id.clone(),
                hook_point: HookPoint::PreOrderExecution.to_string(),
                message: failure.to_string(),
            });
        }

        let jobs = plan_jobs(&order.id, &selection.items, parent_job, Utc::now());
        self.ports.jobs.create_jobs(&jobs).await?;

        if jobs.is_empty() {
            order.transition_to(OrderStatus::Success)?;
            self.ports.orders.save(order.clone()).await?;
        }

        info!(
            event_name = "approval.order.approved",
            correlation_id,
            order_id = %order.id,
            approver = %approver,
            job_count = jobs.len(),
            "order approved"
        );
        Ok(ApprovalOutcome {
            order_status: order.status,
            message: format!("Order {} approved; {} job(s) created", order.id, jobs.len()),
            jobs,
        })
    }

    async fn record_approvals(
        &self,
        order: &Order,
        directory: &GroupDirectory,
        profile: &ProfileId,
        context: &AuditContext,
    ) -> Result<LedgerProgress, ApprovalError> {
        let view = self.is_multilevel_approval(order).await?;
        let Some(ledger) = view.ledger() else {
            return Ok(LedgerProgress { recorded: Vec::new(), already_approved: Vec::new(), view });
        };

        let mut recorded = Vec::new();
        let mut already_approved = Vec::new();
        for membership in self.resolver.approving_memberships(profile, directory) {
            if !ledger.entries.contains_key(&membership.role) {
                continue;
            }

            let claim =
                self.ports.ledgers.claim(&order.id, &membership.role, profile, Utc::now()).await?;
            match claim {
                ClaimOutcome::Recorded => {
                    let label = directory.role_label(&membership.role);
                    self.emit(
                        AuditEvent::new(
                            order.id.clone(),
                            context,
                            "order.partially_approved",
                            AuditOutcome::Success,
                            format!("partially approved by {label}"),
                        )
                        .with_metadata("role", membership.role.as_str()),
                    )
                    .await?;
                    recorded.push(membership.role);
                }
                ClaimOutcome::AlreadyApproved { .. } => already_approved.push(membership.role),
                ClaimOutcome::NotTracked => {}
            }
        }

        let view = self.is_multilevel_approval(order).await?;
        Ok(LedgerProgress { recorded, already_approved, view })
    }

    fn seed_ledger(&self, order: &Order, directory: &GroupDirectory) -> Option<ApprovalLedger> {
        let first_item = order.first_item()?;
        let mut ledger = ApprovalLedger::from_arguments(order.id.clone(), &first_item.arguments);

        let required = self.resolver.required_roles(directory);
        if self.resolver.is_multilevel(&required) {
            let seeded = ApprovalLedger::new(order.id.clone(), required);
            for (role, entry) in seeded.entries {
                ledger.entries.entry(role).or_insert(entry);
            }
        }

        (!ledger.is_empty()).then_some(ledger)
    }

    /// Approve and deny are open to holders of the approve permission on the
    /// group and to holders of any quorum role.
    fn may_decide(&self, profile: &ProfileId, directory: &GroupDirectory) -> bool {
        let required = self.resolver.required_roles(directory);
        directory.memberships_of(profile).any(|membership| required.contains(&membership.role))
            || self.resolver.holds_approve_permission(profile, directory)
    }

    fn single_level_approvers(&self, directory: &GroupDirectory) -> Vec<ProfileId> {
        let profiles: BTreeSet<ProfileId> =
            directory.memberships.iter().map(|m| m.profile_id.clone()).collect();
        profiles
            .into_iter()
            .filter(|profile| self.resolver.holds_approve_permission(profile, directory))
            .collect()
    }

    async fn load_order(&self, order_id: &OrderId) -> Result<Order, ApprovalError> {
        self.ports
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| ApprovalError::OrderNotFound(order_id.clone()))
    }

    async fn load_directory(&self, order: &Order) -> Result<GroupDirectory, ApprovalError> {
        self.ports
            .directory
            .find_group_directory(&order.group_id)
            .await?
            .ok_or_else(|| ApprovalError::GroupNotFound(order.group_id.clone()))
    }

    async fn emit(&self, event: AuditEvent) -> Result<(), ApprovalError> {
        self.ports.audit.emit(event).await
    }
}

fn warn_quota_exceeded(correlation_id: &str, order_id: &OrderId, error: &QuotaError) {
    warn!(
        event_name = "approval.order.quota_exceeded",
        correlation_id,
        order_id = %order_id,
        error = %error,
        "quota check failed, order left pending"
    );
}

fn ensure_pending(order: &Order) -> Result<(), DomainError> {
    if order.status != OrderStatus::Pending {
        return Err(DomainError::OrderNotPending {
            order_id: order.id.clone(),
            status: order.status,
        });
    }
    Ok(())
}
