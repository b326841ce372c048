use std::collections::BTreeMap;
use std::sync::Arc;

use rust_decimal::Decimal;

use quorum_core::approvals::ports::{
    JobRepository, LedgerRepository, OrderRepository, QuotaRepository,
};
use quorum_core::approvals::{
    ApprovalOutcome, ApprovalPorts, ApprovalService, ApprovalSettings, ApprovalStart,
    AutoApproval, HookPoint, HookRegistry, QuorumResolver, RecordingNotifier,
};
use quorum_core::audit::{AuditOutcome, InMemoryAuditSink};
use quorum_core::domain::directory::{
    GroupDirectory, GroupRoleMembership, Permission, ProfileId, Role, RoleName,
};
use quorum_core::domain::job::JobType;
use quorum_core::domain::order::{Order, OrderId, OrderStatus};
use quorum_core::domain::quota::{QuotaResource, QuotaSet};
use quorum_core::errors::{ApprovalError, DomainError, QuotaError};
use quorum_core::ledger::{ApprovalLedger, LedgerView, SingleLevelReason};
use quorum_db::fixtures::{demo_directory, demo_order, demo_quota, sandbox_directory};
use quorum_db::repositories::{
    InMemoryDirectoryRepository, InMemoryJobRepository, InMemoryLedgerRepository,
    InMemoryOrderRepository, InMemoryQuotaRepository,
};

const CORRELATION_ID: &str = "req-test";

struct Harness {
    service: ApprovalService,
    orders: Arc<InMemoryOrderRepository>,
    ledgers: Arc<InMemoryLedgerRepository>,
    jobs: Arc<InMemoryJobRepository>,
    quotas: Arc<InMemoryQuotaRepository>,
    audit: InMemoryAuditSink,
    notifier: RecordingNotifier,
}

impl Harness {
    async fn new(directories: Vec<GroupDirectory>, quota: Option<QuotaSet>) -> Self {
        Self::with_hooks(directories, quota, HookRegistry::default()).await
    }

    async fn with_hooks(
        directories: Vec<GroupDirectory>,
        quota: Option<QuotaSet>,
        hooks: HookRegistry,
    ) -> Self {
        let orders = Arc::new(InMemoryOrderRepository::default());
        let directory = Arc::new(InMemoryDirectoryRepository::default());
        for entry in directories {
            directory.insert(entry).await;
        }
        let ledgers = Arc::new(InMemoryLedgerRepository::default());
        let jobs = Arc::new(InMemoryJobRepository::default());
        let quotas = Arc::new(InMemoryQuotaRepository::default());
        if let Some(quota) = quota {
            quotas.insert(quota).await;
        }
        let audit = InMemoryAuditSink::default();
        let notifier = RecordingNotifier::default();

        let ports = ApprovalPorts {
            orders: orders.clone(),
            directory,
            ledgers: ledgers.clone(),
            jobs: jobs.clone(),
            quotas: quotas.clone(),
            hooks: Arc::new(hooks),
            notifier: Arc::new(notifier.clone()),
            audit: Arc::new(audit.clone()),
        };
        let service =
            ApprovalService::new(ports, QuorumResolver::default(), ApprovalSettings::default());

        Self { service, orders, ledgers, jobs, quotas, audit, notifier }
    }

    async fn submit(&self, order: Order) -> ApprovalStart {
        self.service.submit_order(order, CORRELATION_ID).await.expect("submit order")
    }

    async fn approve_as(
        &self,
        order_id: &OrderId,
        profile: &str,
    ) -> Result<ApprovalOutcome, ApprovalError> {
        self.service.approve(order_id, &profile_id(profile), None, CORRELATION_ID).await
    }

    async fn order(&self, order_id: &OrderId) -> Order {
        self.orders.find_by_id(order_id).await.expect("load order").expect("order exists")
    }

    async fn ledger(&self, order_id: &OrderId) -> ApprovalLedger {
        self.ledgers.find_for_order(order_id).await.expect("load ledger").expect("ledger exists")
    }

    async fn job_count(&self, order_id: &OrderId) -> usize {
        self.jobs.list_for_order(order_id).await.expect("list jobs").len()
    }

    async fn quota(&self, order: &Order) -> QuotaSet {
        self.quotas.find_for_group(&order.group_id).await.expect("load quota").expect("quota set")
    }

    fn event_types(&self) -> Vec<String> {
        self.audit.events().into_iter().map(|event| event.event_type).collect()
    }
}

fn profile_id(name: &str) -> ProfileId {
    ProfileId(name.to_string())
}

fn owned_by(mut order: Order, owner: &str) -> Order {
    order.owner = profile_id(owner);
    order
}

fn in_group(mut order: Order, directory: &GroupDirectory) -> Order {
    order.group_id = directory.group.id.clone();
    order
}

/// Single-level group: only the generic approver role confers approval.
fn ops_directory() -> GroupDirectory {
    let mut directory = demo_directory();
    directory.group.id = quorum_core::GroupId("ops".to_string());
    directory.group.name = "Operations".to_string();
    directory.memberships = vec![
        GroupRoleMembership::new("erin", "ops", "approver"),
        GroupRoleMembership::new("alice", "ops", "viewer"),
    ];
    directory
}

#[tokio::test]
async fn approve_rejects_non_pending_orders_without_side_effects() {
    let harness = Harness::new(vec![demo_directory()], None).await;

    for status in [OrderStatus::Cart, OrderStatus::Active, OrderStatus::Success, OrderStatus::Denied] {
        let mut order = demo_order(&format!("ORD-{}", status.as_str()));
        order.status = status;
        harness.orders.save(order.clone()).await.expect("save order");

        let error = harness.approve_as(&order.id, "dave").await.expect_err("approve should fail");
        assert!(matches!(
            error,
            ApprovalError::Domain(DomainError::OrderNotPending { status: s, .. }) if s == status
        ));

        let stored = harness.order(&order.id).await;
        assert_eq!(stored.status, status);
        assert_eq!(stored.approved_by, None);
        assert_eq!(harness.job_count(&order.id).await, 0);
    }
}

#[tokio::test]
async fn submission_notifies_holders_of_outstanding_quorum_roles() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = demo_order("ORD-10");

    let start = harness.submit(order.clone()).await;

    let ApprovalStart::AwaitingApproval { notified, outstanding_roles } = start else {
        panic!("expected order to await approval, got {start:?}");
    };
    assert_eq!(notified, vec![profile_id("bob"), profile_id("carol"), profile_id("dave")]);
    assert_eq!(outstanding_roles, vec![RoleName::new("finance"), RoleName::new("security")]);
    assert_eq!(harness.order(&order.id).await.status, OrderStatus::Pending);

    let notices = harness.notifier.notices();
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].order_id, "ORD-10");
}

#[tokio::test]
async fn partial_approval_keeps_order_pending_and_fills_only_held_roles() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = demo_order("ORD-11");
    harness.submit(order.clone()).await;

    let outcome = harness.approve_as(&order.id, "bob").await.expect("partial approval");

    assert!(outcome.is_partial());
    assert!(outcome.jobs.is_empty());
    assert!(outcome.message.contains("Security"), "message was {}", outcome.message);

    let stored = harness.order(&order.id).await;
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.approved_by, None);

    let ledger = harness.ledger(&order.id).await;
    assert_eq!(ledger.approver_for(&RoleName::new("finance")), Some(&profile_id("bob")));
    assert_eq!(ledger.approver_for(&RoleName::new("security")), None);

    let partial = harness
        .audit
        .events()
        .into_iter()
        .find(|event| event.event_type == "order.partially_approved")
        .expect("partial approval is recorded");
    assert_eq!(partial.message, "partially approved by Finance");
    assert_eq!(partial.outcome, AuditOutcome::Success);
}

#[tokio::test]
async fn completing_the_quorum_activates_the_order_and_fans_out_jobs() {
    let harness = Harness::new(vec![demo_directory()], Some(demo_quota())).await;
    let order = demo_order("ORD-12");
    harness.submit(order.clone()).await;
    harness.approve_as(&order.id, "bob").await.expect("finance approval");

    let outcome = harness.approve_as(&order.id, "carol").await.expect("security approval");

    assert_eq!(outcome.order_status, OrderStatus::Active);
    // Two provisioned VMs plus one decommission with the default quantity.
    assert_eq!(outcome.jobs.len(), 3);
    assert_eq!(outcome.jobs[0].job_type, JobType::Decommission);
    assert_eq!(outcome.jobs[0].servers, vec!["srv-legacy-01".to_string()]);
    assert!(outcome.jobs[1..].iter().all(|job| job.job_type == JobType::Provision));

    let stored = harness.order(&order.id).await;
    assert_eq!(stored.status, OrderStatus::Active);
    assert_eq!(stored.approved_by, Some(profile_id("carol")));
    assert!(stored.approve_date.is_some());
    assert_eq!(harness.job_count(&order.id).await, 3);
    assert!(harness.ledger(&order.id).await.is_complete());
    assert!(harness.event_types().contains(&"order.approved".to_string()));
}

#[tokio::test]
async fn one_profile_holding_every_required_role_completes_the_quorum() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = demo_order("ORD-13");
    harness.submit(order.clone()).await;

    let outcome = harness.approve_as(&order.id, "dave").await.expect("approval");

    assert_eq!(outcome.order_status, OrderStatus::Active);
    assert_eq!(outcome.jobs.len(), 3);
    let ledger = harness.ledger(&order.id).await;
    assert_eq!(ledger.approver_for(&RoleName::new("finance")), Some(&profile_id("dave")));
    assert_eq!(ledger.approver_for(&RoleName::new("security")), Some(&profile_id("dave")));
}

#[tokio::test]
async fn parent_job_is_propagated_to_created_jobs() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = demo_order("ORD-14");
    harness.submit(order.clone()).await;
    let parent = quorum_core::JobId("JOB-42".to_string());

    let outcome = harness
        .service
        .approve(&order.id, &profile_id("dave"), Some(&parent), CORRELATION_ID)
        .await
        .expect("approval");

    assert!(outcome.jobs.iter().all(|job| job.parent_job.as_ref() == Some(&parent)));
}

#[tokio::test]
async fn group_auto_approval_wins_regardless_of_role_state() {
    let mut sandbox = sandbox_directory();
    sandbox.group.quorum = Some(vec![RoleName::new("finance"), RoleName::new("security")]);
    let harness = Harness::new(vec![sandbox.clone()], None).await;
    let order = in_group(demo_order("ORD-20"), &sandbox);

    let start = harness.submit(order.clone()).await;

    let ApprovalStart::AutoApproved { reason, outcome } = start else {
        panic!("expected auto-approval, got {start:?}");
    };
    assert_eq!(reason, AutoApproval::GroupAllowsAutoApproval);
    assert_eq!(outcome.order_status, OrderStatus::Active);
    assert_eq!(outcome.jobs.len(), 3);

    let stored = harness.order(&order.id).await;
    assert_eq!(stored.approved_by, Some(profile_id("alice")));
    // Quorum seats stay empty: the group flag bypasses them.
    assert_eq!(harness.ledger(&order.id).await.outstanding_roles().len(), 2);
    assert!(harness.notifier.notices().is_empty());
}

#[tokio::test]
async fn should_auto_approve_follows_first_matching_rule() {
    let ops = ops_directory();
    let mut sandbox = sandbox_directory();
    sandbox.group.quorum = Some(vec![RoleName::new("finance"), RoleName::new("security")]);
    let harness = Harness::new(vec![demo_directory(), ops.clone(), sandbox.clone()], None).await;

    let mut flagged = in_group(demo_order("ORD-21"), &sandbox);
    flagged.status = OrderStatus::Pending;
    harness.orders.save(flagged.clone()).await.expect("save order");
    harness
        .ledgers
        .create(ApprovalLedger::new(
            flagged.id.clone(),
            [RoleName::new("finance"), RoleName::new("security")],
        ))
        .await
        .expect("create ledger");
    assert!(harness.service.should_auto_approve(&flagged).await.expect("decision"));

    let mut single_level = owned_by(in_group(demo_order("ORD-22"), &ops), "erin");
    single_level.status = OrderStatus::Pending;
    harness.orders.save(single_level.clone()).await.expect("save order");
    assert_eq!(
        harness.service.auto_approval(&single_level).await.expect("decision"),
        AutoApproval::SubmitterIsApprover
    );

    let mut subset = owned_by(demo_order("ORD-23"), "bob");
    subset.status = OrderStatus::Pending;
    harness.orders.save(subset.clone()).await.expect("save order");
    harness
        .ledgers
        .create(ApprovalLedger::new(
            subset.id.clone(),
            [RoleName::new("finance"), RoleName::new("security")],
        ))
        .await
        .expect("create ledger");
    assert!(!harness.service.should_auto_approve(&subset).await.expect("decision"));

    let mut viewer = owned_by(in_group(demo_order("ORD-24"), &ops), "alice");
    viewer.status = OrderStatus::Pending;
    assert!(!harness.service.should_auto_approve(&viewer).await.expect("decision"));
}

#[tokio::test]
async fn submitter_holding_every_role_is_auto_approved_on_submit() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = owned_by(demo_order("ORD-25"), "dave");

    let start = harness.submit(order.clone()).await;

    let ApprovalStart::AutoApproved { reason, outcome } = start else {
        panic!("expected auto-approval, got {start:?}");
    };
    assert_eq!(reason, AutoApproval::SubmitterHoldsAllRoles);
    assert_eq!(outcome.jobs.len(), 3);
    assert_eq!(harness.order(&order.id).await.status, OrderStatus::Active);
}

#[tokio::test]
async fn submitter_seat_is_recorded_before_waiting_on_the_rest() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = owned_by(demo_order("ORD-26"), "bob");

    let start = harness.submit(order.clone()).await;

    let ApprovalStart::AwaitingApproval { notified, outstanding_roles } = start else {
        panic!("expected order to await approval, got {start:?}");
    };
    assert_eq!(outstanding_roles, vec![RoleName::new("security")]);
    assert_eq!(notified, vec![profile_id("carol"), profile_id("dave")]);
    let ledger = harness.ledger(&order.id).await;
    assert_eq!(ledger.approver_for(&RoleName::new("finance")), Some(&profile_id("bob")));
}

#[tokio::test]
async fn re_approving_a_filled_role_keeps_the_first_approver() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = demo_order("ORD-30");
    harness.submit(order.clone()).await;
    let pending = harness.order(&order.id).await;

    let first = harness
        .service
        .approve_my_grms(&pending, &profile_id("bob"), CORRELATION_ID)
        .await
        .expect("first approval");
    let second = harness
        .service
        .approve_my_grms(&pending, &profile_id("bob"), CORRELATION_ID)
        .await
        .expect("second approval");
    let overlap = harness
        .service
        .approve_my_grms(&pending, &profile_id("dave"), CORRELATION_ID)
        .await
        .expect("overlapping approval");

    assert_eq!(first.recorded, vec![RoleName::new("finance")]);
    assert!(second.recorded.is_empty());
    assert_eq!(second.already_approved, vec![RoleName::new("finance")]);
    assert_eq!(overlap.recorded, vec![RoleName::new("security")]);

    let ledger = harness.ledger(&order.id).await;
    assert_eq!(ledger.approver_for(&RoleName::new("finance")), Some(&profile_id("bob")));
    assert_eq!(ledger.approver_for(&RoleName::new("security")), Some(&profile_id("dave")));
    let partials =
        harness.event_types().into_iter().filter(|t| t == "order.partially_approved").count();
    assert_eq!(partials, 2);
}

#[tokio::test]
async fn order_without_surviving_items_completes_with_no_jobs() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let mut order = demo_order("ORD-40");
    order.items[0].quantity = Some(0);
    order.items[1].servers.clear();
    harness.submit(order.clone()).await;

    let outcome = harness.approve_as(&order.id, "dave").await.expect("approval");

    assert_eq!(outcome.order_status, OrderStatus::Success);
    assert!(outcome.jobs.is_empty());
    assert_eq!(harness.order(&order.id).await.status, OrderStatus::Success);
    assert_eq!(harness.job_count(&order.id).await, 0);
    assert!(harness.event_types().contains(&"order.completed".to_string()));
}

#[tokio::test]
async fn quota_violation_leaves_the_order_pending() {
    let mut quota = demo_quota();
    quota.limits.vm_cnt = Some(Decimal::from(2));
    quota.used.vm_cnt = Decimal::from(2);
    let harness = Harness::new(vec![demo_directory()], Some(quota)).await;
    let order = demo_order("ORD-50");
    harness.submit(order.clone()).await;

    let error = harness.approve_as(&order.id, "dave").await.expect_err("quota should fail");

    assert!(matches!(
        error,
        ApprovalError::Quota(QuotaError::Exceeded { resource: QuotaResource::VmCnt, .. })
    ));
    let stored = harness.order(&order.id).await;
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.approved_by, None);
    assert_eq!(harness.job_count(&order.id).await, 0);
}

#[tokio::test]
async fn decommissions_release_quota_before_provisioning_is_checked() {
    let mut quota = demo_quota();
    // Net usage of the demo order is one VM: two provisioned, one retired.
    quota.limits.vm_cnt = Some(Decimal::from(3));
    quota.used.vm_cnt = Decimal::from(2);
    let harness = Harness::new(vec![demo_directory()], Some(quota)).await;
    let order = demo_order("ORD-51");
    harness.submit(order.clone()).await;

    let outcome = harness.approve_as(&order.id, "dave").await.expect("approval");

    assert_eq!(outcome.order_status, OrderStatus::Active);
}

#[tokio::test]
async fn approved_orders_consume_the_group_headroom() {
    let mut quota = demo_quota();
    quota.limits.vm_cnt = Some(Decimal::from(3));
    quota.used.vm_cnt = Decimal::from(2);
    let harness = Harness::new(vec![demo_directory()], Some(quota)).await;
    let first = demo_order("ORD-52");
    let second = demo_order("ORD-53");
    harness.submit(first.clone()).await;
    harness.submit(second.clone()).await;

    let outcome = harness.approve_as(&first.id, "dave").await.expect("first approval");
    assert_eq!(outcome.order_status, OrderStatus::Active);
    let used = harness.quota(&first).await.used;
    assert_eq!(used.vm_cnt, Decimal::from(3));
    assert_eq!(used.cpu_cnt, demo_quota().used.cpu_cnt + Decimal::from(2));

    let error = harness.approve_as(&second.id, "dave").await.expect_err("headroom is spent");
    assert!(matches!(
        error,
        ApprovalError::Quota(QuotaError::Exceeded { resource: QuotaResource::VmCnt, .. })
    ));
    assert_eq!(harness.order(&second.id).await.status, OrderStatus::Pending);
    assert_eq!(harness.job_count(&second.id).await, 0);
    assert_eq!(harness.quota(&second).await.used.vm_cnt, Decimal::from(3));
}

#[tokio::test]
async fn pre_execution_hook_failure_marks_the_order_failed() {
    let hooks = HookRegistry::default().with_hook(
        HookPoint::PreOrderExecution,
        "cmdb-reserve",
        |order| Err(format!("no cmdb record for {}", order.id)),
    );
    let harness = Harness::with_hooks(vec![demo_directory()], Some(demo_quota()), hooks).await;
    let order = demo_order("ORD-60");
    harness.submit(order.clone()).await;

    let error = harness.approve_as(&order.id, "dave").await.expect_err("hook should fail");

    assert!(matches!(
        error,
        ApprovalError::HookFailed { ref hook_point, .. } if hook_point == "pre_order_execution"
    ));
    let stored = harness.order(&order.id).await;
    assert_eq!(stored.status, OrderStatus::Failure);
    assert_eq!(stored.approved_by, Some(profile_id("dave")));
    assert_eq!(harness.job_count(&order.id).await, 0);
    assert_eq!(harness.quota(&order).await.used, demo_quota().used);

    let events = harness.event_types();
    let approved = events.iter().position(|t| t == "order.approved").expect("approved event");
    let failed = events.iter().position(|t| t == "order.failed").expect("failed event");
    assert!(approved < failed);
}

#[tokio::test]
async fn order_approval_hooks_take_over_the_approval_flow() {
    let hooks =
        HookRegistry::default().with_hook(HookPoint::OrderApproval, "external-workflow", |_| Ok(()));
    let harness = Harness::with_hooks(vec![demo_directory()], None, hooks).await;
    let order = owned_by(demo_order("ORD-70"), "dave");

    let start = harness.submit(order.clone()).await;

    assert_eq!(start, ApprovalStart::DelegatedToHooks);
    assert_eq!(harness.order(&order.id).await.status, OrderStatus::Pending);
    assert!(harness.notifier.notices().is_empty());
    assert_eq!(harness.ledger(&order.id).await.outstanding_roles().len(), 2);
}

#[tokio::test]
async fn single_level_orders_have_no_ledger_and_notify_approvers() {
    let ops = ops_directory();
    let harness = Harness::new(vec![ops.clone()], None).await;
    let order = in_group(demo_order("ORD-80"), &ops);

    let start = harness.submit(order.clone()).await;

    assert_eq!(
        start,
        ApprovalStart::AwaitingApproval { notified: vec![profile_id("erin")], outstanding_roles: Vec::new() }
    );
    let pending = harness.order(&order.id).await;
    assert_eq!(
        harness.service.is_multilevel_approval(&pending).await.expect("view"),
        LedgerView::SingleLevel { reason: SingleLevelReason::NoLedger }
    );

    let outcome = harness.approve_as(&order.id, "erin").await.expect("approval");
    assert_eq!(outcome.order_status, OrderStatus::Active);
}

#[tokio::test]
async fn orders_without_items_are_single_level() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let mut order = demo_order("ORD-81");
    order.items.clear();

    let view = harness.service.is_multilevel_approval(&order).await.expect("view");

    assert_eq!(view, LedgerView::SingleLevel { reason: SingleLevelReason::NoOrderItems });
}

#[tokio::test]
async fn legacy_approver_arguments_seed_the_ledger() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let mut order = demo_order("ORD-90");
    order.items[0].arguments = BTreeMap::from([
        ("finance_approver_id".to_string(), serde_json::json!("bob")),
        ("legal_approver_id".to_string(), serde_json::json!(0)),
    ]);

    let start = harness.submit(order.clone()).await;

    let ledger = harness.ledger(&order.id).await;
    assert_eq!(ledger.approver_for(&RoleName::new("finance")), Some(&profile_id("bob")));
    assert_eq!(
        ledger.outstanding_roles(),
        vec![RoleName::new("legal"), RoleName::new("security")]
    );
    assert!(matches!(start, ApprovalStart::AwaitingApproval { .. }));
}

#[tokio::test]
async fn has_all_approver_roles_compares_role_identity_not_count() {
    let mut directory = demo_directory();
    directory.group.quorum = Some(vec![RoleName::new("finance"), RoleName::new("security")]);
    directory.roles.insert(
        RoleName::new("legal"),
        Role {
            name: RoleName::new("legal"),
            label: "Legal".to_string(),
            permissions: [Permission::order_approve()].into_iter().collect(),
        },
    );
    directory.memberships.push(GroupRoleMembership::new("gina", "eng", "finance"));
    directory.memberships.push(GroupRoleMembership::new("gina", "eng", "legal"));
    let harness = Harness::new(vec![directory], None).await;
    let order = demo_order("ORD-91");

    assert!(!harness.service.has_all_approver_roles(&profile_id("gina"), &order).await.expect("check"));
    assert!(harness.service.has_all_approver_roles(&profile_id("dave"), &order).await.expect("check"));
}

#[tokio::test]
async fn get_my_grms_defaults_to_the_owner_and_drops_the_generic_role() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = owned_by(demo_order("ORD-92"), "dave");

    let owner_roles: Vec<RoleName> = harness
        .service
        .get_my_grms(&order, None)
        .await
        .expect("memberships")
        .into_iter()
        .map(|membership| membership.role)
        .collect();
    let erin_roles: Vec<RoleName> = harness
        .service
        .get_my_grms(&order, Some(&profile_id("erin")))
        .await
        .expect("memberships")
        .into_iter()
        .map(|membership| membership.role)
        .collect();

    assert_eq!(owner_roles, vec![RoleName::new("finance"), RoleName::new("security")]);
    assert_eq!(erin_roles, vec![RoleName::new("approver")]);
}

#[tokio::test]
async fn deny_requires_approval_rights() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = demo_order("ORD-100");
    harness.submit(order.clone()).await;

    let error = harness
        .service
        .deny(&order.id, &profile_id("alice"), "no budget", CORRELATION_ID)
        .await
        .expect_err("viewer cannot deny");
    assert!(matches!(error, ApprovalError::Domain(DomainError::NotAuthorized { action: "deny", .. })));

    let denied = harness
        .service
        .deny(&order.id, &profile_id("carol"), "no budget", CORRELATION_ID)
        .await
        .expect("deny");
    assert_eq!(denied.status, OrderStatus::Denied);
    let history = harness.service.history(&order.id).await.expect("history");
    let event = history.iter().find(|e| e.event_type == "order.denied").expect("denied event");
    assert_eq!(event.outcome, AuditOutcome::Rejected);
    assert_eq!(event.metadata.get("reason").map(String::as_str), Some("no budget"));

    let error = harness.approve_as(&order.id, "dave").await.expect_err("denied is terminal");
    assert!(matches!(error, ApprovalError::Domain(DomainError::OrderNotPending { .. })));
}

#[tokio::test]
async fn approve_requires_approval_rights() {
    let ops = ops_directory();
    let harness = Harness::new(vec![ops.clone()], None).await;
    let order = owned_by(in_group(demo_order("ORD-101"), &ops), "zed");
    harness.submit(order.clone()).await;

    for outsider in ["mallory", "alice"] {
        let error = harness.approve_as(&order.id, outsider).await.expect_err("no approval rights");
        assert!(matches!(
            error,
            ApprovalError::Domain(DomainError::NotAuthorized { action: "approve", .. })
        ));
    }
    let stored = harness.order(&order.id).await;
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.approved_by, None);
    assert_eq!(harness.job_count(&order.id).await, 0);

    let outcome = harness.approve_as(&order.id, "erin").await.expect("approver may approve");
    assert_eq!(outcome.order_status, OrderStatus::Active);
    assert_eq!(harness.order(&order.id).await.approved_by, Some(profile_id("erin")));
}

#[tokio::test]
async fn only_the_owner_can_cancel() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = demo_order("ORD-101");
    harness.submit(order.clone()).await;

    let error = harness
        .service
        .cancel(&order.id, &profile_id("bob"), CORRELATION_ID)
        .await
        .expect_err("only owner can cancel");
    assert!(matches!(error, ApprovalError::Domain(DomainError::NotAuthorized { action: "cancel", .. })));

    let canceled =
        harness.service.cancel(&order.id, &profile_id("alice"), CORRELATION_ID).await.expect("cancel");
    assert_eq!(canceled.status, OrderStatus::Canceled);
}

#[tokio::test]
async fn submitting_twice_is_an_invalid_transition() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = demo_order("ORD-102");
    harness.submit(order.clone()).await;
    let pending = harness.order(&order.id).await;

    let error = harness
        .service
        .submit_order(pending, CORRELATION_ID)
        .await
        .expect_err("resubmission should fail");

    assert!(matches!(
        error,
        ApprovalError::Domain(DomainError::InvalidOrderTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Pending
        })
    ));
}

#[tokio::test]
async fn unknown_orders_and_groups_are_reported() {
    let harness = Harness::new(vec![demo_directory()], None).await;

    let error = harness
        .approve_as(&OrderId("ORD-404".to_string()), "dave")
        .await
        .expect_err("missing order");
    assert!(matches!(error, ApprovalError::OrderNotFound(_)));

    let mut orphan = demo_order("ORD-405");
    orphan.group_id = quorum_core::GroupId("ghost".to_string());
    let error =
        harness.service.submit_order(orphan, CORRELATION_ID).await.expect_err("missing group");
    assert!(matches!(error, ApprovalError::GroupNotFound(_)));
}

#[tokio::test]
async fn status_report_lists_outstanding_roles_and_jobs() {
    let harness = Harness::new(vec![demo_directory()], None).await;
    let order = demo_order("ORD-110");
    harness.submit(order.clone()).await;
    harness.approve_as(&order.id, "bob").await.expect("partial approval");

    let report = harness.service.status_report(&order.id).await.expect("report");
    assert_eq!(report.status, OrderStatus::Pending);
    assert_eq!(report.outstanding_roles, vec![RoleName::new("security")]);
    assert!(report.jobs.is_empty());

    harness.approve_as(&order.id, "carol").await.expect("final approval");
    let report = harness.service.status_report(&order.id).await.expect("report");
    assert_eq!(report.status, OrderStatus::Active);
    assert!(report.approval.is_complete());
    assert_eq!(report.jobs.len(), 3);
    assert_eq!(report.jobs.iter().filter(|job| job.job_type == JobType::Provision).count(), 2);
}
