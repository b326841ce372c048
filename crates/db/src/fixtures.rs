use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use rust_decimal::Decimal;

use quorum_core::domain::directory::{
    Group, GroupDirectory, GroupId, GroupRoleMembership, Permission, ProfileId, Role, RoleName,
};
use quorum_core::domain::order::{
    Order, OrderId, OrderItem, OrderItemId, OrderItemKind, OrderStatus,
};
use quorum_core::domain::quota::{QuotaSet, ResourceLimits, ResourceUsage};

use crate::connection::DbPool;
use crate::repositories::{
    RepositoryError, SqlDirectoryRepository, SqlOrderRepository, SqlQuotaRepository,
};

pub const DEMO_GROUP_ID: &str = "eng";
pub const SANDBOX_GROUP_ID: &str = "sandbox";
pub const DEMO_ORDER_ID: &str = "ORD-DEMO-001";

/// (profile, group, role) rows of the demo directory. `dave` alone covers the
/// whole engineering quorum; `bob` and `carol` each hold one seat.
const DEMO_MEMBERSHIPS: &[(&str, &str, &str)] = &[
    ("alice", DEMO_GROUP_ID, "viewer"),
    ("bob", DEMO_GROUP_ID, "finance"),
    ("carol", DEMO_GROUP_ID, "security"),
    ("dave", DEMO_GROUP_ID, "approver"),
    ("dave", DEMO_GROUP_ID, "finance"),
    ("dave", DEMO_GROUP_ID, "security"),
    ("erin", DEMO_GROUP_ID, "approver"),
    ("alice", SANDBOX_GROUP_ID, "viewer"),
];

fn role(name: &str, label: &str, approves: bool) -> Role {
    let permissions: BTreeSet<Permission> =
        if approves { [Permission::order_approve()].into_iter().collect() } else { BTreeSet::new() };
    Role { name: RoleName::new(name), label: label.to_string(), permissions }
}

fn role_catalog() -> BTreeMap<RoleName, Role> {
    [
        role("approver", "Approver", true),
        role("finance", "Finance", true),
        role("security", "Security", true),
        role("viewer", "Viewer", false),
    ]
    .into_iter()
    .map(|role| (role.name.clone(), role))
    .collect()
}

fn memberships_for(group_id: &str) -> Vec<GroupRoleMembership> {
    DEMO_MEMBERSHIPS
        .iter()
        .filter(|(_, group, _)| *group == group_id)
        .map(|(profile, group, role)| GroupRoleMembership::new(*profile, *group, *role))
        .collect()
}

/// Engineering group: quorum derived from memberships (finance + security).
pub fn demo_directory() -> GroupDirectory {
    GroupDirectory {
        group: Group {
            id: GroupId(DEMO_GROUP_ID.to_string()),
            name: "Engineering".to_string(),
            allow_auto_approval: false,
            quorum: None,
        },
        roles: role_catalog(),
        memberships: memberships_for(DEMO_GROUP_ID),
    }
}

/// Sandbox group: every order is auto-approved.
pub fn sandbox_directory() -> GroupDirectory {
    GroupDirectory {
        group: Group {
            id: GroupId(SANDBOX_GROUP_ID.to_string()),
            name: "Sandbox".to_string(),
            allow_auto_approval: true,
            quorum: None,
        },
        roles: role_catalog(),
        memberships: memberships_for(SANDBOX_GROUP_ID),
    }
}

pub fn demo_quota() -> QuotaSet {
    QuotaSet {
        group_id: GroupId(DEMO_GROUP_ID.to_string()),
        limits: ResourceLimits {
            cpu_cnt: Some(Decimal::from(64)),
            mem_size: Some(Decimal::from(256)),
            disk_size: Some(Decimal::from(2000)),
            vm_cnt: Some(Decimal::from(20)),
            rate: None,
        },
        used: ResourceUsage {
            cpu_cnt: Decimal::from(8),
            mem_size: Decimal::from(32),
            disk_size: Decimal::from(200),
            vm_cnt: Decimal::from(2),
            rate: Decimal::ZERO,
        },
    }
}

/// A cart owned by `alice` in the engineering group: two new VMs and the
/// retirement of a legacy server.
pub fn demo_order(id: &str) -> Order {
    let now = Utc::now();
    let vm_usage = ResourceUsage {
        cpu_cnt: Decimal::from(2),
        mem_size: Decimal::from(4),
        disk_size: Decimal::from(50),
        vm_cnt: Decimal::ONE,
        rate: Decimal::new(125, 2),
    };

    Order {
        id: OrderId(id.to_string()),
        group_id: GroupId(DEMO_GROUP_ID.to_string()),
        owner: ProfileId("alice".to_string()),
        status: OrderStatus::Cart,
        approved_by: None,
        approve_date: None,
        items: vec![
            OrderItem {
                id: OrderItemId(format!("{id}-prov")),
                kind: OrderItemKind::Provision,
                quantity: Some(2),
                servers: Vec::new(),
                arguments: BTreeMap::from([(
                    "hostname_template".to_string(),
                    serde_json::Value::String("web-{{ n }}".to_string()),
                )]),
                usage: vm_usage,
            },
            OrderItem {
                id: OrderItemId(format!("{id}-decom")),
                kind: OrderItemKind::Decommission,
                quantity: None,
                servers: vec!["srv-legacy-01".to_string()],
                arguments: BTreeMap::new(),
                usage: vm_usage,
            },
        ],
        created_at: now,
        updated_at: now,
    }
}

/// Demo directory, quota and cart used by `quorum seed`.
pub struct DemoDataset;

impl DemoDataset {
    /// Idempotent: the demo cart is only written when it does not exist yet.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let directories = SqlDirectoryRepository::new(pool.clone());
        let groups = [demo_directory(), sandbox_directory()];
        for directory in &groups {
            directories.save_directory(directory).await?;
        }

        // Usage recorded by approvals survives a re-seed.
        let quotas = SqlQuotaRepository::new(pool.clone());
        let quota = demo_quota();
        if quotas.load(&quota.group_id).await?.is_none() {
            quotas.save(&quota).await?;
        }

        let orders = SqlOrderRepository::new(pool.clone());
        let order_id = OrderId(DEMO_ORDER_ID.to_string());
        let order_created = match orders.load(&order_id).await? {
            Some(_) => false,
            None => {
                orders.store(&demo_order(DEMO_ORDER_ID)).await?;
                true
            }
        };

        Ok(SeedResult {
            groups_seeded: groups.iter().map(|d| d.group.id.0.clone()).collect(),
            memberships_seeded: DEMO_MEMBERSHIPS.len(),
            order_id: DEMO_ORDER_ID,
            order_created,
        })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        let group_count: i64 = sqlx::query_scalar("SELECT COUNT(1) FROM groups WHERE id IN (?, ?)")
            .bind(DEMO_GROUP_ID)
            .bind(SANDBOX_GROUP_ID)
            .fetch_one(pool)
            .await?;
        checks.push(("groups", group_count == 2));

        let membership_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM group_role_memberships WHERE group_id IN (?, ?)",
        )
        .bind(DEMO_GROUP_ID)
        .bind(SANDBOX_GROUP_ID)
        .fetch_one(pool)
        .await?;
        checks.push(("memberships", membership_count == DEMO_MEMBERSHIPS.len() as i64));

        let approving_roles: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM role_permissions WHERE permission = ?",
        )
        .bind(Permission::ORDER_APPROVE)
        .fetch_one(pool)
        .await?;
        checks.push(("approving-roles", approving_roles == 3));

        let quota_exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM quota_sets WHERE group_id = ?)")
                .bind(DEMO_GROUP_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("quota", quota_exists == 1));

        let order_exists: i64 =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM orders WHERE id = ?)")
                .bind(DEMO_ORDER_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("demo-order", order_exists == 1));

        let all_present = checks.iter().all(|(_, ok)| *ok);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the demo order with everything hanging off it, then the groups.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM order_history WHERE order_id = ?")
            .bind(DEMO_ORDER_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM orders WHERE group_id IN (?, ?)")
            .bind(DEMO_GROUP_ID)
            .bind(SANDBOX_GROUP_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM groups WHERE id IN (?, ?)")
            .bind(DEMO_GROUP_ID)
            .bind(SANDBOX_GROUP_ID)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub groups_seeded: Vec<String>,
    pub memberships_seeded: usize,
    pub order_id: &'static str,
    pub order_created: bool,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
