use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::job::{Job, JobId, JobStatus};
use crate::domain::order::{IllegalItem, OrderId, OrderItem};

/// Order items that survive legality checks, decommissions first.
#[derive(Clone, Debug, PartialEq)]
pub struct ItemSelection {
    pub items: Vec<OrderItem>,
    pub dropped: Vec<IllegalItem>,
}

pub fn select_items(items: &[OrderItem]) -> ItemSelection {
    let mut sorted: Vec<&OrderItem> = items.iter().collect();
    // Stable sort keeps submission order within a kind.
    sorted.sort_by_key(|item| item.kind);

    let mut selection = ItemSelection { items: Vec::new(), dropped: Vec::new() };
    for item in sorted {
        match item.legality() {
            Ok(()) => selection.items.push(item.clone()),
            Err(illegal) => selection.dropped.push(illegal),
        }
    }
    selection
}

/// One job per unit of quantity for every item, servers linked up front.
pub fn plan_jobs(
    order_id: &OrderId,
    items: &[OrderItem],
    parent_job: Option<&JobId>,
    now: DateTime<Utc>,
) -> Vec<Job> {
    items
        .iter()
        .flat_map(|item| {
            (0..item.effective_quantity()).map(move |_| Job {
                id: JobId(Uuid::new_v4().to_string()),
                order_id: order_id.clone(),
                order_item_id: item.id.clone(),
                job_type: item.kind.job_type(),
                status: JobStatus::Pending,
                servers: item.servers.clone(),
                parent_job: parent_job.cloned(),
                created_at: now,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::{plan_jobs, select_items};
    use crate::domain::job::{JobId, JobStatus, JobType};
    use crate::domain::order::{IllegalItem, OrderId, OrderItem, OrderItemId, OrderItemKind};
    use crate::domain::quota::ResourceUsage;

    fn item(id: &str, kind: OrderItemKind, quantity: Option<u32>, servers: &[&str]) -> OrderItem {
        OrderItem {
            id: OrderItemId(id.to_string()),
            kind,
            quantity,
            servers: servers.iter().map(|server| server.to_string()).collect(),
            arguments: BTreeMap::new(),
            usage: ResourceUsage::default(),
        }
    }

    #[test]
    fn selection_orders_decommissions_first_and_drops_illegal_items() {
        let selection = select_items(&[
            item("prov-1", OrderItemKind::Provision, Some(2), &[]),
            item("prov-0", OrderItemKind::Provision, Some(0), &[]),
            item("decom-1", OrderItemKind::Decommission, None, &["srv-1"]),
            item("mod-1", OrderItemKind::Modify, None, &[]),
        ]);

        let ids: Vec<&str> = selection.items.iter().map(|item| item.id.0.as_str()).collect();
        assert_eq!(ids, vec!["decom-1", "prov-1"]);
        assert_eq!(selection.dropped.len(), 2);
        assert!(selection.dropped.iter().any(|d| matches!(d, IllegalItem::ZeroQuantity { .. })));
    }

    #[test]
    fn jobs_are_sized_by_quantity_with_default_of_one() {
        let items = vec![
            item("decom-1", OrderItemKind::Decommission, None, &["srv-1", "srv-2"]),
            item("prov-1", OrderItemKind::Provision, Some(3), &[]),
        ];
        let parent = JobId("JOB-PARENT".to_string());

        let jobs = plan_jobs(&OrderId("ORD-1".to_string()), &items, Some(&parent), Utc::now());

        assert_eq!(jobs.len(), 4);
        assert_eq!(jobs[0].job_type, JobType::Decommission);
        assert_eq!(jobs[0].servers, vec!["srv-1".to_string(), "srv-2".to_string()]);
        assert_eq!(jobs.iter().filter(|job| job.job_type == JobType::Provision).count(), 3);
        assert!(jobs.iter().all(|job| job.status == JobStatus::Pending));
        assert!(jobs.iter().all(|job| job.parent_job.as_ref() == Some(&parent)));
    }

    #[test]
    fn no_items_plan_no_jobs() {
        assert!(plan_jobs(&OrderId("ORD-2".to_string()), &[], None, Utc::now()).is_empty());
    }
}
