use quorum_core::approvals::ApprovalStart;
use quorum_core::domain::order::OrderId;
use quorum_core::errors::ApprovalError;
use quorum_db::repositories::SqlOrderRepository;

use crate::commands::{
    approval_failure, approval_service, correlation_id, with_pool, CommandResult, Failure,
};

pub fn run(order_id: &str) -> CommandResult {
    let correlation_id = &correlation_id();
    let order_id = &OrderId(order_id.to_string());

    let result = with_pool("submit", |config, pool| async move {
        let cart = SqlOrderRepository::new(pool.clone())
            .load(order_id)
            .await
            .map_err(ApprovalError::from)
            .and_then(|cart| cart.ok_or_else(|| ApprovalError::OrderNotFound(order_id.clone())))
            .map_err(|error| approval_failure(error, correlation_id))?;

        let start = approval_service(&config, &pool)
            .submit_order(cart, correlation_id)
            .await
            .map_err(|error| approval_failure(error, correlation_id))?;
        Ok::<ApprovalStart, Failure>(start)
    });

    match result {
        Ok(start) => {
            CommandResult::success_with_data("submit", start_message(order_id, &start), &start)
        }
        Err(failure) => failure,
    }
}

fn start_message(order_id: &OrderId, start: &ApprovalStart) -> String {
    match start {
        ApprovalStart::DelegatedToHooks => {
            format!("order {order_id} submitted; approval handed to order_approval hooks")
        }
        ApprovalStart::AutoApproved { reason, outcome } => {
            format!("{} (auto-approved: {})", outcome.message, reason.as_str())
        }
        ApprovalStart::AwaitingApproval { notified, outstanding_roles }
            if outstanding_roles.is_empty() =>
        {
            format!("order {order_id} submitted; {} approver(s) notified", notified.len())
        }
        ApprovalStart::AwaitingApproval { notified, outstanding_roles } => {
            let roles: Vec<&str> = outstanding_roles.iter().map(|role| role.as_str()).collect();
            format!(
                "order {order_id} submitted; awaiting {} from {} approver(s)",
                roles.join(", "),
                notified.len()
            )
        }
    }
}
