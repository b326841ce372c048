use quorum_core::approvals::OrderStatusReport;
use quorum_core::audit::AuditEvent;
use quorum_core::domain::order::OrderId;
use serde::Serialize;

use crate::commands::{
    approval_failure, approval_service, correlation_id, with_pool, CommandResult, Failure,
};

#[derive(Debug, Serialize)]
struct StatusOutput {
    report: OrderStatusReport,
    history: Vec<AuditEvent>,
}

pub fn run(order_id: &str) -> CommandResult {
    let correlation_id = &correlation_id();
    let order_id = &OrderId(order_id.to_string());

    let result = with_pool("status", |config, pool| async move {
        let service = approval_service(&config, &pool);
        let report = service
            .status_report(order_id)
            .await
            .map_err(|error| approval_failure(error, correlation_id))?;
        let history = service
            .history(order_id)
            .await
            .map_err(|error| approval_failure(error, correlation_id))?;
        Ok::<StatusOutput, Failure>(StatusOutput { report, history })
    });

    match result {
        Ok(output) => {
            CommandResult::success_with_data("status", status_message(&output.report), &output)
        }
        Err(failure) => failure,
    }
}

fn status_message(report: &OrderStatusReport) -> String {
    if report.outstanding_roles.is_empty() {
        return format!(
            "order {} is {} with {} job(s)",
            report.order_id,
            report.status,
            report.jobs.len()
        );
    }

    let roles: Vec<&str> = report.outstanding_roles.iter().map(|role| role.as_str()).collect();
    format!("order {} is {} and awaits {}", report.order_id, report.status, roles.join(", "))
}
