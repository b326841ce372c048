use quorum_core::approvals::ApprovalOutcome;
use quorum_core::domain::directory::ProfileId;
use quorum_core::domain::job::JobId;
use quorum_core::domain::order::OrderId;

use crate::commands::{
    approval_failure, approval_service, correlation_id, with_pool, CommandResult, Failure,
};

pub fn run(order_id: &str, profile: &str, parent_job: Option<&str>) -> CommandResult {
    let correlation_id = &correlation_id();
    let order_id = &OrderId(order_id.to_string());
    let approver = &ProfileId(profile.to_string());
    let parent_job = &parent_job.map(|job| JobId(job.to_string()));

    let result = with_pool("approve", |config, pool| async move {
        let outcome = approval_service(&config, &pool)
            .approve(order_id, approver, parent_job.as_ref(), correlation_id)
            .await
            .map_err(|error| approval_failure(error, correlation_id))?;
        Ok::<ApprovalOutcome, Failure>(outcome)
    });

    match result {
        Ok(outcome) => {
            CommandResult::success_with_data("approve", outcome.message.clone(), &outcome)
        }
        Err(failure) => failure,
    }
}
