use quorum_core::domain::directory::ProfileId;
use quorum_core::domain::order::{Order, OrderId};

use crate::commands::{
    approval_failure, approval_service, correlation_id, with_pool, CommandResult, Failure,
};

pub fn run(order_id: &str, profile: &str) -> CommandResult {
    let correlation_id = &correlation_id();
    let order_id = &OrderId(order_id.to_string());
    let profile = &ProfileId(profile.to_string());

    let result = with_pool("cancel", |config, pool| async move {
        let order = approval_service(&config, &pool)
            .cancel(order_id, profile, correlation_id)
            .await
            .map_err(|error| approval_failure(error, correlation_id))?;
        Ok::<Order, Failure>(order)
    });

    match result {
        Ok(order) => CommandResult::success_with_data(
            "cancel",
            format!("order {} canceled", order.id),
            &order,
        ),
        Err(failure) => failure,
    }
}
