pub mod approve;
pub mod cancel;
pub mod config;
pub mod deny;
pub mod doctor;
pub mod migrate;
pub mod seed;
pub mod status;
pub mod submit;

use std::future::Future;
use std::sync::Arc;

use quorum_core::approvals::{ApprovalPorts, ApprovalService, HookRegistry, TracingNotifier};
use quorum_core::config::{AppConfig, LoadOptions};
use quorum_core::errors::{ApplicationError, ApprovalError, InterfaceError};
use quorum_db::repositories::{
    SqlDirectoryRepository, SqlJobRepository, SqlLedgerRepository, SqlOrderHistory,
    SqlOrderRepository, SqlQuotaRepository,
};
use quorum_db::{connect_with_config, migrations, DbPool};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        Self::ok(command, message.into(), None)
    }

    /// Success payload carrying a structured `data` field next to the message.
    pub fn success_with_data(
        command: &str,
        message: impl Into<String>,
        data: &impl Serialize,
    ) -> Self {
        Self::ok(command, message.into(), serde_json::to_value(data).ok())
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
            data: None,
        };
        Self { exit_code, output: serialize_payload(payload) }
    }

    fn ok(command: &str, message: String, data: Option<serde_json::Value>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message,
            data,
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}

/// Error class, message and process exit code of a failed command.
pub(crate) type Failure = (&'static str, String, u8);

/// Loads config, opens a migrated pool and runs `body` on a current-thread
/// runtime. Setup failures are reported with the shared exit codes 2 to 5.
pub(crate) fn with_pool<T, F, Fut>(command: &str, body: F) -> Result<T, CommandResult>
where
    F: FnOnce(AppConfig, DbPool) -> Fut,
    Fut: Future<Output = Result<T, Failure>>,
{
    let config = AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            2,
        )
    })?;

    let runtime =
        tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
            CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            )
        })?;

    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let outcome = body(config, pool.clone()).await;
        pool.close().await;
        outcome
    });

    result.map_err(|(error_class, message, exit_code)| {
        CommandResult::failure(command, error_class, message, exit_code)
    })
}

pub(crate) fn approval_service(config: &AppConfig, pool: &DbPool) -> ApprovalService {
    let ports = ApprovalPorts {
        orders: Arc::new(SqlOrderRepository::new(pool.clone())),
        directory: Arc::new(SqlDirectoryRepository::new(pool.clone())),
        ledgers: Arc::new(SqlLedgerRepository::new(pool.clone())),
        jobs: Arc::new(SqlJobRepository::new(pool.clone())),
        quotas: Arc::new(SqlQuotaRepository::new(pool.clone())),
        hooks: Arc::new(HookRegistry::default()),
        notifier: Arc::new(TracingNotifier),
        audit: Arc::new(SqlOrderHistory::new(pool.clone())),
    };
    ApprovalService::new(ports, config.approvals.resolver(), config.approvals.settings())
}

pub(crate) fn correlation_id() -> String {
    format!("cli-{}", Uuid::new_v4())
}

/// Maps an engine error onto the interface error classes and exit codes 7 to 10.
pub(crate) fn approval_failure(error: ApprovalError, correlation_id: &str) -> Failure {
    let interface = ApplicationError::from(error).into_interface(correlation_id);
    let (error_class, exit_code) = match &interface {
        InterfaceError::BadRequest { .. } => ("bad_request", 7),
        InterfaceError::NotFound { .. } => ("not_found", 8),
        InterfaceError::ServiceUnavailable { .. } => ("service_unavailable", 9),
        InterfaceError::Internal { .. } => ("internal", 10),
    };
    (error_class, format!("{interface} (correlation_id: {correlation_id})"), exit_code)
}

#[cfg(test)]
mod tests {
    use quorum_core::domain::order::{OrderId, OrderStatus};
    use quorum_core::errors::{ApprovalError, DomainError};

    use super::{approval_failure, CommandResult};

    #[test]
    fn not_pending_orders_fail_as_bad_request() {
        let (error_class, message, exit_code) = approval_failure(
            ApprovalError::from(DomainError::OrderNotPending {
                order_id: OrderId("ORD-1".to_string()),
                status: OrderStatus::Active,
            }),
            "cli-test",
        );

        assert_eq!(error_class, "bad_request");
        assert_eq!(exit_code, 7);
        assert!(message.contains("ACTIVE"));
        assert!(message.ends_with("(correlation_id: cli-test)"));
    }

    #[test]
    fn missing_orders_fail_as_not_found() {
        let (error_class, _, exit_code) =
            approval_failure(ApprovalError::OrderNotFound(OrderId("ORD-404".to_string())), "c");

        assert_eq!((error_class, exit_code), ("not_found", 8));
    }

    #[test]
    fn data_is_omitted_from_plain_success_payloads() {
        let plain = CommandResult::success("migrate", "applied pending migrations");
        let with_data =
            CommandResult::success_with_data("status", "order is PENDING", &vec!["finance"]);

        assert!(!plain.output.contains("\"data\""));
        assert!(with_data.output.contains("\"data\":[\"finance\"]"));
    }
}
