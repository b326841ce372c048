pub mod approvals;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod ledger;

pub use approvals::{
    ApprovalOutcome, ApprovalPorts, ApprovalService, ApprovalSettings, ApprovalStart,
    AutoApproval, HookPoint, HookRegistry, OrderStatusReport, QuorumResolver,
};
pub use audit::{AuditContext, AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use domain::directory::{
    Group, GroupDirectory, GroupId, GroupRoleMembership, Permission, ProfileId, Role, RoleName,
};
pub use domain::job::{Job, JobId, JobStatus, JobType};
pub use domain::order::{Order, OrderId, OrderItem, OrderItemId, OrderItemKind, OrderStatus};
pub use domain::quota::{QuotaResource, QuotaSet, ResourceLimits, ResourceUsage};
pub use errors::{ApplicationError, ApprovalError, DomainError, InterfaceError, QuotaError};
pub use ledger::{ApprovalLedger, ClaimOutcome, LedgerEntry, LedgerProgress, LedgerView};
