//! Multilevel order approval: who must sign off, when an order may skip
//! human approval, and how an approved order fans out into jobs.

pub mod fanout;
pub mod hooks;
pub mod notify;
pub mod policy;
pub mod ports;
pub mod quorum;
pub mod service;

pub use fanout::{plan_jobs, select_items, ItemSelection};
pub use hooks::{HookFailure, HookPoint, HookRegistry, HookRunner};
pub use notify::{ApprovalNotice, ApproverNotifier, RecordingNotifier, TracingNotifier};
pub use policy::{decide_auto_approval, AutoApproval};
pub use ports::{
    DirectoryRepository, JobRepository, LedgerRepository, OrderRepository, QuotaRepository,
};
pub use quorum::{QuorumResolver, DEFAULT_GENERIC_APPROVER_ROLE};
pub use service::{
    ApprovalOutcome, ApprovalPorts, ApprovalService, ApprovalSettings, ApprovalStart,
    OrderStatusReport,
};
