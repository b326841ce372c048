use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::directory::{GroupId, ProfileId};
use crate::domain::order::{OrderId, OrderStatus};
use crate::domain::quota::QuotaResource;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid order transition from {from} to {to}")]
    InvalidOrderTransition { from: OrderStatus, to: OrderStatus },
    #[error("order `{order_id}` cannot be approved from status {status}; only PENDING orders can")]
    OrderNotPending { order_id: OrderId, status: OrderStatus },
    #[error("profile `{profile}` is not allowed to {action} order `{order_id}`")]
    NotAuthorized { profile: ProfileId, order_id: OrderId, action: &'static str },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QuotaError {
    #[error(
        "quota exceeded for group `{group}`: {resource} requested {requested}, {available} available"
    )]
    Exceeded { group: GroupId, resource: QuotaResource, requested: Decimal, available: Decimal },
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApprovalError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Quota(#[from] QuotaError),
    #[error("{hook_point} hook failed for order `{order_id}`: {message}")]
    HookFailed { order_id: OrderId, hook_point: String, message: String },
    #[error("order `{0}` not found")]
    OrderNotFound(OrderId),
    #[error("group `{0}` not found")]
    GroupNotFound(GroupId),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("notification failure: {0}")]
    Notification(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        Self::Approval(ApprovalError::Domain(value))
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The order could not be processed. Check its status and your permissions."
            }
            Self::NotFound { .. } => "The requested order or group does not exist.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Approval(
                error @ (ApprovalError::Domain(_)
                | ApprovalError::Quota(_)
                | ApprovalError::HookFailed { .. }),
            ) => Self::BadRequest { message: error.to_string(), correlation_id },
            ApplicationError::Approval(
                error @ (ApprovalError::OrderNotFound(_) | ApprovalError::GroupNotFound(_)),
            ) => Self::NotFound { message: error.to_string(), correlation_id },
            ApplicationError::Approval(ApprovalError::Persistence(message))
            | ApplicationError::Approval(ApprovalError::Notification(message)) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}
