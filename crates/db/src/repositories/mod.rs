use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use quorum_core::errors::ApprovalError;

pub mod directory;
pub mod history;
pub mod job;
pub mod ledger;
pub mod memory;
pub mod order;
pub mod quota;

pub use directory::SqlDirectoryRepository;
pub use history::SqlOrderHistory;
pub use job::SqlJobRepository;
pub use ledger::SqlLedgerRepository;
pub use memory::{
    InMemoryDirectoryRepository, InMemoryJobRepository, InMemoryLedgerRepository,
    InMemoryOrderRepository, InMemoryQuotaRepository,
};
pub use order::SqlOrderRepository;
pub use quota::SqlQuotaRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("write conflict: {0}")]
    Conflict(String),
}

impl From<RepositoryError> for ApprovalError {
    fn from(error: RepositoryError) -> Self {
        ApprovalError::Persistence(error.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(error: serde_json::Error) -> Self {
        RepositoryError::Decode(error.to_string())
    }
}

pub(crate) fn column<'r, T>(row: &'r SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|e| RepositoryError::Decode(format!("{name}: {e}")))
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid timestamp `{raw}`: {e}")))
}
