use sqlx::sqlite::SqliteRow;

use quorum_core::approvals::ports::JobRepository;
use quorum_core::domain::job::{Job, JobId, JobStatus, JobType};
use quorum_core::domain::order::{OrderId, OrderItemId};
use quorum_core::errors::ApprovalError;

use super::{column, parse_timestamp, RepositoryError};
use crate::DbPool;

pub struct SqlJobRepository {
    pool: DbPool,
}

impl SqlJobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn insert_all(&self, jobs: &[Job]) -> Result<(), RepositoryError> {
        if jobs.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for job in jobs {
            sqlx::query(
                "INSERT INTO jobs (id, order_id, order_item_id, job_type, status, servers_json,
                                   parent_job_id, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&job.id.0)
            .bind(&job.order_id.0)
            .bind(&job.order_item_id.0)
            .bind(job.job_type.as_str())
            .bind(job.status.as_str())
            .bind(serde_json::to_string(&job.servers)?)
            .bind(job.parent_job.as_ref().map(|parent| parent.0.clone()))
            .bind(job.created_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn list(&self, order_id: &OrderId) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, order_id, order_item_id, job_type, status, servers_json, parent_job_id,
                    created_at
             FROM jobs WHERE order_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&order_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_job).collect()
    }
}

fn row_to_job(row: &SqliteRow) -> Result<Job, RepositoryError> {
    let job_type_raw: String = column(row, "job_type")?;
    let status_raw: String = column(row, "status")?;
    let servers: String = column(row, "servers_json")?;
    let parent: Option<String> = column(row, "parent_job_id")?;
    let created_at: String = column(row, "created_at")?;

    Ok(Job {
        id: JobId(column(row, "id")?),
        order_id: OrderId(column(row, "order_id")?),
        order_item_id: OrderItemId(column(row, "order_item_id")?),
        job_type: JobType::parse(&job_type_raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown job type `{job_type_raw}`")))?,
        status: JobStatus::parse(&status_raw)
            .ok_or_else(|| RepositoryError::Decode(format!("unknown job status `{status_raw}`")))?,
        servers: serde_json::from_str(&servers)?,
        parent_job: parent.map(JobId),
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait::async_trait]
impl JobRepository for SqlJobRepository {
    async fn create_jobs(&self, jobs: &[Job]) -> Result<(), ApprovalError> {
        Ok(self.insert_all(jobs).await?)
    }

    async fn list_for_order(&self, order_id: &OrderId) -> Result<Vec<Job>, ApprovalError> {
        Ok(self.list(order_id).await?)
    }
}
