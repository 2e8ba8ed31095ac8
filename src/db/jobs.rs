//! Job database queries.
//!
//! One row per upload-and-convert job. Rows are created when an upload is
//! accepted and updated at state transitions; completed rows back the
//! "My Files" listing and downloads across restarts.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::DbPool;
use crate::models::JobStatus;
use crate::{Error, Result};

/// Job record from the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub user_id: String,
    /// Output filename shown in listings
    pub filename: String,
    /// Absolute path of the stored artifact, once completed
    pub file_path: Option<String>,
    /// 'pending', 'running', 'completed', 'failed'
    pub status: String,
    pub error: Option<String>,
    pub total_files: i64,
    pub processed_files: i64,
    pub total_pages: Option<i64>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl JobRecord {
    pub fn get_status(&self) -> Option<JobStatus> {
        JobStatus::from_str(&self.status)
    }

    pub fn is_finished(&self) -> bool {
        self.status == "completed" || self.status == "failed"
    }
}

/// Input for creating a job.
#[derive(Debug, Clone)]
pub struct CreateJob {
    pub id: String,
    pub user_id: String,
    pub filename: String,
    pub total_files: i64,
}

/// Create a new pending job.
pub async fn create_job(pool: &DbPool, input: CreateJob) -> Result<JobRecord> {
    let job = sqlx::query_as::<_, JobRecord>(
        r#"
        INSERT INTO jobs (id, user_id, filename, total_files)
        VALUES (?, ?, ?, ?)
        RETURNING *
        "#,
    )
    .bind(&input.id)
    .bind(&input.user_id)
    .bind(&input.filename)
    .bind(input.total_files)
    .fetch_one(pool)
    .await?;

    Ok(job)
}

/// Get a job by ID.
pub async fn get_job(pool: &DbPool, id: &str) -> Result<JobRecord> {
    sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| Error::NotFound(format!("Job {}", id)))
}

/// Mark a job as running with its final document count.
pub async fn mark_job_running(pool: &DbPool, id: &str, total_files: i64) -> Result<()> {
    sqlx::query("UPDATE jobs SET status = 'running', total_files = ? WHERE id = ?")
        .bind(total_files)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Mark a job as completed with its stored artifact.
pub async fn mark_job_completed(
    pool: &DbPool,
    id: &str,
    filename: &str,
    file_path: &str,
    total_pages: i64,
    processed_files: i64,
) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'completed', filename = ?, file_path = ?, total_pages = ?,
            processed_files = ?, completed_at = datetime('now')
        WHERE id = ?
        "#,
    )
    .bind(filename)
    .bind(file_path)
    .bind(total_pages)
    .bind(processed_files)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Mark a job as failed.
pub async fn mark_job_failed(pool: &DbPool, id: &str, error: &str) -> Result<()> {
    sqlx::query(
        "UPDATE jobs SET status = 'failed', error = ?, completed_at = datetime('now') WHERE id = ?",
    )
    .bind(error)
    .bind(id)
    .execute(pool)
    .await?;
    Ok(())
}

/// List a user's completed jobs, newest first.
pub async fn list_completed_jobs(pool: &DbPool, user_id: &str) -> Result<Vec<JobRecord>> {
    let jobs = sqlx::query_as(
        r#"
        SELECT * FROM jobs
        WHERE user_id = ? AND status = 'completed'
        ORDER BY created_at DESC, id DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(jobs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::models::JobStatus;

    async fn pool_with_user() -> (DbPool, String) {
        let pool = db::init_pool(":memory:").await.unwrap();
        db::initialize_schema(&pool).await.unwrap();
        let user = db::register(&pool, "ivan", "pass123").await.unwrap();
        (pool, user.id)
    }

    #[tokio::test]
    async fn test_job_lifecycle() {
        let (pool, user_id) = pool_with_user().await;

        let job = create_job(
            &pool,
            CreateJob {
                id: "job-1".into(),
                user_id: user_id.clone(),
                filename: "report.pdf".into(),
                total_files: 3,
            },
        )
        .await
        .unwrap();
        assert_eq!(job.get_status(), Some(JobStatus::Pending));

        mark_job_running(&pool, "job-1", 3).await.unwrap();
        mark_job_completed(&pool, "job-1", "report.pdf", "/data/outputs/u/report.pdf", 12, 3)
            .await
            .unwrap();

        let job = get_job(&pool, "job-1").await.unwrap();
        assert_eq!(job.get_status(), Some(JobStatus::Completed));
        assert_eq!(job.total_pages, Some(12));
        assert!(job.completed_at.is_some());

        let listed = list_completed_jobs(&pool, &user_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "job-1");
    }

    #[tokio::test]
    async fn test_failed_job_not_listed() {
        let (pool, user_id) = pool_with_user().await;

        create_job(
            &pool,
            CreateJob {
                id: "job-2".into(),
                user_id: user_id.clone(),
                filename: "broken.pdf".into(),
                total_files: 1,
            },
        )
        .await
        .unwrap();
        mark_job_failed(&pool, "job-2", "no documents could be converted")
            .await
            .unwrap();

        let job = get_job(&pool, "job-2").await.unwrap();
        assert_eq!(job.get_status(), Some(JobStatus::Failed));
        assert!(list_completed_jobs(&pool, &user_id).await.unwrap().is_empty());
    }
}
