//! Job status and live progress models

use serde::{Deserialize, Serialize};

/// Persistent job status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Stage of a live job, as shown on the progress surface
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// Files discovered and ordered, waiting for the user to start conversion
    #[default]
    Preview,
    /// Conversion started, document count known
    Found,
    /// Converting document `current` of `total`
    Converting,
    /// Merging the per-document PDFs into one
    Merging,
    Done,
    Error,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Preview => "preview",
            JobStage::Found => "found",
            JobStage::Converting => "converting",
            JobStage::Merging => "merging",
            JobStage::Done => "done",
            JobStage::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Done | JobStage::Error)
    }
}

/// Live progress snapshot for one job.
///
/// Served verbatim on the progress endpoint; the persistent `jobs` row only
/// records state transitions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobProgress {
    pub job_id: String,
    pub stage: JobStage,
    /// Total documents in the job
    pub total: usize,
    /// 1-based index of the document currently converting
    pub current: usize,
    pub current_file: String,
    /// Names of documents processed so far, in conversion order
    pub file_names: Vec<String>,
    /// Documents that failed to convert
    pub failed: Vec<String>,
    /// Page count of the merged PDF, once known
    pub total_pages: Option<usize>,
    /// Output filename, once stored
    pub filename: Option<String>,
    pub error: Option<String>,
    pub done: bool,
}

impl JobProgress {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            ..Default::default()
        }
    }

    /// Progress percentage (0-100) for the conversion phase
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64) * 100.0
        }
    }
}
