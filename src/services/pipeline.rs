//! Upload-and-convert job pipeline.
//!
//! Flow: an upload (ZIP archive or folder selection) is unpacked into a
//! scratch directory, supported documents are discovered and ordered, and the
//! job waits in `preview` while the user reviews the order. On start, each
//! document is converted through the engine (serialized process-wide), the
//! per-document PDFs are merged into one, and the result lands in the
//! uploading user's artifact partition.
//!
//! Live progress is kept in an in-memory registry; the persistent job row is
//! written at state transitions so completed jobs survive a restart.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::db::{self, DbPool};
use crate::models::{self, JobProgress, JobStage, JobStatus};
use crate::services::convert::{pdf_name_for, ConversionEngine};
use crate::services::{page_order, ArtifactStore};
use crate::{Error, Result};

/// One entry of the preview listing shown before conversion starts.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewFile {
    pub index: usize,
    pub name: String,
    /// Page number extracted from the filename; 0 when unknown
    pub page: u32,
}

/// Response to an upload: the ordered documents awaiting confirmation.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub job_id: String,
    pub stage: JobStage,
    pub files: Vec<PreviewFile>,
}

/// A job the process is currently holding: scratch state plus live progress.
struct ActiveJob {
    user_id: String,
    work_dir: PathBuf,
    /// Preview listing; the start order indexes into this
    files: Vec<PathBuf>,
    out_filename: String,
    progress: JobProgress,
}

/// The upload-and-convert pipeline service.
#[derive(Clone)]
pub struct JobPipeline {
    inner: Arc<PipelineInner>,
}

struct PipelineInner {
    db: DbPool,
    engine: Arc<dyn ConversionEngine>,
    store: Arc<ArtifactStore>,
    jobs: RwLock<HashMap<String, ActiveJob>>,
    /// Office engines are not reentrant: every conversion holds this lock,
    /// serializing conversions process-wide.
    convert_lock: Mutex<()>,
}

impl JobPipeline {
    pub fn new(db: DbPool, engine: Arc<dyn ConversionEngine>, store: Arc<ArtifactStore>) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                db,
                engine,
                store,
                jobs: RwLock::new(HashMap::new()),
                convert_lock: Mutex::new(()),
            }),
        }
    }

    /// Accept a ZIP upload: unpack, discover and order documents, and park
    /// the job in preview.
    pub async fn prepare_archive(
        &self,
        user_id: &str,
        data: Vec<u8>,
        upload_name: &str,
    ) -> Result<Preview> {
        let out_filename = output_filename(upload_name);
        let work_dir = scratch_dir()?;

        let dest = work_dir.clone();
        let extracted = tokio::task::spawn_blocking(move || extract_archive(&data, &dest))
            .await
            .map_err(|e| Error::Internal(format!("extract task: {}", e)))?;
        if let Err(e) = extracted {
            cleanup_dir(&work_dir).await;
            return Err(e);
        }

        self.register_preview(user_id, work_dir, out_filename).await
    }

    /// Accept a folder upload: stage the named files, keeping only supported
    /// documents, and park the job in preview.
    pub async fn prepare_files(
        &self,
        user_id: &str,
        files: Vec<(String, Vec<u8>)>,
    ) -> Result<Preview> {
        let work_dir = scratch_dir()?;

        let dest = work_dir.clone();
        let staged = tokio::task::spawn_blocking(move || stage_uploads(&dest, files))
            .await
            .map_err(|e| Error::Internal(format!("staging task: {}", e)))?;
        match staged {
            Err(e) => {
                cleanup_dir(&work_dir).await;
                return Err(e);
            }
            Ok(0) => {
                cleanup_dir(&work_dir).await;
                return Err(Error::InvalidInput(
                    "No .doc/.docx documents found in the upload".into(),
                ));
            }
            Ok(_) => {}
        }

        self.register_preview(user_id, work_dir, "merged.pdf".to_string())
            .await
    }

    async fn register_preview(
        &self,
        user_id: &str,
        work_dir: PathBuf,
        out_filename: String,
    ) -> Result<Preview> {
        let documents = page_order::sort_by_page(page_order::collect_documents(&work_dir));
        if documents.is_empty() {
            cleanup_dir(&work_dir).await;
            return Err(Error::InvalidInput(
                "No .doc/.docx documents found in the upload".into(),
            ));
        }

        let job_id = models::new_id();
        db::create_job(
            &self.inner.db,
            db::CreateJob {
                id: job_id.clone(),
                user_id: user_id.to_string(),
                filename: out_filename.clone(),
                total_files: documents.len() as i64,
            },
        )
        .await?;

        let preview = Preview {
            job_id: job_id.clone(),
            stage: JobStage::Preview,
            files: documents
                .iter()
                .enumerate()
                .map(|(index, path)| {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let page = page_order::extract_page_number(&name);
                    PreviewFile { index, name, page }
                })
                .collect(),
        };

        let mut progress = JobProgress::new(&job_id);
        progress.stage = JobStage::Preview;
        progress.total = documents.len();

        self.inner.jobs.write().await.insert(
            job_id.clone(),
            ActiveJob {
                user_id: user_id.to_string(),
                work_dir,
                files: documents,
                out_filename,
                progress,
            },
        );

        tracing::info!(job_id = %job_id, files = preview.files.len(), "job prepared for preview");
        Ok(preview)
    }

    /// Start converting a previewed job, in the user-chosen order. Indices
    /// outside the preview listing are ignored.
    pub async fn start(&self, job_id: &str, user_id: &str, order: &[usize]) -> Result<()> {
        let (files, work_dir, out_filename) = {
            let mut jobs = self.inner.jobs.write().await;
            let job = jobs
                .get_mut(job_id)
                .ok_or_else(|| Error::NotFound(format!("Job {}", job_id)))?;
            if job.user_id != user_id {
                return Err(Error::Forbidden);
            }
            if job.progress.stage != JobStage::Preview {
                return Err(Error::InvalidInput("Job already started or finished".into()));
            }

            let selected: Vec<PathBuf> = order
                .iter()
                .filter(|&&i| i < job.files.len())
                .map(|&i| job.files[i].clone())
                .collect();
            if selected.is_empty() {
                return Err(Error::InvalidInput("Select at least one document".into()));
            }

            job.progress.stage = JobStage::Found;
            job.progress.total = selected.len();
            job.progress.current = 0;
            (selected, job.work_dir.clone(), job.out_filename.clone())
        };

        let pipeline = self.clone();
        let job_id = job_id.to_string();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            pipeline
                .run(job_id, user_id, files, work_dir, out_filename)
                .await;
        });

        Ok(())
    }

    /// Live progress for a job, falling back to the persistent record for
    /// jobs from before a restart.
    pub async fn status(&self, job_id: &str, user_id: &str) -> Result<JobProgress> {
        if let Some(job) = self.inner.jobs.read().await.get(job_id) {
            if job.user_id != user_id {
                return Err(Error::Forbidden);
            }
            return Ok(job.progress.clone());
        }

        let record = db::get_job(&self.inner.db, job_id).await?;
        if record.user_id != user_id {
            return Err(Error::NotFound(format!("Job {}", job_id)));
        }
        Ok(progress_from_record(&record))
    }

    /// Resolve a completed job to its stored artifact for download.
    pub async fn artifact_for_download(
        &self,
        job_id: &str,
        user_id: &str,
    ) -> Result<(PathBuf, String)> {
        let record = db::get_job(&self.inner.db, job_id).await?;
        if record.user_id != user_id {
            return Err(Error::NotFound(format!("Job {}", job_id)));
        }
        match record.get_status() {
            Some(JobStatus::Completed) => {}
            Some(JobStatus::Failed) => {
                return Err(Error::InvalidInput("Job failed; there is no PDF".into()))
            }
            _ => return Err(Error::InvalidInput("PDF is not ready yet".into())),
        }

        let path = record
            .file_path
            .as_deref()
            .map(PathBuf::from)
            .ok_or_else(|| Error::FileNotFound(record.filename.clone()))?;
        if !path.exists() {
            return Err(Error::FileNotFound(record.filename.clone()));
        }
        Ok((path, record.filename))
    }

    async fn run(
        &self,
        job_id: String,
        user_id: String,
        files: Vec<PathBuf>,
        work_dir: PathBuf,
        out_filename: String,
    ) {
        let result = self
            .execute(&job_id, &user_id, &files, &work_dir, &out_filename)
            .await;

        if let Err(e) = result {
            tracing::warn!(job_id = %job_id, error = %e, "job failed");
            let message = e.to_string();
            if let Err(db_err) = db::mark_job_failed(&self.inner.db, &job_id, &message).await {
                tracing::error!(job_id = %job_id, error = %db_err, "could not record job failure");
            }
            self.update_progress(&job_id, |p| {
                p.stage = JobStage::Error;
                p.error = Some(message);
                p.done = true;
            })
            .await;
        }

        cleanup_dir(&work_dir).await;
    }

    async fn execute(
        &self,
        job_id: &str,
        user_id: &str,
        files: &[PathBuf],
        work_dir: &Path,
        out_filename: &str,
    ) -> Result<()> {
        db::mark_job_running(&self.inner.db, job_id, files.len() as i64).await?;

        let pdf_dir = work_dir.join("pdfs");
        tokio::fs::create_dir_all(&pdf_dir).await?;

        let mut converted: Vec<PathBuf> = Vec::new();
        let mut failed: Vec<String> = Vec::new();

        for (idx, document) in files.iter().enumerate() {
            let name = document
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();

            let progress_name = name.clone();
            self.update_progress(job_id, |p| {
                p.stage = JobStage::Converting;
                p.current = idx + 1;
                p.current_file = progress_name.clone();
                p.file_names.push(progress_name);
            })
            .await;

            let target = pdf_dir.join(pdf_name_for(document)?);

            let outcome = {
                let _guard = self.inner.convert_lock.lock().await;
                self.inner.engine.convert(document, &target).await
            };

            match outcome {
                Ok(()) => converted.push(target),
                Err(e) => {
                    tracing::warn!(job_id = %job_id, file = %name, error = %e, "conversion failed");
                    let failed_name = name.clone();
                    self.update_progress(job_id, |p| p.failed.push(failed_name)).await;
                    failed.push(name);
                }
            }
        }

        if converted.is_empty() {
            return Err(Error::ConversionFailed(format!(
                "No documents could be converted: {}",
                summarize_failures(&failed)
            )));
        }

        self.update_progress(job_id, |p| {
            p.stage = JobStage::Merging;
            p.current_file.clear();
        })
        .await;

        let merged_path = work_dir.join("merged.pdf");
        let inputs = converted.clone();
        let merge_target = merged_path.clone();
        let pages =
            tokio::task::spawn_blocking(move || super::merge_pdf_files(&inputs, &merge_target))
                .await
                .map_err(|e| Error::Internal(format!("merge task: {}", e)))??;

        let stored = self
            .inner
            .store
            .store_file(user_id, out_filename, &merged_path)
            .await?;

        db::mark_job_completed(
            &self.inner.db,
            job_id,
            &stored.filename,
            &stored.path.to_string_lossy(),
            pages as i64,
            converted.len() as i64,
        )
        .await?;

        let stored_name = stored.filename.clone();
        self.update_progress(job_id, |p| {
            p.stage = JobStage::Done;
            p.total_pages = Some(pages);
            p.filename = Some(stored_name);
            p.done = true;
        })
        .await;

        tracing::info!(
            job_id = %job_id,
            pages,
            failed = failed.len(),
            "job completed"
        );
        Ok(())
    }

    async fn update_progress<F: FnOnce(&mut JobProgress)>(&self, job_id: &str, f: F) {
        if let Some(job) = self.inner.jobs.write().await.get_mut(job_id) {
            f(&mut job.progress);
        }
    }
}

/// Derive the output filename from the uploaded archive's name.
fn output_filename(upload_name: &str) -> String {
    let stem = Path::new(upload_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .trim();
    let stem: String = stem.chars().take(50).collect();
    if stem.is_empty() {
        "report.pdf".to_string()
    } else {
        format!("{}.pdf", stem)
    }
}

fn scratch_dir() -> Result<PathBuf> {
    tempfile::Builder::new()
        .prefix("bindery-job-")
        .tempdir()
        .map(|dir| dir.into_path())
        .map_err(|e| Error::Internal(format!("scratch dir: {}", e)))
}

async fn cleanup_dir(dir: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(dir = %dir.display(), error = %e, "scratch cleanup failed");
        }
    }
}

/// Unpack a ZIP archive into `dest`. Entries that would escape `dest`
/// (zip-slip) are skipped.
fn extract_archive(data: &[u8], dest: &Path) -> Result<()> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| Error::InvalidInput(format!("Not a valid ZIP archive: {}", e)))?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let Some(rel) = entry.enclosed_name() else {
            tracing::warn!(entry = %entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let target = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = std::fs::File::create(&target)?;
        std::io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// Write folder-upload files into `dest`, preserving relative paths. Only
/// supported documents with safe relative names are kept; returns how many
/// were written.
fn stage_uploads(dest: &Path, files: Vec<(String, Vec<u8>)>) -> Result<usize> {
    let mut written = 0;
    for (name, bytes) in files {
        if !page_order::is_supported_document(&name) {
            continue;
        }
        let Some(target) = relative_target(dest, &name) else {
            tracing::warn!(file = %name, "skipping upload with unsafe path");
            continue;
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &bytes)?;
        written += 1;
    }
    Ok(written)
}

/// Join an upload's relative name onto `dest`, rejecting absolute paths and
/// parent components.
fn relative_target(dest: &Path, name: &str) -> Option<PathBuf> {
    let name = name.replace('\\', "/");
    let rel = Path::new(&name);
    if rel
        .components()
        .all(|c| matches!(c, Component::Normal(_)))
    {
        Some(dest.join(rel))
    } else {
        None
    }
}

fn summarize_failures(failed: &[String]) -> String {
    let mut summary = failed.iter().take(5).cloned().collect::<Vec<_>>().join(", ");
    if failed.len() > 5 {
        summary.push_str(&format!(" (+{} more)", failed.len() - 5));
    }
    summary
}

fn progress_from_record(record: &db::JobRecord) -> JobProgress {
    let mut progress = JobProgress::new(&record.id);
    progress.total = record.total_files as usize;
    progress.current = record.processed_files as usize;
    progress.total_pages = record.total_pages.map(|n| n as usize);
    progress.filename = Some(record.filename.clone());
    progress.error = record.error.clone();
    progress.stage = match record.get_status() {
        Some(JobStatus::Completed) => {
            progress.done = true;
            JobStage::Done
        }
        Some(JobStatus::Failed) => {
            progress.done = true;
            JobStage::Error
        }
        Some(JobStatus::Running) => JobStage::Converting,
        _ => JobStage::Preview,
    };
    progress
}
