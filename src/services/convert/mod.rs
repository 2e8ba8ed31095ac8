//! Document-to-PDF conversion engines.
//!
//! One trait, two implementations: LibreOffice headless (Linux and anywhere
//! else with a `soffice` binary) and Microsoft Word COM automation (Windows).
//! The engine is selected once at startup by capability detection, never per
//! call. Neither engine is safe to run concurrently with itself, so the
//! pipeline serializes all conversions behind one lock.

mod libreoffice;
mod word;

pub use libreoffice::LibreOfficeEngine;
pub use word::WordComEngine;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ConvertConfig;
use crate::{Error, Result};

/// A document converter: one input `.doc`/`.docx`, one output PDF.
///
/// Implementations must never leave a partial file at `output` — the finished
/// PDF is renamed into place only once it is complete.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Engine name for logs and status.
    fn name(&self) -> &'static str;

    /// Convert `input` to a PDF at `output`.
    async fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// Pick the conversion engine for this host.
///
/// Windows prefers Word COM automation; everywhere (including Windows without
/// Word) LibreOffice is probed next, honoring `LIBREOFFICE_PATH`. No engine
/// found is a startup failure.
pub async fn detect_engine(config: &ConvertConfig) -> Result<Arc<dyn ConversionEngine>> {
    let timeout = Duration::from_secs(config.timeout_seconds);

    if cfg!(windows) {
        let engine = WordComEngine::new(timeout);
        if engine.probe().await {
            tracing::info!("Using Word COM automation for document conversion");
            return Ok(Arc::new(engine));
        }
        tracing::warn!("Word automation not available, probing LibreOffice");
    }

    let mut candidates: Vec<String> = Vec::new();
    if let Some(path) = &config.libreoffice_path {
        candidates.push(path.clone());
    }
    candidates.push("soffice".to_string());
    candidates.push("libreoffice".to_string());

    for binary in candidates {
        if libreoffice::probe(&binary).await {
            tracing::info!(binary = %binary, "Using LibreOffice for document conversion");
            return Ok(Arc::new(LibreOfficeEngine::new(binary, timeout)));
        }
    }

    Err(Error::EngineUnavailable(
        "no document conversion engine found; install LibreOffice or set LIBREOFFICE_PATH".into(),
    ))
}

/// Build the scratch output name LibreOffice-style engines produce:
/// the input stem with a `.pdf` extension.
pub(crate) fn pdf_name_for(input: &Path) -> Result<std::ffi::OsString> {
    let stem = input
        .file_stem()
        .ok_or_else(|| Error::InvalidInput(format!("not a document path: {}", input.display())))?;
    let mut name = stem.to_os_string();
    name.push(".pdf");
    Ok(name)
}

/// Move a finished PDF from the scratch directory into place, refusing
/// empty output. The rename is atomic within the filesystem, so readers
/// never observe a partial file.
pub(crate) async fn promote_output(produced: &Path, output: &Path) -> Result<()> {
    let meta = tokio::fs::metadata(produced)
        .await
        .map_err(|_| Error::ConversionFailed("engine produced no output file".into()))?;
    if meta.len() == 0 {
        return Err(Error::ConversionFailed("engine produced an empty file".into()));
    }
    tokio::fs::rename(produced, output)
        .await
        .map_err(|e| Error::ConversionFailed(format!("could not place output: {}", e)))?;
    Ok(())
}
