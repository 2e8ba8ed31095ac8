//! LibreOffice headless conversion engine.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{pdf_name_for, promote_output, ConversionEngine};
use crate::{Error, Result};

/// Export filter tuned to preserve the source layout: maximum image quality,
/// no resolution reduction, embedded standard fonts, empty pages dropped.
const PDF_EXPORT_FILTER: &str = concat!(
    "pdf:writer_pdf_Export:",
    "{\"Quality\":{\"type\":\"long\",\"value\":\"100\"},",
    "\"UseLosslessCompression\":{\"type\":\"boolean\",\"value\":\"true\"},",
    "\"ReduceImageResolution\":{\"type\":\"boolean\",\"value\":\"false\"},",
    "\"IsSkipEmptyPages\":{\"type\":\"boolean\",\"value\":\"true\"},",
    "\"EmbedStandardFonts\":{\"type\":\"boolean\",\"value\":\"true\"}}"
);

/// Check whether a LibreOffice binary responds.
pub(crate) async fn probe(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .output()
        .await
        .map(|out| out.status.success())
        .unwrap_or(false)
}

/// Converts documents by spawning `soffice --headless --convert-to`.
pub struct LibreOfficeEngine {
    binary: String,
    timeout: Duration,
}

impl LibreOfficeEngine {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ConversionEngine for LibreOfficeEngine {
    fn name(&self) -> &'static str {
        "libreoffice"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let out_dir = output
            .parent()
            .ok_or_else(|| Error::InvalidInput(format!("bad output path: {}", output.display())))?;
        tokio::fs::create_dir_all(out_dir).await?;

        // Scratch directory on the same filesystem as the target, so the
        // finished PDF can be renamed into place atomically.
        let scratch = tempfile::Builder::new()
            .prefix(".convert-")
            .tempdir_in(out_dir)
            .map_err(|e| Error::ConversionFailed(format!("scratch dir: {}", e)))?;

        let mut cmd = Command::new(&self.binary);
        cmd.arg("--headless")
            .arg("--convert-to")
            .arg(PDF_EXPORT_FILTER)
            .arg("--outdir")
            .arg(scratch.path())
            .arg(input)
            .kill_on_drop(true);

        let run = tokio::time::timeout(self.timeout, cmd.output()).await;

        let out = match run {
            Err(_) => {
                return Err(Error::ConversionTimeout {
                    seconds: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::EngineUnavailable(format!(
                    "{} not found",
                    self.binary
                )))
            }
            Ok(Err(e)) => return Err(Error::ConversionFailed(format!("spawn failed: {}", e))),
            Ok(Ok(out)) => out,
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(Error::ConversionFailed(format!(
                "{} exited with {}: {}",
                self.binary,
                out.status,
                stderr.chars().take(300).collect::<String>()
            )));
        }

        let produced = scratch.path().join(pdf_name_for(input)?);
        promote_output(&produced, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_filter_shape() {
        assert!(PDF_EXPORT_FILTER.starts_with("pdf:writer_pdf_Export:{"));
        assert!(PDF_EXPORT_FILTER.ends_with('}'));
        assert!(PDF_EXPORT_FILTER.contains("\"UseLosslessCompression\""));
        assert!(PDF_EXPORT_FILTER.contains("\"EmbedStandardFonts\""));
    }

    #[tokio::test]
    async fn test_probe_missing_binary() {
        assert!(!probe("definitely-not-a-real-office-binary").await);
    }
}
