//! Microsoft Word COM automation engine (Windows).
//!
//! Word is driven through a generated PowerShell script: open the document
//! read-only, export as fixed format 17 (PDF), close without saving, quit.
//! Word's COM interface rejects overlapping calls; the pipeline's global
//! conversion lock guarantees one conversion at a time.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{promote_output, ConversionEngine};
use crate::{Error, Result};

/// wdExportFormatPDF
const WD_EXPORT_FORMAT_PDF: u32 = 17;

/// Converts documents through Word's COM automation interface.
pub struct WordComEngine {
    timeout: Duration,
}

impl WordComEngine {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Check whether PowerShell is usable on this host. Word registration
    /// problems surface per conversion, not here.
    pub async fn probe(&self) -> bool {
        Command::new("powershell")
            .args(["-NoProfile", "-NonInteractive", "-Command", "exit 0"])
            .output()
            .await
            .map(|out| out.status.success())
            .unwrap_or(false)
    }

    fn export_script(input: &Path, output: &Path) -> String {
        format!(
            r#"$ErrorActionPreference = 'Stop'
$word = New-Object -ComObject Word.Application
$word.Visible = $false
try {{
    $doc = $word.Documents.Open('{input}', $false, $true)
    try {{
        $doc.ExportAsFixedFormat('{output}', {format})
    }} finally {{
        $doc.Close(0)
    }}
}} finally {{
    $word.Quit()
}}"#,
            input = ps_quote(input),
            output = ps_quote(output),
            format = WD_EXPORT_FORMAT_PDF,
        )
    }
}

/// Escape a path for a single-quoted PowerShell string literal.
fn ps_quote(path: &Path) -> String {
    path.display().to_string().replace('\'', "''")
}

#[async_trait]
impl ConversionEngine for WordComEngine {
    fn name(&self) -> &'static str {
        "word-com"
    }

    async fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let out_dir = output
            .parent()
            .ok_or_else(|| Error::InvalidInput(format!("bad output path: {}", output.display())))?;
        tokio::fs::create_dir_all(out_dir).await?;

        let scratch = tempfile::Builder::new()
            .prefix(".convert-")
            .tempdir_in(out_dir)
            .map_err(|e| Error::ConversionFailed(format!("scratch dir: {}", e)))?;
        let produced = scratch.path().join("export.pdf");

        let script = Self::export_script(input, &produced);

        let mut cmd = Command::new("powershell");
        cmd.args(["-NoProfile", "-NonInteractive", "-Command", &script])
            .kill_on_drop(true);

        let run = tokio::time::timeout(self.timeout, cmd.output()).await;

        let out = match run {
            Err(_) => {
                return Err(Error::ConversionTimeout {
                    seconds: self.timeout.as_secs(),
                })
            }
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::EngineUnavailable("powershell not found".into()))
            }
            Ok(Err(e)) => return Err(Error::ConversionFailed(format!("spawn failed: {}", e))),
            Ok(Ok(out)) => out,
        };

        if !out.status.success() {
            let stderr = String::from_utf8_lossy(&out.stderr);
            return Err(Error::ConversionFailed(format!(
                "Word export failed: {}",
                stderr.chars().take(300).collect::<String>()
            )));
        }

        promote_output(&produced, output).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_script_quotes_paths() {
        let input = PathBuf::from(r"C:\docs\o'brien report.docx");
        let output = PathBuf::from(r"C:\out\export.pdf");
        let script = WordComEngine::export_script(&input, &output);

        assert!(script.contains("o''brien"));
        assert!(script.contains("ExportAsFixedFormat"));
        assert!(script.contains(", 17)"));
        assert!(script.contains("$word.Quit()"));
    }
}
