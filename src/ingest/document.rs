use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::round::error::AutofillError;

/// Turns a document on disk into plain text for an ingest round.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn extract_text(&self, path: &Path) -> Result<String, AutofillError>;
}

/// Reads UTF-8 text files as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextSource;

#[async_trait]
impl DocumentSource for PlainTextSource {
    async fn extract_text(&self, path: &Path) -> Result<String, AutofillError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AutofillError::io(format!("Could not read {}", path.display()), e))?;
        non_empty(text, path)
    }
}

/// Extracts the text layer of a PDF with the `pdftotext` tool (poppler).
#[derive(Debug, Clone)]
pub struct PdfToTextSource {
    program: String,
}

impl Default for PdfToTextSource {
    fn default() -> Self {
        Self::new("pdftotext")
    }
}

impl PdfToTextSource {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl DocumentSource for PdfToTextSource {
    async fn extract_text(&self, path: &Path) -> Result<String, AutofillError> {
        // "-" sends the text to stdout.
        let output = Command::new(&self.program)
            .arg("-layout")
            .arg("-enc")
            .arg("UTF-8")
            .arg(path)
            .arg("-")
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| AutofillError::io(format!("Failed to run {}", self.program), e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(status = %output.status, stderr = %stderr.trim(), "pdftotext failed");
            return Err(AutofillError::NoExtractableText(format!(
                "{} ({})",
                path.display(),
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), "extracted pdf text");
        non_empty(text, path)
    }
}

fn non_empty(text: String, path: &Path) -> Result<String, AutofillError> {
    if text.trim().is_empty() {
        return Err(AutofillError::NoExtractableText(path.display().to_string()));
    }
    Ok(text)
}
