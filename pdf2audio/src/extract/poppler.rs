//! Precise backend: poppler's `pdftotext -layout`, one invocation per page.

use super::{PageText, TextBackend};
use crate::error::ExtractError;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Layout-preserving backend driving the poppler command-line tools.
pub struct PopplerBackend {
    pdftotext: PathBuf,
    pdfinfo: PathBuf,
}

impl Default for PopplerBackend {
    fn default() -> Self {
        Self {
            pdftotext: PathBuf::from("pdftotext"),
            pdfinfo: PathBuf::from("pdfinfo"),
        }
    }
}

impl PopplerBackend {
    pub fn new(pdftotext: impl Into<PathBuf>, pdfinfo: impl Into<PathBuf>) -> Self {
        Self {
            pdftotext: pdftotext.into(),
            pdfinfo: pdfinfo.into(),
        }
    }

    /// Number of physical pages, from `pdfinfo`.
    fn page_count(&self, path: &Path) -> Result<usize, ExtractError> {
        let output = Command::new(&self.pdfinfo)
            .arg(path)
            .output()
            .map_err(|e| tool_error("pdfinfo", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::Open {
                backend: "poppler".to_string(),
                message: stderr.trim().to_string(),
            });
        }

        parse_page_count(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| tool_error("pdfinfo", "no page count in output".to_string()))
    }

    fn page_text(&self, path: &Path, number: usize) -> Result<PageText, ExtractError> {
        let page = number.to_string();
        let output = Command::new(&self.pdftotext)
            .args(["-layout", "-enc", "UTF-8", "-f", &page, "-l", &page])
            .arg(path)
            .arg("-")
            .output()
            .map_err(|e| tool_error("pdftotext", e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Ok(Err(stderr.trim().to_string()));
        }

        let text = String::from_utf8_lossy(&output.stdout);
        Ok(Ok(text.trim_end_matches('\u{c}').to_string()))
    }
}

impl TextBackend for PopplerBackend {
    fn name(&self) -> &'static str {
        "poppler"
    }

    fn page_texts(&self, path: &Path) -> Result<Vec<PageText>, ExtractError> {
        let count = self.page_count(path)?;
        (1..=count).map(|number| self.page_text(path, number)).collect()
    }
}

fn tool_error(tool: &str, message: String) -> ExtractError {
    ExtractError::Tool {
        tool: tool.to_string(),
        message,
    }
}

/// Parse the `Pages:` line of pdfinfo output.
fn parse_page_count(info: &str) -> Option<usize> {
    info.lines()
        .find_map(|line| line.strip_prefix("Pages:"))
        .and_then(|value| value.trim().parse().ok())
}
