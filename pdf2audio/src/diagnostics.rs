//! Structured diagnostics emitted at the end of every run.
//!
//! The report is defined here and rendered by the CLI; every recoverable
//! problem the pipeline works around ends up in `warnings`.

use crate::audio::ChapterMarker;
use crate::confidence::ExtractionDiagnostics;
use crate::extract::BackendKind;
use crate::synth::RunState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::PathBuf;

/// Number of per-page anomalies listed before summarising the rest.
const MAX_LISTED_ANOMALIES: usize = 5;

/// A recoverable problem, tagged with the page or chunk it concerns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    UnreadablePage {
        page: usize,
        backend: BackendKind,
        reason: String,
    },
    BlankPage {
        page: usize,
        chars: usize,
    },
    ColumnDisorder {
        page: usize,
    },
    CharacterDrop {
        page: usize,
        chars: usize,
        rolling_average: usize,
    },
    LowConfidenceExtraction {
        backend: BackendKind,
        score: f64,
    },
    FallbackFailed {
        backend: BackendKind,
        reason: String,
    },
    ChunkSynthesisFailure {
        chunk: usize,
        first_page: usize,
        last_page: usize,
        reason: String,
    },
    /// Silence of the chunk's estimated length stands in for its audio.
    MissingChunkAudio {
        chunk: usize,
        at_ms: u64,
        gap_ms: u64,
    },
}

impl Warning {
    /// Page index (0-based) this warning points at, if any.
    pub fn page(&self) -> Option<usize> {
        match self {
            Warning::UnreadablePage { page, .. }
            | Warning::BlankPage { page, .. }
            | Warning::ColumnDisorder { page }
            | Warning::CharacterDrop { page, .. } => Some(*page),
            Warning::ChunkSynthesisFailure { first_page, .. } => Some(*first_page),
            Warning::LowConfidenceExtraction { .. }
            | Warning::FallbackFailed { .. }
            | Warning::MissingChunkAudio { .. } => None,
        }
    }
}

/// A chunk the speech engine did not produce audio for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChunkFailure {
    pub chunk: usize,
    pub first_page: usize,
    pub last_page: usize,
    pub reason: String,
}

/// End-of-run report handed to the calling layer.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub generated_at: DateTime<Utc>,
    pub source: PathBuf,
    pub extraction: Option<ExtractionDiagnostics>,
    pub warnings: Vec<Warning>,
    pub chunk_count: usize,
    pub chunk_failures: Vec<ChunkFailure>,
    pub run_state: Option<RunState>,
    /// Page picked for a single-page test run
    pub test_page: Option<usize>,
    pub chapters: Vec<ChapterMarker>,
    /// Stage that failed, if the run did not finish
    pub failure: Option<String>,
}

impl DiagnosticsReport {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            generated_at: Utc::now(),
            source: source.into(),
            extraction: None,
            warnings: Vec::new(),
            chunk_count: 0,
            chunk_failures: Vec::new(),
            run_state: None,
            test_page: None,
            chapters: Vec::new(),
            failure: None,
        }
    }

    /// Record a warning and log it.
    pub fn warn(&mut self, warning: Warning) {
        log::warn!("{}", describe(&warning));
        self.warnings.push(warning);
    }

    /// Human-readable summary, or `None` when there is nothing to report.
    pub fn render_summary(&self) -> Option<String> {
        if self.warnings.is_empty() && self.failure.is_none() {
            return None;
        }

        let mut out = String::new();

        if let Some(extraction) = &self.extraction {
            let _ = writeln!(
                out,
                "Extraction backend: {}{}",
                extraction.chosen_backend,
                if extraction.fallback_attempted {
                    " (after fallback attempt)"
                } else {
                    ""
                }
            );
        }

        let drops: Vec<&Warning> = self
            .warnings
            .iter()
            .filter(|w| matches!(w, Warning::CharacterDrop { .. }))
            .collect();

        if !self.warnings.is_empty() {
            let _ = writeln!(out, "Warnings:");
        }
        for warning in self
            .warnings
            .iter()
            .filter(|w| !matches!(w, Warning::CharacterDrop { .. }))
        {
            let _ = writeln!(out, "- {}", describe(warning));
        }

        if !drops.is_empty() {
            let _ = writeln!(out, "- Character count anomalies detected:");
            for warning in drops.iter().take(MAX_LISTED_ANOMALIES) {
                let _ = writeln!(out, "  * {}", describe(warning));
            }
            if drops.len() > MAX_LISTED_ANOMALIES {
                let _ = writeln!(out, "  * ...and {} more", drops.len() - MAX_LISTED_ANOMALIES);
            }
        }

        if let Some(failure) = &self.failure {
            let _ = writeln!(out, "Failed: {}", failure);
        }

        Some(out.trim_end().to_string())
    }
}

/// One-line description of a warning (pages shown 1-based).
pub fn describe(warning: &Warning) -> String {
    match warning {
        Warning::UnreadablePage {
            page,
            backend,
            reason,
        } => format!("Page {} unreadable with {} backend: {}", page + 1, backend, reason),
        Warning::BlankPage { page, chars } => {
            format!("Page {} is nearly blank ({} chars)", page + 1, chars)
        }
        Warning::ColumnDisorder { page } => {
            format!("Page {} may have multi-column reading order problems", page + 1)
        }
        Warning::CharacterDrop {
            page,
            chars,
            rolling_average,
        } => format!(
            "Page {}: {} chars (rolling avg: {})",
            page + 1,
            chars,
            rolling_average
        ),
        Warning::LowConfidenceExtraction { backend, score } => format!(
            "Low extraction confidence with {} backend (score {:.2}); text may be incomplete or out of order",
            backend, score
        ),
        Warning::FallbackFailed { backend, reason } => {
            format!("Fallback extraction with {} backend failed: {}", backend, reason)
        }
        Warning::ChunkSynthesisFailure {
            chunk,
            first_page,
            last_page,
            reason,
        } => format!(
            "Chunk {} (pages {}-{}) failed to synthesize: {}",
            chunk,
            first_page + 1,
            last_page + 1,
            reason
        ),
        Warning::MissingChunkAudio {
            chunk,
            at_ms,
            gap_ms,
        } => format!(
            "No audio for chunk {} at {} ({} ms of silence in its place)",
            chunk,
            format_timestamp(*at_ms),
            gap_ms
        ),
    }
}

/// Format milliseconds as `H:MM:SS.mmm`.
pub fn format_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms / 60_000) % 60;
    let seconds = (ms / 1000) % 60;
    format!("{}:{:02}:{:02}.{:03}", hours, minutes, seconds, ms % 1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report_has_no_summary() {
        let report = DiagnosticsReport::new("book.pdf");
        assert!(report.render_summary().is_none());
    }

    #[test]
    fn test_summary_truncates_char_drops() {
        let mut report = DiagnosticsReport::new("book.pdf");
        for page in 0..8 {
            report.warn(Warning::CharacterDrop {
                page,
                chars: 10,
                rolling_average: 1500,
            });
        }
        let summary = report.render_summary().unwrap();
        assert!(summary.contains("Character count anomalies detected"));
        assert!(summary.contains("Page 1: 10 chars (rolling avg: 1500)"));
        assert!(summary.contains("...and 3 more"));
        assert!(!summary.contains("Page 6:"));
    }

    #[test]
    fn test_warning_page() {
        let w = Warning::BlankPage { page: 4, chars: 0 };
        assert_eq!(w.page(), Some(4));
        let w = Warning::MissingChunkAudio {
            chunk: 2,
            at_ms: 0,
            gap_ms: 0,
        };
        assert_eq!(w.page(), None);
    }

    #[test]
    fn test_warning_serializes_with_kind_tag() {
        let w = Warning::ChunkSynthesisFailure {
            chunk: 3,
            first_page: 1,
            last_page: 1,
            reason: "timeout".into(),
        };
        let json = serde_json::to_value(&w).unwrap();
        assert_eq!(json["kind"], "chunk_synthesis_failure");
        assert_eq!(json["chunk"], 3);
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "0:00:00.000");
        assert_eq!(format_timestamp(3_723_045), "1:02:03.045");
    }
}
