//! Confidence evaluation of extraction passes, with a single backend fallback.

use crate::config::ConfidenceThresholds;
use crate::diagnostics::Warning;
use crate::error::{ExtractError, PipelineError};
use crate::extract::{BackendKind, Extractor, RawExtraction};
use serde::Serialize;
use std::path::Path;

/// Leading-indent drop (in columns) that counts as a jump back to the left margin.
const LEFTWARD_JUMP_COLUMNS: usize = 20;

/// Per-page signals computed once per extraction pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PageSignal {
    pub char_count: usize,
    pub line_count: usize,
    pub blank: bool,
    pub column_disorder: bool,
}

/// One physical page of an extraction pass.
#[derive(Debug, Clone)]
pub struct Page {
    pub index: usize,
    pub text: String,
    pub backend: BackendKind,
    pub signal: PageSignal,
}

/// Document-level aggregate signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ExtractionSignals {
    pub page_count: usize,
    pub total_chars: usize,
    pub blank_ratio: f64,
    pub disorder_ratio: f64,
    pub deviation_ratio: f64,
}

/// A scored extraction pass.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub backend: BackendKind,
    pub pages: Vec<Page>,
    pub signals: ExtractionSignals,
    /// Aggregate confidence in [0, 1]; higher is better
    pub score: f64,
    pub warnings: Vec<Warning>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub backend: BackendKind,
    pub signals: ExtractionSignals,
    pub score: f64,
}

/// What the evaluator decided and why.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionDiagnostics {
    pub chosen_backend: BackendKind,
    pub fallback_attempted: bool,
    pub passes: Vec<PassSummary>,
    pub flagged_pages: Vec<usize>,
}

#[derive(Debug, Clone)]
pub struct Evaluation {
    pub result: ExtractionResult,
    pub diagnostics: ExtractionDiagnostics,
}

/// Compute the signal for a single page.
pub fn page_signal(text: &str, thresholds: &ConfidenceThresholds) -> PageSignal {
    let char_count = text.trim().chars().count();
    PageSignal {
        char_count,
        line_count: text.lines().filter(|l| !l.trim().is_empty()).count(),
        blank: char_count < thresholds.blank_page_chars,
        column_disorder: column_disorder(text, thresholds),
    }
}

/// Heuristic for garbled multi-column reading order.
///
/// Flags a page when too many lines contain a column gutter (a run of spaces
/// between words) or jump far back to the left margin, or when line lengths
/// vary far more than running prose does.
pub fn column_disorder(text: &str, thresholds: &ConfidenceThresholds) -> bool {
    let lines: Vec<&str> = text
        .lines()
        .map(|l| l.trim_end())
        .filter(|l| !l.trim().is_empty())
        .collect();

    if lines.len() < thresholds.min_lines_for_layout {
        return false;
    }

    let gutter = " ".repeat(thresholds.column_gap_spaces.max(2));
    let mut irregular = 0;
    let mut previous_indent = 0;

    for line in &lines {
        let indent = line.len() - line.trim_start().len();
        let has_gutter = line.trim_start().contains(&gutter);
        let jumped_left = previous_indent >= indent + LEFTWARD_JUMP_COLUMNS;
        if has_gutter || jumped_left {
            irregular += 1;
        }
        previous_indent = indent;
    }

    if irregular as f64 / lines.len() as f64 > thresholds.max_gap_line_ratio {
        return true;
    }

    let lengths: Vec<f64> = lines.iter().map(|l| l.trim().chars().count() as f64).collect();
    let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
    let variance = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
    mean > 0.0 && variance.sqrt() / mean > thresholds.max_line_length_cv
}

/// Pages whose character count falls well below the rolling average of the
/// preceding non-blank pages: `(page, chars, rolling_average)`.
pub fn character_drops(
    signals: &[PageSignal],
    thresholds: &ConfidenceThresholds,
) -> Vec<(usize, usize, usize)> {
    let mut window: Vec<usize> = Vec::new();
    let mut drops = Vec::new();

    for (index, signal) in signals.iter().enumerate() {
        if signal.blank {
            continue;
        }

        if !window.is_empty() {
            let average = window.iter().sum::<usize>() as f64 / window.len() as f64;
            if (signal.char_count as f64) < average * thresholds.char_drop_factor {
                drops.push((index, signal.char_count, average.round() as usize));
            }
        }

        window.push(signal.char_count);
        if window.len() > thresholds.rolling_window.max(1) {
            window.remove(0);
        }
    }

    drops
}

/// Aggregate score: the product of the "good" fractions. Empty text scores zero.
pub fn aggregate_score(signals: &ExtractionSignals) -> f64 {
    if signals.total_chars == 0 {
        return 0.0;
    }
    (1.0 - signals.blank_ratio) * (1.0 - signals.disorder_ratio) * (1.0 - signals.deviation_ratio)
}

/// Whether any aggregate signal crosses its threshold.
pub fn crosses_threshold(signals: &ExtractionSignals, thresholds: &ConfidenceThresholds) -> bool {
    if signals.total_chars == 0 {
        return true;
    }
    if signals.page_count < thresholds.min_pages_for_heuristics {
        return false;
    }
    signals.blank_ratio > thresholds.max_blank_ratio
        || signals.disorder_ratio > thresholds.max_disorder_ratio
        || signals.deviation_ratio > thresholds.max_deviation_ratio
}

/// The retry decision: only from the default backend, and only once.
pub fn should_retry(
    signals: &ExtractionSignals,
    thresholds: &ConfidenceThresholds,
    current: BackendKind,
    fallback_tried: bool,
) -> Option<BackendKind> {
    if fallback_tried || current != BackendKind::default() {
        return None;
    }
    if !crosses_threshold(signals, thresholds) {
        return None;
    }
    current.fallback()
}

/// Score a raw pass: build pages with signals and attach per-page warnings.
pub fn score_pass(raw: RawExtraction, thresholds: &ConfidenceThresholds) -> ExtractionResult {
    let backend = raw.backend;
    let pages: Vec<Page> = raw
        .pages
        .into_iter()
        .enumerate()
        .map(|(index, text)| Page {
            index,
            signal: page_signal(&text, thresholds),
            text,
            backend,
        })
        .collect();

    let page_signals: Vec<PageSignal> = pages.iter().map(|p| p.signal).collect();
    let drops = character_drops(&page_signals, thresholds);

    let page_count = pages.len();
    let ratio = |n: usize| if page_count == 0 { 0.0 } else { n as f64 / page_count as f64 };
    let signals = ExtractionSignals {
        page_count,
        total_chars: page_signals.iter().map(|s| s.char_count).sum(),
        blank_ratio: ratio(page_signals.iter().filter(|s| s.blank).count()),
        disorder_ratio: ratio(page_signals.iter().filter(|s| s.column_disorder).count()),
        deviation_ratio: ratio(drops.len()),
    };

    let mut warnings = raw.warnings;
    for page in &pages {
        if page.signal.blank {
            warnings.push(Warning::BlankPage {
                page: page.index,
                chars: page.signal.char_count,
            });
        }
        if page.signal.column_disorder {
            warnings.push(Warning::ColumnDisorder { page: page.index });
        }
    }
    warnings.extend(drops.into_iter().map(|(page, chars, rolling_average)| {
        Warning::CharacterDrop {
            page,
            chars,
            rolling_average,
        }
    }));

    ExtractionResult {
        backend,
        score: aggregate_score(&signals),
        pages,
        signals,
        warnings,
    }
}

fn summary(result: &ExtractionResult) -> PassSummary {
    PassSummary {
        backend: result.backend,
        signals: result.signals,
        score: result.score,
    }
}

/// Extract with `initial`, retry once with the fallback backend if the pass
/// looks untrustworthy, and keep the better-scoring pass.
///
/// Fails only when the document cannot be opened by any backend, or when no
/// pass produced any text at all.
pub fn evaluate(
    extractor: &Extractor,
    path: &Path,
    initial: BackendKind,
    thresholds: &ConfidenceThresholds,
) -> Result<Evaluation, PipelineError> {
    let mut passes = Vec::new();
    let mut fallback_attempted = false;
    let mut fallback_warning = None;

    let primary = match extractor.extract(path, initial) {
        Ok(raw) => Ok(score_pass(raw, thresholds)),
        Err(ExtractError::NotFound(p)) => return Err(ExtractError::NotFound(p).into()),
        Err(e) => Err(e),
    };

    let retry_with = match &primary {
        Ok(result) => {
            passes.push(summary(result));
            should_retry(&result.signals, thresholds, initial, false)
        }
        Err(e) => {
            log::warn!("Extraction with {} backend failed: {}", initial, e);
            initial.fallback()
        }
    };

    let chosen = match retry_with {
        None => primary?,
        Some(fallback) => {
            fallback_attempted = true;
            log::info!(
                "Extraction confidence low with {} backend; retrying with {}",
                initial,
                fallback
            );
            match (primary, extractor.extract(path, fallback)) {
                (Ok(primary), Ok(raw)) => {
                    let alternate = score_pass(raw, thresholds);
                    passes.push(summary(&alternate));
                    if alternate.score > primary.score {
                        alternate
                    } else {
                        primary
                    }
                }
                (Ok(primary), Err(e)) => {
                    fallback_warning = Some(Warning::FallbackFailed {
                        backend: fallback,
                        reason: e.to_string(),
                    });
                    primary
                }
                (Err(_), Ok(raw)) => {
                    let alternate = score_pass(raw, thresholds);
                    passes.push(summary(&alternate));
                    alternate
                }
                (Err(e), Err(_)) => return Err(e.into()),
            }
        }
    };

    let mut result = chosen;
    if let Some(warning) = fallback_warning {
        result.warnings.push(warning);
    }

    if result.signals.total_chars == 0 {
        return Err(PipelineError::UnreadableDocument {
            pages: result.signals.page_count,
        });
    }

    if crosses_threshold(&result.signals, thresholds) {
        result.warnings.push(Warning::LowConfidenceExtraction {
            backend: result.backend,
            score: result.score,
        });
    }

    let mut flagged_pages: Vec<usize> = result.warnings.iter().filter_map(Warning::page).collect();
    flagged_pages.sort_unstable();
    flagged_pages.dedup();

    log::info!(
        "Using {} extraction: {} pages, {} chars, score {:.2}",
        result.backend,
        result.signals.page_count,
        result.signals.total_chars,
        result.score
    );

    let diagnostics = ExtractionDiagnostics {
        chosen_backend: result.backend,
        fallback_attempted,
        passes,
        flagged_pages,
    };

    Ok(Evaluation {
        result,
        diagnostics,
    })
}
