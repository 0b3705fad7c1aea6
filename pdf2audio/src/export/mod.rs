//! Container export: hand the assembled book to a muxer, then validate the result.

pub mod ffmpeg;
pub mod metadata;

use crate::audio::AssembledAudio;
use crate::error::{ExportError, PipelineError};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub use ffmpeg::FfmpegMuxer;

/// What a probe of the produced container reports.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProbeReport {
    pub duration_secs: f64,
    pub chapter_count: usize,
    /// Global tags, keys lowercased
    pub tags: BTreeMap<String, String>,
}

/// An external container muxer.
pub trait ContainerMuxer: Send + Sync {
    fn name(&self) -> &str;

    /// Write `audio` with its chapters and metadata to `output`.
    fn mux(&self, audio: &AssembledAudio, output: &Path) -> Result<(), ExportError>;

    /// Inspect a produced container.
    fn probe(&self, output: &Path) -> Result<ProbeReport, ExportError>;
}

/// A validated audiobook on disk.
#[derive(Debug, Clone, Serialize)]
pub struct ExportedBook {
    pub path: PathBuf,
    pub duration_ms: u64,
    pub chapter_count: usize,
    pub size_bytes: u64,
}

/// Check the produced container against what was handed to the muxer.
pub fn validate(
    output: &Path,
    probe: &ProbeReport,
    audio: &AssembledAudio,
) -> Result<(), ExportError> {
    if !output.is_file() {
        return Err(ExportError::MissingOutput(output.display().to_string()));
    }

    if probe.duration_secs <= 0.0 {
        return Err(ExportError::ZeroDuration);
    }

    if probe.chapter_count != audio.chapters.len() {
        return Err(ExportError::ChapterCount {
            expected: audio.chapters.len(),
            actual: probe.chapter_count,
        });
    }

    let meta = &audio.metadata;
    for (field, expected) in [
        ("title", &meta.title),
        ("artist", &meta.author),
        ("album", &meta.title),
        ("genre", &meta.genre),
        ("comment", &meta.source_file),
    ] {
        let actual = probe.tags.get(field);
        if actual.map(|v| v.trim()) != Some(expected.trim()) {
            return Err(ExportError::MetadataMismatch {
                field: field.to_string(),
                expected: expected.clone(),
                actual: actual.cloned(),
            });
        }
    }

    Ok(())
}

/// Mux, probe, and validate.
///
/// Failure to run the muxer is an `Export` error; anything wrong with the
/// produced file is an `ExportValidationFailure`.
pub fn export(
    muxer: &dyn ContainerMuxer,
    audio: &AssembledAudio,
    output: &Path,
) -> Result<ExportedBook, PipelineError> {
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::Export(e.into()))?;
    }

    muxer.mux(audio, output).map_err(PipelineError::Export)?;

    let probe = muxer
        .probe(output)
        .map_err(PipelineError::ExportValidationFailure)?;
    validate(output, &probe, audio).map_err(PipelineError::ExportValidationFailure)?;

    let size_bytes = fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    log::info!(
        "Wrote {} ({} chapters, {:.1}s) with {}",
        output.display(),
        probe.chapter_count,
        probe.duration_secs,
        muxer.name()
    );

    Ok(ExportedBook {
        path: output.to_path_buf(),
        duration_ms: (probe.duration_secs * 1000.0).round() as u64,
        chapter_count: probe.chapter_count,
        size_bytes,
    })
}
