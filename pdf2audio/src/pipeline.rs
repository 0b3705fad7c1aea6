//! The document-to-audiobook pipeline.
//!
//! Stages run strictly in order, each consuming the fully materialized output
//! of the one before. Blocking work (document parsing, muxing) runs on the
//! blocking pool.

use crate::audio::{BookMetadata, assemble};
use crate::config::Pdf2AudioConfig;
use crate::confidence;
use crate::diagnostics::{DiagnosticsReport, Warning};
use crate::error::PipelineError;
use crate::export::{ContainerMuxer, ExportedBook, export};
use crate::extract::{BackendKind, DocumentInfo, Extractor};
use crate::speech::SpeechEngine;
use crate::synth::{Orchestrator, SynthesisProgress, sample_page};
use crate::text::{Normalizer, segment};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What to convert, and how.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Backend for the first extraction pass
    pub backend: BackendKind,
    /// Voice override; the engine's default voice otherwise
    pub voice: Option<String>,
    /// Synthesize a single randomly chosen page
    pub test_random_page: bool,
    pub title: Option<String>,
    pub author: Option<String>,
}

impl RunRequest {
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            backend: BackendKind::default(),
            voice: None,
            test_random_page: false,
            title: None,
            author: None,
        }
    }
}

/// Result of a run plus the diagnostics gathered along the way.
#[derive(Debug)]
pub struct RunOutcome {
    pub diagnostics: DiagnosticsReport,
    pub result: Result<ExportedBook, PipelineError>,
}

pub struct Pipeline {
    config: Pdf2AudioConfig,
    extractor: Arc<Extractor>,
    engine: Arc<dyn SpeechEngine>,
    muxer: Arc<dyn ContainerMuxer>,
}

impl Pipeline {
    pub fn new(
        config: Pdf2AudioConfig,
        extractor: Arc<Extractor>,
        engine: Arc<dyn SpeechEngine>,
        muxer: Arc<dyn ContainerMuxer>,
    ) -> Self {
        Self {
            config,
            extractor,
            engine,
            muxer,
        }
    }

    /// Run every stage. Diagnostics are returned whether or not the run succeeds.
    pub async fn run<F>(&self, request: &RunRequest, on_progress: F) -> RunOutcome
    where
        F: FnMut(&SynthesisProgress),
    {
        let mut diagnostics = DiagnosticsReport::new(&request.input);
        let result = self.execute(request, &mut diagnostics, on_progress).await;

        if let Err(e) = &result {
            log::error!("{}", e);
            diagnostics.failure = Some(e.to_string());
        }

        RunOutcome {
            diagnostics,
            result,
        }
    }

    async fn execute<F>(
        &self,
        request: &RunRequest,
        report: &mut DiagnosticsReport,
        on_progress: F,
    ) -> Result<ExportedBook, PipelineError>
    where
        F: FnMut(&SynthesisProgress),
    {
        // Extraction and evaluation
        let extractor = self.extractor.clone();
        let input = request.input.clone();
        let backend = request.backend;
        let thresholds = self.config.extraction.thresholds.clone();
        let (evaluation, info) = tokio::task::spawn_blocking(move || {
            let evaluation = confidence::evaluate(&extractor, &input, backend, &thresholds)?;
            let info = extractor.document_info(&input);
            Ok::<_, PipelineError>((evaluation, info))
        })
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))??;

        report.extraction = Some(evaluation.diagnostics.clone());
        for warning in evaluation.result.warnings {
            report.warn(warning);
        }

        // Normalization and segmentation
        let normalizer = Normalizer::new(self.config.normalizer.clone());
        let segments = normalizer.normalize(
            evaluation
                .result
                .pages
                .iter()
                .map(|page| (page.index, page.text.as_str())),
        );
        let mut chunks = segment(&segments, &self.config.chunking);

        if request.test_random_page {
            if let Some((page, selected)) = sample_page(&chunks, &mut rand::rng()) {
                log::info!("Test mode: synthesizing page {} only", page + 1);
                report.test_page = Some(page);
                chunks = selected;
            }
        }
        report.chunk_count = chunks.len();

        // Synthesis
        let mut orchestrator = Orchestrator::new(self.engine.clone(), &self.config.synthesis);
        if let Some(voice) = &request.voice {
            orchestrator = orchestrator.with_voice(voice.clone());
        }
        let run = orchestrator.run(&chunks, on_progress).await;

        report.run_state = Some(run.state);
        for failure in &run.failures {
            report.warn(Warning::ChunkSynthesisFailure {
                chunk: failure.chunk,
                first_page: failure.first_page,
                last_page: failure.last_page,
                reason: failure.reason.clone(),
            });
        }
        report.chunk_failures = run.failures.clone();
        run.ensure_coverage(self.config.synthesis.min_success_ratio)?;

        // Assembly
        let metadata = book_metadata(request, info, &self.config.export.genre);
        let (audio, warnings) = assemble(&chunks, &run.results, metadata, &self.config.assembly)?;
        for warning in warnings {
            report.warn(warning);
        }
        report.chapters = audio.chapters.clone();

        // Export
        let muxer = self.muxer.clone();
        let output = request.output.clone();
        tokio::task::spawn_blocking(move || export(muxer.as_ref(), &audio, &output))
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?
    }
}

/// Title and author: explicit overrides, then document info, then defaults.
pub fn book_metadata(request: &RunRequest, info: DocumentInfo, genre: &str) -> BookMetadata {
    BookMetadata {
        title: request
            .title
            .clone()
            .or(info.title)
            .unwrap_or_else(|| file_stem(&request.input)),
        author: request
            .author
            .clone()
            .or(info.author)
            .unwrap_or_else(|| "Unknown".to_string()),
        source_file: request
            .input
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        genre: genre.to_string(),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "Audiobook".to_string())
}
