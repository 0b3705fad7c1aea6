//! Error types for each pipeline stage.

use thiserror::Error;

/// Failure to read a document through an extraction backend.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Failed to open document with {backend}: {message}")]
    Open { backend: String, message: String },

    #[error("Extraction tool `{tool}` failed: {message}")]
    Tool { tool: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported for a single speech-engine invocation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeechError {
    #[error("Speech engine error: {0}")]
    Engine(String),

    #[error("Synthesis timed out after {0} seconds")]
    Timeout(u64),

    #[error("Malformed engine output: {0}")]
    MalformedOutput(String),

    #[error("Voice not found: {0}")]
    VoiceNotFound(String),
}

/// Failure while stitching synthesized chunks into one stream.
#[derive(Error, Debug)]
pub enum AssemblyError {
    #[error("No synthesized audio to assemble")]
    NoAudio,

    #[error("Got {results} synthesis results for {chunks} chunks")]
    ResultCountMismatch { chunks: usize, results: usize },

    #[error("Resampling {from} Hz to {to} Hz failed: {message}")]
    Resample { from: u32, to: u32, message: String },
}

/// Failure while packaging the assembled audio into a container.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Muxer `{tool}` failed: {message}")]
    Muxer { tool: String, message: String },

    #[error("Failed to parse probe output: {0}")]
    Probe(String),

    #[error("Output file missing: {0}")]
    MissingOutput(String),

    #[error("Output has no audio duration")]
    ZeroDuration,

    #[error("Expected {expected} chapters, container has {actual}")]
    ChapterCount { expected: usize, actual: usize },

    #[error("Metadata field `{field}` expected {expected:?}, container has {actual:?}")]
    MetadataMismatch {
        field: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("WAV write error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stage-level failure surfaced to the caller of the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Both backends produced no text; most likely an image-only document.
    #[error("No extractable text on any backend ({pages} pages); the document is probably image-only")]
    UnreadableDocument { pages: usize },

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Only {succeeded}/{total} chunks synthesized (minimum ratio {min_ratio:.2})")]
    InsufficientSynthesisCoverage {
        succeeded: usize,
        total: usize,
        min_ratio: f64,
    },

    #[error("Audio assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    /// The muxer could not be run at all.
    #[error("Export failed: {0}")]
    Export(ExportError),

    /// Audio was generated, but the produced container did not validate.
    #[error("Audio was generated but packaging failed validation: {0}")]
    ExportValidationFailure(ExportError),

    #[error("Background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
