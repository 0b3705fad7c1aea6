//! Extraction adapter: uniform per-page text access over interchangeable backends.
//!
//! The adapter only moves text; it never judges it. Quality heuristics live in
//! [`crate::confidence`].

pub mod lopdf_backend;
pub mod poppler;

use crate::diagnostics::Warning;
use crate::error::ExtractError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

pub use lopdf_backend::LopdfBackend;
pub use poppler::PopplerBackend;

/// Which backend an extraction pass used.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Default pure-Rust text extraction
    #[default]
    Fast,
    /// Layout-aware extraction, used as the fallback
    Precise,
}

impl BackendKind {
    /// The backend to retry with after this one, if any.
    pub fn fallback(self) -> Option<BackendKind> {
        match self {
            BackendKind::Fast => Some(BackendKind::Precise),
            BackendKind::Precise => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Fast => write!(f, "fast"),
            BackendKind::Precise => write!(f, "precise"),
        }
    }
}

/// Text of one physical page, or why it could not be read.
pub type PageText = std::result::Result<String, String>;

/// Document-level metadata a backend may be able to read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentInfo {
    pub title: Option<String>,
    pub author: Option<String>,
}

/// A text-extraction backend.
///
/// Implementations return exactly one entry per physical page, in page order.
/// Only failure to open the document at all is an `Err`.
pub trait TextBackend: Send + Sync {
    /// Backend name for logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Extract the text of every page.
    fn page_texts(&self, path: &Path) -> Result<Vec<PageText>, ExtractError>;

    /// Read title/author metadata, if the backend supports it.
    fn document_info(&self, _path: &Path) -> DocumentInfo {
        DocumentInfo::default()
    }
}

/// Output of one extraction pass, before any scoring.
#[derive(Debug, Clone)]
pub struct RawExtraction {
    pub backend: BackendKind,
    /// One entry per physical page; unreadable pages are empty
    pub pages: Vec<String>,
    pub warnings: Vec<Warning>,
}

/// Dispatches extraction requests to the configured backends.
pub struct Extractor {
    fast: Box<dyn TextBackend>,
    precise: Box<dyn TextBackend>,
}

impl Extractor {
    pub fn new(fast: Box<dyn TextBackend>, precise: Box<dyn TextBackend>) -> Self {
        Self { fast, precise }
    }

    /// Extractor for PDF documents: lopdf for `fast`, poppler for `precise`.
    pub fn for_pdf() -> Self {
        Self::new(Box::new(LopdfBackend), Box::new(PopplerBackend::default()))
    }

    fn backend(&self, kind: BackendKind) -> &dyn TextBackend {
        match kind {
            BackendKind::Fast => self.fast.as_ref(),
            BackendKind::Precise => self.precise.as_ref(),
        }
    }

    /// Run one extraction pass with the given backend.
    ///
    /// Unreadable pages become empty text plus an `UnreadablePage` warning.
    pub fn extract(&self, path: &Path, kind: BackendKind) -> Result<RawExtraction, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound(path.display().to_string()));
        }

        let backend = self.backend(kind);
        log::info!(
            "Extracting text from {} using {} ({})",
            path.display(),
            kind,
            backend.name()
        );

        let texts = backend.page_texts(path)?;
        let mut pages = Vec::with_capacity(texts.len());
        let mut warnings = Vec::new();

        for (index, text) in texts.into_iter().enumerate() {
            match text {
                Ok(text) => pages.push(text),
                Err(reason) => {
                    log::warn!("Page {} unreadable with {}: {}", index + 1, kind, reason);
                    warnings.push(Warning::UnreadablePage {
                        page: index,
                        backend: kind,
                        reason,
                    });
                    pages.push(String::new());
                }
            }
        }

        log::debug!("{} pass produced {} pages", kind, pages.len());

        Ok(RawExtraction {
            backend: kind,
            pages,
            warnings,
        })
    }

    /// Title/author from the first backend that knows them.
    pub fn document_info(&self, path: &Path) -> DocumentInfo {
        let fast = self.fast.document_info(path);
        let precise = self.precise.document_info(path);
        DocumentInfo {
            title: fast.title.or(precise.title),
            author: fast.author.or(precise.author),
        }
    }
}
