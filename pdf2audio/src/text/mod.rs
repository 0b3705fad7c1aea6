//! Text preparation for speech: cleaning, sentence splitting, and chunking.

pub mod chunker;
pub mod cleaner;
pub mod normalizer;
pub mod sentences;

use serde::Serialize;

pub use chunker::{SynthesisChunk, segment};
pub use normalizer::Normalizer;
pub use sentences::SentenceSplitter;

/// Strength of the silence associated with a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PauseWeight {
    #[default]
    None,
    Paragraph,
    Page,
}

/// A normalized sentence or an explicit pause marker, tagged with its source page.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Sentence { page: usize, text: String },
    Pause { page: usize, weight: PauseWeight },
}

impl Segment {
    pub fn sentence(page: usize, text: impl Into<String>) -> Self {
        Segment::Sentence {
            page,
            text: text.into(),
        }
    }

    pub fn pause(page: usize, weight: PauseWeight) -> Self {
        Segment::Pause { page, weight }
    }

    pub fn page(&self) -> usize {
        match self {
            Segment::Sentence { page, .. } | Segment::Pause { page, .. } => *page,
        }
    }

    /// Sentence text, or `None` for a pause marker.
    pub fn text(&self) -> Option<&str> {
        match self {
            Segment::Sentence { text, .. } => Some(text),
            Segment::Pause { .. } => None,
        }
    }
}
