//! Audio assembly: one continuous stream plus chapter markers.

pub mod assembler;
pub mod resample;

use serde::Serialize;

pub use assembler::assemble;

/// A named time range of the final audio, covering one page or a page group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterMarker {
    pub index: usize,
    pub title: String,
    pub first_page: usize,
    pub last_page: usize,
    /// Sample offsets; `end_sample` is exclusive
    pub start_sample: u64,
    pub end_sample: u64,
    pub start_ms: u64,
    pub end_ms: u64,
}

/// Document-level tags written to the container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
    /// File name of the source document
    pub source_file: String,
    pub genre: String,
}

/// The assembled stream, ready for export.
#[derive(Debug, Clone)]
pub struct AssembledAudio {
    /// Mono 16-bit PCM
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub chapters: Vec<ChapterMarker>,
    pub metadata: BookMetadata,
}

impl AssembledAudio {
    pub fn duration_ms(&self) -> u64 {
        samples_to_ms(self.samples.len() as u64, self.sample_rate)
    }
}

/// Convert a sample offset to milliseconds (floored).
pub fn samples_to_ms(samples: u64, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    samples * 1000 / sample_rate as u64
}

/// Number of samples in `ms` milliseconds of audio.
pub fn ms_to_samples(ms: u64, sample_rate: u32) -> usize {
    (ms * sample_rate as u64 / 1000) as usize
}
