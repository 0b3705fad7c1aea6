//! pdf2audio - Convert PDF documents to chaptered M4B audiobooks.

pub mod audio;
pub mod confidence;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod export;
pub mod extract;
pub mod pipeline;
pub mod speech;
pub mod synth;
pub mod text;

#[cfg(test)]
mod testing;

pub use error::{PipelineError, Result};
pub use pipeline::{Pipeline, RunOutcome, RunRequest};
