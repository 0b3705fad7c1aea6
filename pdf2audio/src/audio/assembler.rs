//! Concatenates synthesized chunks with boundary silences and derives chapters.

use super::resample::resample;
use super::{AssembledAudio, BookMetadata, ChapterMarker, ms_to_samples, samples_to_ms};
use crate::config::AssemblyConfig;
use crate::diagnostics::Warning;
use crate::error::AssemblyError;
use crate::synth::SynthesisResult;
use crate::text::{PauseWeight, SynthesisChunk};

/// A chapter under construction: where it starts and which pages it covers.
#[derive(Debug, Clone, Copy)]
struct OpenChapter {
    start_sample: u64,
    first_page: usize,
    last_page: usize,
}

/// Assemble chunk audio into one stream, in chunk order.
///
/// A chunk with a page-weight leading pause starts a new chapter. The boundary
/// sits at the start of the inserted page silence, so the silence opens the
/// new chapter. A failed chunk is replaced by silence of its estimated
/// length, so later chapters keep their timestamps, and is reported as a
/// warning. Chapter markers always tile `[0, total]` exactly.
pub fn assemble(
    chunks: &[SynthesisChunk],
    results: &[SynthesisResult],
    metadata: BookMetadata,
    config: &AssemblyConfig,
) -> Result<(AssembledAudio, Vec<Warning>), AssemblyError> {
    if chunks.len() != results.len() {
        return Err(AssemblyError::ResultCountMismatch {
            chunks: chunks.len(),
            results: results.len(),
        });
    }

    let sample_rate = results
        .iter()
        .find(|r| r.is_success() && r.sample_rate > 0)
        .map(|r| r.sample_rate)
        .ok_or(AssemblyError::NoAudio)?;

    let per_char = samples_per_char(chunks, results, sample_rate);
    let page_silence = ms_to_samples(config.page_silence_ms, sample_rate);
    let paragraph_silence = ms_to_samples(config.paragraph_silence_ms, sample_rate);

    let mut samples: Vec<i16> = Vec::new();
    let mut warnings = Vec::new();
    let mut closed: Vec<(OpenChapter, u64)> = Vec::new();
    let mut current = OpenChapter {
        start_sample: 0,
        first_page: chunks.first().map_or(0, |c| c.first_page),
        last_page: chunks.first().map_or(0, |c| c.last_page),
    };

    for (i, (chunk, result)) in chunks.iter().zip(results).enumerate() {
        if i > 0 {
            let silence = match chunk.leading_pause {
                PauseWeight::Page => {
                    let boundary = samples.len() as u64;
                    closed.push((current, boundary));
                    current = OpenChapter {
                        start_sample: boundary,
                        first_page: chunk.first_page,
                        last_page: chunk.last_page,
                    };
                    page_silence
                }
                PauseWeight::Paragraph => paragraph_silence,
                PauseWeight::None => 0,
            };
            samples.resize(samples.len() + silence, 0);
        }
        current.last_page = current.last_page.max(chunk.last_page);

        if !result.is_success() || result.samples.is_empty() {
            let gap = (chunk.char_len() as f64 * per_char).round() as usize;
            warnings.push(Warning::MissingChunkAudio {
                chunk: chunk.index,
                at_ms: samples_to_ms(samples.len() as u64, sample_rate),
                gap_ms: samples_to_ms(gap as u64, sample_rate),
            });
            samples.resize(samples.len() + gap, 0);
            continue;
        }

        if result.sample_rate == sample_rate {
            samples.extend_from_slice(&result.samples);
        } else {
            log::debug!(
                "Resampling chunk {} from {} Hz to {} Hz",
                chunk.index,
                result.sample_rate,
                sample_rate
            );
            samples.extend(resample(&result.samples, result.sample_rate, sample_rate)?);
        }
    }
    closed.push((current, samples.len() as u64));

    let chapters = build_chapters(&closed, sample_rate);
    log::info!(
        "Assembled {} of audio in {} chapters",
        crate::diagnostics::format_timestamp(samples_to_ms(samples.len() as u64, sample_rate)),
        chapters.len()
    );

    Ok((
        AssembledAudio {
            samples,
            sample_rate,
            chapters,
            metadata,
        },
        warnings,
    ))
}

/// Average stream samples per character over the chunks that succeeded.
fn samples_per_char(
    chunks: &[SynthesisChunk],
    results: &[SynthesisResult],
    stream_rate: u32,
) -> f64 {
    let (samples, chars) = chunks
        .iter()
        .zip(results)
        .filter(|(_, r)| r.is_success() && r.sample_rate > 0)
        .fold((0f64, 0usize), |(samples, chars), (chunk, r)| {
            let scaled = r.samples.len() as f64 * stream_rate as f64 / r.sample_rate as f64;
            (samples + scaled, chars + chunk.char_len())
        });

    if chars == 0 { 0.0 } else { samples / chars as f64 }
}

/// Turn closed chapters into markers, folding zero-length chapters into the
/// chapter that follows them (or the one before, at the end).
fn build_chapters(closed: &[(OpenChapter, u64)], sample_rate: u32) -> Vec<ChapterMarker> {
    let mut merged: Vec<(OpenChapter, u64)> = Vec::new();
    let mut carry: Option<usize> = None;

    for &(mut chapter, end) in closed {
        if end == chapter.start_sample {
            carry = Some(carry.map_or(chapter.first_page, |p| p.min(chapter.first_page)));
            continue;
        }
        if let Some(page) = carry.take() {
            chapter.first_page = chapter.first_page.min(page);
        }
        merged.push((chapter, end));
    }
    if let (Some(page), Some(last)) = (carry, merged.last_mut()) {
        last.0.last_page = last.0.last_page.max(page);
    }

    merged
        .into_iter()
        .enumerate()
        .map(|(index, (chapter, end))| ChapterMarker {
            index,
            title: chapter_title(chapter.first_page, chapter.last_page),
            first_page: chapter.first_page,
            last_page: chapter.last_page,
            start_sample: chapter.start_sample,
            end_sample: end,
            start_ms: samples_to_ms(chapter.start_sample, sample_rate),
            end_ms: samples_to_ms(end, sample_rate),
        })
        .collect()
}

/// "Page N" or "Pages N-M", 1-based.
fn chapter_title(first_page: usize, last_page: usize) -> String {
    if first_page == last_page {
        format!("Page {}", first_page + 1)
    } else {
        format!("Pages {}-{}", first_page + 1, last_page + 1)
    }
}
