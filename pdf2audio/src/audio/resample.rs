//! Sample-rate conversion for chunks that do not match the stream rate.

use crate::error::AssemblyError;
use rubato::{FftFixedIn, Resampler};

const CHUNK: usize = 1024;
const SUB_CHUNKS: usize = 2;

/// Resample mono 16-bit PCM from `from` Hz to `to` Hz.
///
/// The output keeps the input's duration at the new rate; the resampler's
/// delay is trimmed off the front.
pub fn resample(samples: &[i16], from: u32, to: u32) -> Result<Vec<i16>, AssemblyError> {
    if from == to || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let failed = |message: String| AssemblyError::Resample { from, to, message };
    if from == 0 || to == 0 {
        return Err(failed("sample rate must be non-zero".to_string()));
    }

    let mut resampler = FftFixedIn::<f32>::new(from as usize, to as usize, CHUNK, SUB_CHUNKS, 1)
        .map_err(|e| failed(e.to_string()))?;

    let input: Vec<f32> = samples.iter().map(|&s| s as f32 / 32768.0).collect();
    let expected = (samples.len() as f64 * to as f64 / from as f64).round() as usize;
    let delay = resampler.output_delay();
    let mut out: Vec<f32> = Vec::with_capacity(expected + delay + CHUNK);

    let mut pos = 0;
    while input.len() - pos >= resampler.input_frames_next() {
        let end = pos + resampler.input_frames_next();
        let block: [&[f32]; 1] = [&input[pos..end]];
        let frames = resampler
            .process(&block[..], None)
            .map_err(|e| failed(e.to_string()))?;
        out.extend_from_slice(&frames[0]);
        pos = end;
    }

    if pos < input.len() {
        let tail: [&[f32]; 1] = [&input[pos..]];
        let frames = resampler
            .process_partial(Some(&tail[..]), None)
            .map_err(|e| failed(e.to_string()))?;
        out.extend_from_slice(&frames[0]);
    }

    // Flush the delay line
    while out.len() < expected + delay {
        let frames = resampler
            .process_partial::<&[f32]>(None, None)
            .map_err(|e| failed(e.to_string()))?;
        if frames[0].is_empty() {
            break;
        }
        out.extend_from_slice(&frames[0]);
    }

    Ok(out
        .into_iter()
        .skip(delay)
        .chain(std::iter::repeat(0.0))
        .take(expected)
        .map(|s| (s * 32768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect())
}
