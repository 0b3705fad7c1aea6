//! Piper neural TTS, driven as an external process.
//!
//! Piper reads text on stdin and, with `--output_raw`, writes 16-bit mono
//! little-endian PCM to stdout at the voice's native sample rate.

use super::{SpeechAudio, SpeechEngine, SpeechRequest};
use crate::error::SpeechError;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Sample rate assumed when a voice has no readable config.
pub const DEFAULT_PIPER_SAMPLE_RATE: u32 = 22050;

/// The `<model>.onnx.json` file shipped with every Piper voice.
#[derive(Debug, Deserialize)]
struct VoiceConfig {
    audio: VoiceAudio,
}

#[derive(Debug, Deserialize)]
struct VoiceAudio {
    sample_rate: u32,
}

pub struct PiperEngine {
    binary: PathBuf,
    model: PathBuf,
    voice: String,
}

impl PiperEngine {
    /// Create an engine for the given voice model (`.onnx`).
    pub fn new(binary: impl Into<PathBuf>, model: impl Into<PathBuf>) -> Result<Self, SpeechError> {
        let model = model.into();
        if !model.exists() {
            return Err(SpeechError::VoiceNotFound(model.display().to_string()));
        }

        Ok(Self {
            binary: binary.into(),
            voice: voice_id(&model),
            model,
        })
    }

    /// Model file for a voice: the configured one, or a sibling `<voice>.onnx`.
    fn resolve_model(&self, voice: &str) -> Result<PathBuf, SpeechError> {
        if voice.is_empty() || voice == self.voice {
            return Ok(self.model.clone());
        }

        let candidate = self
            .model
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(format!("{}.onnx", voice));
        if candidate.exists() {
            Ok(candidate)
        } else {
            Err(SpeechError::VoiceNotFound(voice.to_string()))
        }
    }
}

#[async_trait]
impl SpeechEngine for PiperEngine {
    fn name(&self) -> &str {
        "piper"
    }

    fn default_voice(&self) -> &str {
        &self.voice
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechAudio, SpeechError> {
        let model = self.resolve_model(&request.voice)?;
        let sample_rate = model_sample_rate(&model);

        let mut child = Command::new(&self.binary)
            .arg("--model")
            .arg(&model)
            .arg("--output_raw")
            .arg("--length_scale")
            .arg(length_scale(request.speed))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SpeechError::Engine(format!("failed to start {}: {}", self.binary.display(), e))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(request.text.as_bytes())
                .await
                .map_err(|e| SpeechError::Engine(format!("failed to write text: {}", e)))?;
            stdin
                .write_all(b"\n")
                .await
                .map_err(|e| SpeechError::Engine(format!("failed to write text: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SpeechError::Engine(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SpeechError::Engine(format!(
                "piper exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let samples = decode_pcm(&output.stdout)?;
        Ok(SpeechAudio {
            samples,
            sample_rate,
        })
    }
}

/// Voice identifier: the model file name without `.onnx`.
pub fn voice_id(model: &Path) -> String {
    model
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "voice".to_string())
}

/// Piper's `--length_scale` is the inverse of speed.
fn length_scale(speed: f32) -> String {
    format!("{:.3}", 1.0 / speed.max(f32::EPSILON))
}

/// Sample rate from `<model>.onnx.json`, falling back to the Piper default.
fn model_sample_rate(model: &Path) -> u32 {
    let mut config_path = model.as_os_str().to_owned();
    config_path.push(".json");

    let parsed = std::fs::read_to_string(&config_path)
        .map_err(|e| e.to_string())
        .and_then(|json| {
            serde_json::from_str::<VoiceConfig>(&json).map_err(|e| e.to_string())
        });

    match parsed {
        Ok(config) => config.audio.sample_rate,
        Err(e) => {
            log::debug!(
                "No usable voice config for {} ({}); assuming {} Hz",
                model.display(),
                e,
                DEFAULT_PIPER_SAMPLE_RATE
            );
            DEFAULT_PIPER_SAMPLE_RATE
        }
    }
}

/// Decode little-endian 16-bit PCM.
fn decode_pcm(bytes: &[u8]) -> Result<Vec<i16>, SpeechError> {
    if bytes.is_empty() {
        return Err(SpeechError::MalformedOutput("no audio produced".to_string()));
    }
    if bytes.len() % 2 != 0 {
        return Err(SpeechError::MalformedOutput(format!(
            "odd PCM byte count {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}
