//! ffmpeg muxer and ffprobe validation probe.

use super::metadata::write_ffmetadata;
use super::{ContainerMuxer, ProbeReport};
use crate::audio::AssembledAudio;
use crate::config::ExportConfig;
use crate::error::ExportError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Writes the stream to WAV and muxes it with chapter metadata into an MP4 audiobook.
pub struct FfmpegMuxer {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
    codec: String,
    bitrate: String,
}

impl FfmpegMuxer {
    pub fn new(config: &ExportConfig) -> Self {
        Self {
            ffmpeg: config.ffmpeg_path.clone(),
            ffprobe: config.ffprobe_path.clone(),
            codec: config.codec.clone(),
            bitrate: config.bitrate.clone(),
        }
    }
}

impl ContainerMuxer for FfmpegMuxer {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn mux(&self, audio: &AssembledAudio, output: &Path) -> Result<(), ExportError> {
        let temp_dir = TempDir::new()?;
        let wav_path = temp_dir.path().join("book.wav");
        let metadata_path = temp_dir.path().join("metadata.txt");

        write_wav(&audio.samples, audio.sample_rate, &wav_path)?;
        write_ffmetadata(audio, &metadata_path)?;

        log::info!(
            "Encoding {} with {} at {}",
            output.display(),
            self.codec,
            self.bitrate
        );

        let result = Command::new(&self.ffmpeg)
            .args(["-y", "-v", "error", "-i"])
            .arg(&wav_path)
            .arg("-i")
            .arg(&metadata_path)
            .args(["-map", "0:a", "-map_metadata", "1", "-map_chapters", "1"])
            .args(["-c:a", &self.codec, "-b:a", &self.bitrate, "-f", "mp4"])
            .arg(output)
            .output()
            .map_err(|e| ExportError::Muxer {
                tool: "ffmpeg".to_string(),
                message: e.to_string(),
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ExportError::Muxer {
                tool: "ffmpeg".to_string(),
                message: stderr.trim().to_string(),
            });
        }

        Ok(())
    }

    fn probe(&self, output: &Path) -> Result<ProbeReport, ExportError> {
        let result = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_chapters",
            ])
            .arg(output)
            .output()
            .map_err(|e| ExportError::Muxer {
                tool: "ffprobe".to_string(),
                message: e.to_string(),
            })?;

        if !result.status.success() {
            return Err(ExportError::Probe(format!(
                "ffprobe exited with {}",
                result.status
            )));
        }

        parse_probe(&String::from_utf8_lossy(&result.stdout))
    }
}

/// Write mono 16-bit PCM as a WAV file.
pub fn write_wav(samples: &[i16], sample_rate: u32, path: &Path) -> Result<(), ExportError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = hound::WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    format: Option<ProbeFormat>,
    #[serde(default)]
    chapters: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Parse `ffprobe -print_format json -show_format -show_chapters` output.
pub fn parse_probe(json: &str) -> Result<ProbeReport, ExportError> {
    let parsed: ProbeOutput =
        serde_json::from_str(json).map_err(|e| ExportError::Probe(e.to_string()))?;

    let format = parsed
        .format
        .ok_or_else(|| ExportError::Probe("no format section".to_string()))?;

    let duration_secs = match format.duration {
        Some(d) => d
            .trim()
            .parse()
            .map_err(|_| ExportError::Probe(format!("bad duration {:?}", d)))?,
        None => 0.0,
    };

    Ok(ProbeReport {
        duration_secs,
        chapter_count: parsed.chapters.len(),
        tags: format
            .tags
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROBE_JSON: &str = r#"{
        "chapters": [
            {"id": 0, "time_base": "1/22050", "start": 0, "end": 30000, "tags": {"title": "Page 1"}},
            {"id": 1, "time_base": "1/22050", "start": 30000, "end": 44100, "tags": {"title": "Page 2"}}
        ],
        "format": {
            "filename": "out.m4b",
            "format_name": "mov,mp4,m4a,3gp,3g2,mj2",
            "duration": "2.000000",
            "tags": {"TITLE": "My Book", "artist": "Someone", "genre": "Audiobook"}
        }
    }"#;

    #[test]
    fn test_parse_probe() {
        let report = parse_probe(PROBE_JSON).unwrap();
        assert_eq!(report.chapter_count, 2);
        assert!((report.duration_secs - 2.0).abs() < 1e-9);
        assert_eq!(report.tags.get("title").map(String::as_str), Some("My Book"));
        assert_eq!(report.tags.get("artist").map(String::as_str), Some("Someone"));
    }

    #[test]
    fn test_parse_probe_without_chapters_or_duration() {
        let report = parse_probe(r#"{"format": {"filename": "x.m4b"}}"#).unwrap();
        assert_eq!(report.chapter_count, 0);
        assert_eq!(report.duration_secs, 0.0);
        assert!(report.tags.is_empty());
    }

    #[test]
    fn test_parse_probe_errors() {
        assert!(matches!(parse_probe("not json"), Err(ExportError::Probe(_))));
        assert!(matches!(parse_probe("{}"), Err(ExportError::Probe(_))));
        assert!(matches!(
            parse_probe(r#"{"format": {"duration": "N/A"}}"#),
            Err(ExportError::Probe(_))
        ));
    }

    #[test]
    fn test_write_wav_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&[0, 1000, -1000, i16::MAX], 16000, &path).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![0, 1000, -1000, i16::MAX]);
    }

    #[test]
    fn test_missing_ffmpeg_is_muxer_error() {
        let config = ExportConfig {
            ffmpeg_path: PathBuf::from("/nonexistent/ffmpeg"),
            ..ExportConfig::default()
        };
        let muxer = FfmpegMuxer::new(&config);
        let audio = crate::testing::assembled_audio(1000, 1);
        let dir = tempfile::TempDir::new().unwrap();

        let err = muxer.mux(&audio, &dir.path().join("out.m4b")).unwrap_err();
        assert!(matches!(err, ExportError::Muxer { .. }));
    }
}
