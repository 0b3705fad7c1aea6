//! pdf2audio configuration management.

use crate::extract::BackendKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

// Extraction heuristics
pub const BLANK_PAGE_CHAR_THRESHOLD: usize = 50;
pub const MAX_BLANK_RATIO: f64 = 0.3;
pub const MAX_DISORDER_RATIO: f64 = 0.3;
pub const CHAR_DROP_FACTOR: f64 = 0.3;
pub const MAX_DEVIATION_RATIO: f64 = 0.25;
pub const ROLLING_WINDOW_PAGES: usize = 5;
pub const MIN_PAGES_FOR_HEURISTICS: usize = 3;
pub const MIN_LINES_FOR_LAYOUT: usize = 6;
pub const COLUMN_GAP_SPACES: usize = 3;
pub const MAX_GAP_LINE_RATIO: f64 = 0.4;
pub const MAX_LINE_LENGTH_CV: f64 = 1.2;

// Speech
pub const DEFAULT_SPEECH_SPEED: f32 = 1.0;
pub const MIN_SPEECH_SPEED: f32 = 0.5;
pub const MAX_SPEECH_SPEED: f32 = 2.0;

/// Top-level configuration, stored as TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Pdf2AudioConfig {
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub normalizer: NormalizerConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub assembly: AssemblyConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Backend used for the first pass
    #[serde(default)]
    pub backend: BackendKind,
    #[serde(default)]
    pub thresholds: ConfidenceThresholds,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Fast,
            thresholds: ConfidenceThresholds::default(),
        }
    }
}

/// Thresholds the confidence evaluator compares signals against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// Pages with fewer trimmed characters than this count as blank
    #[serde(default = "default_blank_chars")]
    pub blank_page_chars: usize,
    /// Retry when more than this fraction of pages is blank
    #[serde(default = "default_blank_ratio")]
    pub max_blank_ratio: f64,
    /// Retry when more than this fraction of pages looks column-garbled
    #[serde(default = "default_disorder_ratio")]
    pub max_disorder_ratio: f64,
    /// A page below `factor * rolling average` characters is a drop
    #[serde(default = "default_char_drop_factor")]
    pub char_drop_factor: f64,
    /// Retry when more than this fraction of pages is a drop
    #[serde(default = "default_deviation_ratio")]
    pub max_deviation_ratio: f64,
    /// Number of preceding non-blank pages in the rolling average
    #[serde(default = "default_rolling_window")]
    pub rolling_window: usize,
    /// Ratio signals are only acted on for documents at least this long
    #[serde(default = "default_min_pages")]
    pub min_pages_for_heuristics: usize,
    /// Pages with fewer lines are never flagged as column-garbled
    #[serde(default = "default_min_lines")]
    pub min_lines_for_layout: usize,
    /// An internal run of this many spaces marks a column gutter
    #[serde(default = "default_gap_spaces")]
    pub column_gap_spaces: usize,
    #[serde(default = "default_gap_line_ratio")]
    pub max_gap_line_ratio: f64,
    /// Coefficient of variation of line lengths above which a page is garbled
    #[serde(default = "default_line_length_cv")]
    pub max_line_length_cv: f64,
}

fn default_blank_chars() -> usize {
    BLANK_PAGE_CHAR_THRESHOLD
}
fn default_blank_ratio() -> f64 {
    MAX_BLANK_RATIO
}
fn default_disorder_ratio() -> f64 {
    MAX_DISORDER_RATIO
}
fn default_char_drop_factor() -> f64 {
    CHAR_DROP_FACTOR
}
fn default_deviation_ratio() -> f64 {
    MAX_DEVIATION_RATIO
}
fn default_rolling_window() -> usize {
    ROLLING_WINDOW_PAGES
}
fn default_min_pages() -> usize {
    MIN_PAGES_FOR_HEURISTICS
}
fn default_min_lines() -> usize {
    MIN_LINES_FOR_LAYOUT
}
fn default_gap_spaces() -> usize {
    COLUMN_GAP_SPACES
}
fn default_gap_line_ratio() -> f64 {
    MAX_GAP_LINE_RATIO
}
fn default_line_length_cv() -> f64 {
    MAX_LINE_LENGTH_CV
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            blank_page_chars: default_blank_chars(),
            max_blank_ratio: default_blank_ratio(),
            max_disorder_ratio: default_disorder_ratio(),
            char_drop_factor: default_char_drop_factor(),
            max_deviation_ratio: default_deviation_ratio(),
            rolling_window: default_rolling_window(),
            min_pages_for_heuristics: default_min_pages(),
            min_lines_for_layout: default_min_lines(),
            column_gap_spaces: default_gap_spaces(),
            max_gap_line_ratio: default_gap_line_ratio(),
            max_line_length_cv: default_line_length_cv(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizerConfig {
    /// Abbreviation (without its period) -> spoken expansion
    #[serde(default = "default_abbreviations")]
    pub abbreviations: BTreeMap<String, String>,
    /// Replace abbreviations with their expansion before a capitalized word
    #[serde(default)]
    pub expand_abbreviations: bool,
    /// Prefixes that stay hyphenated when split across a line break
    #[serde(default = "default_short_words")]
    pub short_words: Vec<String>,
}

fn default_abbreviations() -> BTreeMap<String, String> {
    [
        ("Dr", "Doctor"),
        ("Mr", "Mister"),
        ("Mrs", "Missus"),
        ("Ms", "Miz"),
        ("Prof", "Professor"),
        ("St", "Saint"),
        ("Sr", "Senior"),
        ("Jr", "Junior"),
        ("Gen", "General"),
        ("Capt", "Captain"),
        ("Lt", "Lieutenant"),
        ("Rev", "Reverend"),
        ("Hon", "Honorable"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

fn default_short_words() -> Vec<String> {
    [
        "all", "anti", "co", "cross", "ex", "full", "half", "high", "long", "low", "multi",
        "non", "off", "on", "one", "over", "post", "pre", "re", "self", "semi", "short",
        "so", "two", "under", "well", "wide",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            abbreviations: default_abbreviations(),
            expand_abbreviations: false,
            short_words: default_short_words(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per synthesis chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
    /// Start a new chapter (and chunk) at every page boundary
    #[serde(default = "default_true")]
    pub chapter_per_page: bool,
}

fn default_max_chunk_chars() -> usize {
    500
}

fn default_true() -> bool {
    true
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            chapter_per_page: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisConfig {
    /// Piper executable
    #[serde(default = "default_piper")]
    pub piper_path: PathBuf,
    /// Piper voice model (.onnx)
    #[serde(default = "default_voice_model")]
    pub voice_model: PathBuf,
    /// Speech speed multiplier (0.5-2.0)
    #[serde(default = "default_speed")]
    pub speed: f32,
    /// Maximum concurrent engine invocations
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Per-chunk timeout in seconds
    #[serde(default = "default_chunk_timeout")]
    pub chunk_timeout_secs: u64,
    /// Runs below this success ratio fail as a whole
    #[serde(default = "default_min_success_ratio")]
    pub min_success_ratio: f64,
}

fn default_piper() -> PathBuf {
    PathBuf::from("piper")
}
fn default_voice_model() -> PathBuf {
    PathBuf::from("models/en_US-lessac-medium.onnx")
}
fn default_speed() -> f32 {
    DEFAULT_SPEECH_SPEED
}
fn default_concurrency() -> usize {
    2
}
fn default_chunk_timeout() -> u64 {
    120
}
fn default_min_success_ratio() -> f64 {
    0.9
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            piper_path: default_piper(),
            voice_model: default_voice_model(),
            speed: default_speed(),
            concurrency: default_concurrency(),
            chunk_timeout_secs: default_chunk_timeout(),
            min_success_ratio: default_min_success_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyConfig {
    /// Silence before the first chunk of a new page
    #[serde(default = "default_page_silence")]
    pub page_silence_ms: u64,
    /// Silence before a chunk that starts a new paragraph
    #[serde(default = "default_paragraph_silence")]
    pub paragraph_silence_ms: u64,
}

fn default_page_silence() -> u64 {
    1200
}
fn default_paragraph_silence() -> u64 {
    500
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            page_silence_ms: default_page_silence(),
            paragraph_silence_ms: default_paragraph_silence(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: PathBuf,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    #[serde(default = "default_genre")]
    pub genre: String,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}
fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}
fn default_codec() -> String {
    "aac".to_string()
}
fn default_bitrate() -> String {
    "64k".to_string()
}
fn default_genre() -> String {
    "Audiobook".to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            codec: default_codec(),
            bitrate: default_bitrate(),
            genre: default_genre(),
        }
    }
}

impl Pdf2AudioConfig {
    /// Get the config file path: ~/.config/cli-programs/pdf2audio.toml
    pub fn config_path() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
        Ok(home
            .join(".config")
            .join("cli-programs")
            .join("pdf2audio.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)?;
        let config: Pdf2AudioConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        Ok(())
    }
}

/// Clamp a requested speed into the range the engine handles well.
pub fn clamp_speed(speed: f32) -> f32 {
    let clamped = speed.clamp(MIN_SPEECH_SPEED, MAX_SPEECH_SPEED);
    if clamped != speed {
        log::warn!(
            "Speed adjusted to {} (valid range: {}-{})",
            clamped,
            MIN_SPEECH_SPEED,
            MAX_SPEECH_SPEED
        );
    }
    clamped
}
