//! Test doubles for the external collaborators of the pipeline.

use crate::audio::{AssembledAudio, BookMetadata, ChapterMarker};
use crate::error::{ExportError, ExtractError, SpeechError};
use crate::export::{ContainerMuxer, ProbeReport};
use crate::extract::{DocumentInfo, PageText, TextBackend};
use crate::speech::{SpeechAudio, SpeechEngine, SpeechRequest};
use crate::text::{PauseWeight, Segment, SynthesisChunk};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Shared call counter that outlives the double it was taken from.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Extraction backend returning fixed page texts.
pub struct ScriptedBackend {
    pages: Vec<PageText>,
    open_error: Option<String>,
    info: DocumentInfo,
    calls: CallCounter,
}

impl ScriptedBackend {
    pub fn new(pages: Vec<PageText>) -> Self {
        Self {
            pages,
            open_error: None,
            info: DocumentInfo::default(),
            calls: CallCounter::default(),
        }
    }

    /// A backend that cannot open any document.
    pub fn failing(message: &str) -> Self {
        Self {
            open_error: Some(message.to_string()),
            ..Self::new(Vec::new())
        }
    }

    pub fn with_info(mut self, title: Option<&str>, author: Option<&str>) -> Self {
        self.info = DocumentInfo {
            title: title.map(str::to_string),
            author: author.map(str::to_string),
        };
        self
    }

    pub fn calls(&self) -> CallCounter {
        self.calls.clone()
    }
}

impl TextBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn page_texts(&self, _path: &Path) -> Result<Vec<PageText>, ExtractError> {
        self.calls.bump();
        match &self.open_error {
            Some(message) => Err(ExtractError::Open {
                backend: "scripted".to_string(),
                message: message.clone(),
            }),
            None => Ok(self.pages.clone()),
        }
    }

    fn document_info(&self, _path: &Path) -> DocumentInfo {
        self.info.clone()
    }
}

/// Speech engine producing `samples_per_char` samples of tone per character.
pub struct ScriptedEngine {
    sample_rate: u32,
    samples_per_char: usize,
    fail_on: Vec<String>,
    fail_all: bool,
    delay_per_char: Duration,
    calls: CallCounter,
    requests: Mutex<Vec<SpeechRequest>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            sample_rate: 1000,
            samples_per_char: 10,
            fail_on: Vec::new(),
            fail_all: false,
            delay_per_char: Duration::ZERO,
            calls: CallCounter::default(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn always_fails() -> Self {
        Self {
            fail_all: true,
            ..Self::new()
        }
    }

    /// Fail any request whose text contains `text`.
    pub fn fail_on(mut self, text: &str) -> Self {
        self.fail_on.push(text.to_string());
        self
    }

    /// Succeed with no samples.
    pub fn silent(mut self) -> Self {
        self.samples_per_char = 0;
        self
    }

    pub fn with_delay_per_char(mut self, delay: Duration) -> Self {
        self.delay_per_char = delay;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.get()
    }

    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_voice(&self) -> &str {
        "test-voice"
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechAudio, SpeechError> {
        self.calls.bump();
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        let chars = request.text.chars().count();
        if !self.delay_per_char.is_zero() {
            tokio::time::sleep(self.delay_per_char * chars as u32).await;
        }

        if self.fail_all || self.fail_on.iter().any(|t| request.text.contains(t.as_str())) {
            return Err(SpeechError::Engine("scripted failure".to_string()));
        }

        Ok(SpeechAudio {
            samples: vec![1000; chars * self.samples_per_char],
            sample_rate: self.sample_rate,
        })
    }
}

/// Muxer that writes a placeholder file and reports a fixed probe.
pub struct RecordingMuxer {
    probe: Option<ProbeReport>,
    fail_mux: bool,
    mux_calls: CallCounter,
}

impl RecordingMuxer {
    /// `probe = None` makes probing fail.
    pub fn new(probe: Option<ProbeReport>) -> Self {
        Self {
            probe,
            fail_mux: false,
            mux_calls: CallCounter::default(),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_mux: true,
            ..Self::new(None)
        }
    }

    pub fn mux_calls(&self) -> usize {
        self.mux_calls.get()
    }
}

impl ContainerMuxer for RecordingMuxer {
    fn name(&self) -> &str {
        "recording"
    }

    fn mux(&self, _audio: &AssembledAudio, output: &Path) -> Result<(), ExportError> {
        self.mux_calls.bump();
        if self.fail_mux {
            return Err(ExportError::Muxer {
                tool: "recording".to_string(),
                message: "scripted failure".to_string(),
            });
        }
        std::fs::write(output, b"m4b")?;
        Ok(())
    }

    fn probe(&self, _output: &Path) -> Result<ProbeReport, ExportError> {
        self.probe
            .clone()
            .ok_or_else(|| ExportError::Probe("no probe scripted".to_string()))
    }
}

/// A single-sentence chunk on one page.
pub fn chunk(index: usize, page: usize, text: &str) -> SynthesisChunk {
    SynthesisChunk {
        index,
        segments: vec![Segment::sentence(page, text)],
        first_page: page,
        last_page: page,
        leading_pause: PauseWeight::None,
    }
}

/// Audio of `samples` samples at 1 kHz split evenly into `chapters` chapters.
pub fn assembled_audio(samples: usize, chapters: usize) -> AssembledAudio {
    let per = (samples / chapters.max(1)) as u64;
    let markers = (0..chapters)
        .map(|i| {
            let start = i as u64 * per;
            let end = if i + 1 == chapters {
                samples as u64
            } else {
                start + per
            };
            ChapterMarker {
                index: i,
                title: format!("Page {}", i + 1),
                first_page: i,
                last_page: i,
                start_sample: start,
                end_sample: end,
                start_ms: start,
                end_ms: end,
            }
        })
        .collect();

    AssembledAudio {
        samples: vec![0; samples],
        sample_rate: 1000,
        chapters: markers,
        metadata: BookMetadata {
            title: "Test Book".to_string(),
            author: "Test Author".to_string(),
            source_file: "test.pdf".to_string(),
            genre: "Audiobook".to_string(),
        },
    }
}
