//! Drives the speech engine over the chunk sequence.
//!
//! Chunks are synthesized on a bounded number of concurrent calls; results
//! come back in chunk order no matter which call finishes first. A failed
//! chunk becomes an empty result plus a recorded failure and never stops the run.

use crate::config::SynthesisConfig;
use crate::diagnostics::ChunkFailure;
use crate::error::{PipelineError, SpeechError};
use crate::speech::{SpeechEngine, SpeechRequest};
use crate::text::{PauseWeight, SynthesisChunk};
use futures_util::stream::{self, StreamExt};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Lifecycle of one synthesis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    InProgress,
    Completed,
    CompletedWithWarnings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisStatus {
    Success,
    Failed(String),
}

/// Audio for one chunk. Failed chunks carry no samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub chunk_index: usize,
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub status: SynthesisStatus,
}

impl SynthesisResult {
    pub fn is_success(&self) -> bool {
        self.status == SynthesisStatus::Success
    }
}

/// Progress snapshot handed to the progress callback.
#[derive(Debug, Clone, Default)]
pub struct SynthesisProgress {
    /// Total number of chunks.
    pub total: usize,
    /// Chunks finished, successfully or not.
    pub completed: usize,
    /// Chunks that failed.
    pub failed: usize,
    /// Seconds of audio produced so far.
    pub audio_secs: f64,
}

/// Outcome of a synthesis run, one result per chunk in chunk order.
#[derive(Debug, Clone)]
pub struct SynthesisRun {
    pub results: Vec<SynthesisResult>,
    pub failures: Vec<ChunkFailure>,
    pub state: RunState,
}

impl SynthesisRun {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    /// Escalate to a document-level failure when too few chunks succeeded.
    pub fn ensure_coverage(&self, min_success_ratio: f64) -> Result<(), PipelineError> {
        let total = self.results.len();
        let succeeded = self.succeeded();
        let ratio = if total == 0 {
            0.0
        } else {
            succeeded as f64 / total as f64
        };

        if total == 0 || ratio < min_success_ratio {
            return Err(PipelineError::InsufficientSynthesisCoverage {
                succeeded,
                total,
                min_ratio: min_success_ratio,
            });
        }
        Ok(())
    }
}

pub struct Orchestrator {
    engine: Arc<dyn SpeechEngine>,
    voice: String,
    speed: f32,
    concurrency: usize,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(engine: Arc<dyn SpeechEngine>, config: &SynthesisConfig) -> Self {
        let voice = engine.default_voice().to_string();
        Self {
            engine,
            voice,
            speed: crate::config::clamp_speed(config.speed),
            concurrency: config.concurrency.max(1),
            timeout: Duration::from_secs(config.chunk_timeout_secs.max(1)),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Synthesize every chunk, reporting progress after each one finishes.
    pub async fn run<F>(&self, chunks: &[SynthesisChunk], mut on_progress: F) -> SynthesisRun
    where
        F: FnMut(&SynthesisProgress),
    {
        let mut state = RunState::Pending;
        let mut progress = SynthesisProgress {
            total: chunks.len(),
            ..Default::default()
        };
        transition(&mut state, RunState::InProgress);
        log::info!(
            "Synthesizing {} chunks with {} (voice {}, speed {}, {} concurrent)",
            chunks.len(),
            self.engine.name(),
            self.voice,
            self.speed,
            self.concurrency
        );

        let mut results = Vec::with_capacity(chunks.len());
        let mut failures = Vec::new();
        let mut pending = stream::iter(chunks.iter().map(move |chunk| self.synthesize_chunk(chunk)))
            .buffered(self.concurrency);

        while let Some((chunk, result)) = pending.next().await {
            progress.completed += 1;
            match &result.status {
                SynthesisStatus::Success => {
                    progress.audio_secs += result.samples.len() as f64 / result.sample_rate as f64;
                }
                SynthesisStatus::Failed(reason) => {
                    progress.failed += 1;
                    failures.push(ChunkFailure {
                        chunk: chunk.index,
                        first_page: chunk.first_page,
                        last_page: chunk.last_page,
                        reason: reason.clone(),
                    });
                }
            }
            results.push(result);
            on_progress(&progress);
        }

        let final_state = if failures.is_empty() {
            RunState::Completed
        } else {
            RunState::CompletedWithWarnings
        };
        transition(&mut state, final_state);

        SynthesisRun {
            results,
            failures,
            state,
        }
    }

    async fn synthesize_chunk<'c>(
        &self,
        chunk: &'c SynthesisChunk,
    ) -> (&'c SynthesisChunk, SynthesisResult) {
        let request = SpeechRequest::new(chunk.text())
            .with_voice(self.voice.clone())
            .with_speed(self.speed);
        let start = Instant::now();

        let synthesis = self.engine.synthesize(&request);
        let outcome = match tokio::time::timeout(self.timeout, synthesis).await {
            Ok(Ok(audio)) if audio.samples.is_empty() || audio.sample_rate == 0 => Err(
                SpeechError::MalformedOutput("engine returned no samples".to_string()),
            ),
            Ok(result) => result,
            Err(_) => Err(SpeechError::Timeout(self.timeout.as_secs())),
        };

        let result = match outcome {
            Ok(audio) => {
                log::debug!(
                    "Chunk {} ({} chars) synthesized in {:.1}s",
                    chunk.index,
                    request.text.chars().count(),
                    start.elapsed().as_secs_f64()
                );
                SynthesisResult {
                    chunk_index: chunk.index,
                    samples: audio.samples,
                    sample_rate: audio.sample_rate,
                    status: SynthesisStatus::Success,
                }
            }
            Err(e) => {
                log::debug!(
                    "Chunk {} failed after {:.1}s",
                    chunk.index,
                    start.elapsed().as_secs_f64()
                );
                SynthesisResult {
                    chunk_index: chunk.index,
                    samples: Vec::new(),
                    sample_rate: 0,
                    status: SynthesisStatus::Failed(e.to_string()),
                }
            }
        };

        (chunk, result)
    }
}

fn transition(state: &mut RunState, next: RunState) {
    log::debug!("Synthesis run {:?} -> {:?}", state, next);
    *state = next;
}

/// Pick one page uniformly among pages that have chunks, and return its
/// chunks re-indexed from zero.
///
/// Returns `None` when there are no chunks at all.
pub fn sample_page<R: Rng + ?Sized>(
    chunks: &[SynthesisChunk],
    rng: &mut R,
) -> Option<(usize, Vec<SynthesisChunk>)> {
    let mut pages: Vec<usize> = chunks.iter().map(|c| c.first_page).collect();
    pages.dedup();
    let page = *pages.choose(rng)?;

    let selected = chunks
        .iter()
        .filter(|c| c.first_page <= page && page <= c.last_page)
        .enumerate()
        .map(|(index, chunk)| SynthesisChunk {
            index,
            leading_pause: if index == 0 {
                PauseWeight::None
            } else {
                chunk.leading_pause
            },
            ..chunk.clone()
        })
        .collect();

    Some((page, selected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedEngine, chunk};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn config(concurrency: usize) -> SynthesisConfig {
        SynthesisConfig {
            concurrency,
            ..SynthesisConfig::default()
        }
    }

    fn chunks(n: usize) -> Vec<SynthesisChunk> {
        (0..n).map(|i| chunk(i, i, &format!("Sentence number {}.", i))).collect()
    }

    #[tokio::test]
    async fn test_all_chunks_succeed_in_order() {
        let engine = Arc::new(ScriptedEngine::new());
        let orchestrator = Orchestrator::new(engine.clone(), &config(3));

        let mut updates = 0;
        let run = orchestrator.run(&chunks(6), |_| updates += 1).await;

        assert_eq!(run.state, RunState::Completed);
        assert_eq!(updates, 6);
        assert_eq!(engine.call_count(), 6);
        assert_eq!(
            run.results.iter().map(|r| r.chunk_index).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 5]
        );
        assert!(run.results.iter().all(|r| r.is_success() && !r.samples.is_empty()));
        assert!(run.ensure_coverage(0.9).is_ok());
    }

    #[tokio::test]
    async fn test_order_preserved_when_later_chunks_finish_first() {
        // Earlier chunks take longer than later ones
        let engine = Arc::new(ScriptedEngine::new().with_delay_per_char(Duration::from_millis(2)));
        let orchestrator = Orchestrator::new(engine, &config(4));
        let chunks = vec![
            chunk(0, 0, "A much longer first sentence that takes a while to speak."),
            chunk(1, 0, "Short."),
            chunk(2, 1, "Tiny."),
        ];

        let run = orchestrator.run(&chunks, |_| {}).await;
        assert_eq!(
            run.results.iter().map(|r| r.chunk_index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let engine = Arc::new(ScriptedEngine::new().fail_on("Sentence number 2."));
        let orchestrator = Orchestrator::new(engine.clone(), &config(2));

        let run = orchestrator.run(&chunks(5), |_| {}).await;

        assert_eq!(run.state, RunState::CompletedWithWarnings);
        assert_eq!(engine.call_count(), 5);
        assert_eq!(run.results.len(), 5);
        assert!(run.results[2].samples.is_empty());
        assert!(matches!(run.results[2].status, SynthesisStatus::Failed(_)));
        assert_eq!(run.failures.len(), 1);
        assert_eq!(run.failures[0].chunk, 2);
        assert_eq!(run.failures[0].first_page, 2);
        assert!(run.ensure_coverage(0.5).is_ok());
        assert!(run.ensure_coverage(0.9).is_err());
    }

    #[tokio::test]
    async fn test_all_failures_is_insufficient_coverage() {
        let engine = Arc::new(ScriptedEngine::always_fails());
        let orchestrator = Orchestrator::new(engine, &config(2));

        let run = orchestrator.run(&chunks(3), |_| {}).await;
        assert_eq!(run.failures.len(), 3);
        let err = run.ensure_coverage(0.9).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::InsufficientSynthesisCoverage {
                succeeded: 0,
                total: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_timeout_becomes_chunk_failure() {
        let engine = Arc::new(ScriptedEngine::new().with_delay_per_char(Duration::from_millis(50)));
        let orchestrator =
            Orchestrator::new(engine, &config(1)).with_timeout(Duration::from_millis(100));

        let run = orchestrator
            .run(&[chunk(0, 0, "This one is long enough to time out.")], |_| {})
            .await;
        assert_eq!(run.failures.len(), 1);
        assert!(run.failures[0].reason.contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_audio_is_malformed() {
        let engine = Arc::new(ScriptedEngine::new().silent());
        let orchestrator = Orchestrator::new(engine, &config(1));

        let run = orchestrator.run(&chunks(1), |_| {}).await;
        assert!(run.failures[0].reason.contains("Malformed"));
    }

    #[tokio::test]
    async fn test_request_carries_voice_and_clamped_speed() {
        let engine = Arc::new(ScriptedEngine::new());
        let config = SynthesisConfig {
            speed: 3.0,
            ..SynthesisConfig::default()
        };
        let orchestrator = Orchestrator::new(engine.clone(), &config).with_voice("en_GB-alan-low");

        orchestrator.run(&chunks(1), |_| {}).await;
        let requests = engine.requests();
        assert_eq!(requests[0].voice, "en_GB-alan-low");
        assert_eq!(requests[0].speed, 2.0);
        assert_eq!(requests[0].text, "Sentence number 0.");
    }

    #[test]
    fn test_zero_chunks_is_insufficient() {
        let run = SynthesisRun {
            results: vec![],
            failures: vec![],
            state: RunState::Completed,
        };
        assert!(run.ensure_coverage(0.0).is_err());
    }

    #[test]
    fn test_sample_page_picks_one_page_and_reindexes() {
        let mut chunks = vec![
            chunk(0, 0, "A."),
            chunk(1, 1, "B."),
            chunk(2, 1, "C."),
            chunk(3, 3, "D."),
        ];
        chunks[1].leading_pause = PauseWeight::Page;
        chunks[2].leading_pause = PauseWeight::Paragraph;
        chunks[3].leading_pause = PauseWeight::Page;

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..20 {
            let (page, selected) = sample_page(&chunks, &mut rng).unwrap();
            assert!([0, 1, 3].contains(&page));
            assert!(selected.iter().all(|c| c.first_page == page));
            assert_eq!(selected[0].index, 0);
            assert_eq!(selected[0].leading_pause, PauseWeight::None);
            if page == 1 {
                assert_eq!(selected.len(), 2);
                assert_eq!(selected[1].index, 1);
                assert_eq!(selected[1].leading_pause, PauseWeight::Paragraph);
            }
        }
    }

    #[test]
    fn test_sample_page_empty() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(sample_page(&[], &mut rng).is_none());
    }
}
