//! Speech engine contract and request types.

pub mod piper;

use crate::config::{DEFAULT_SPEECH_SPEED, MAX_SPEECH_SPEED, MIN_SPEECH_SPEED};
use crate::error::SpeechError;
use async_trait::async_trait;

pub use piper::PiperEngine;

/// One synthesis call: text plus the active voice and speed.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    /// Voice identifier understood by the engine
    pub voice: String,
    /// Speed multiplier (0.5-2.0, default 1.0)
    pub speed: f32,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: String::new(),
            speed: DEFAULT_SPEECH_SPEED,
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_speed(mut self, speed: f32) -> Self {
        self.speed = speed.clamp(MIN_SPEECH_SPEED, MAX_SPEECH_SPEED);
        self
    }
}

/// Raw mono 16-bit PCM returned by an engine.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechAudio {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl SpeechAudio {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// A text-to-speech engine. Model loading and lifecycle belong to the engine.
#[async_trait]
pub trait SpeechEngine: Send + Sync {
    /// Engine name for logs.
    fn name(&self) -> &str;

    /// Voice used when a request does not name one.
    fn default_voice(&self) -> &str;

    /// Synthesize one request to raw samples.
    async fn synthesize(&self, request: &SpeechRequest) -> Result<SpeechAudio, SpeechError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let req = SpeechRequest::new("Hello.");
        assert_eq!(req.text, "Hello.");
        assert_eq!(req.voice, "");
        assert_eq!(req.speed, 1.0);
    }

    #[test]
    fn test_request_builder_clamps_speed() {
        let req = SpeechRequest::new("Hi.").with_voice("en_GB-alan-low").with_speed(5.0);
        assert_eq!(req.voice, "en_GB-alan-low");
        assert_eq!(req.speed, 2.0);
        assert_eq!(SpeechRequest::new("x").with_speed(0.1).speed, 0.5);
        assert_eq!(SpeechRequest::new("x").with_speed(1.25).speed, 1.25);
    }

    #[test]
    fn test_audio_duration() {
        let audio = SpeechAudio {
            samples: vec![0; 33075],
            sample_rate: 22050,
        };
        assert_eq!(audio.duration_ms(), 1500);
        let silent = SpeechAudio {
            samples: vec![],
            sample_rate: 0,
        };
        assert_eq!(silent.duration_ms(), 0);
    }
}
