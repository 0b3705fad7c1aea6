//! Sentence splitting using the seams library (dialog-aware), with a merge
//! pass that rejoins sentences broken after known abbreviations.

use seams::sentence_detector::dialog_detector::SentenceDetectorDialog;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Abbreviations that never end a sentence, in addition to the configured table.
const NON_TERMINAL: &[&str] = &["e.g", "i.e", "vs", "cf", "pp", "al", "Fig", "No", "Vol"];

/// Global detector instance (lazy initialization). `None` if it failed to build.
static DETECTOR: OnceLock<Option<SentenceDetectorDialog>> = OnceLock::new();

fn detector() -> Option<&'static SentenceDetectorDialog> {
    DETECTOR
        .get_or_init(|| match SentenceDetectorDialog::new() {
            Ok(detector) => Some(detector),
            Err(e) => {
                log::warn!("Sentence detector unavailable, paragraphs stay whole: {:?}", e);
                None
            }
        })
        .as_ref()
}

/// Splits single-paragraph text into sentences.
#[derive(Debug, Clone)]
pub struct SentenceSplitter {
    abbreviations: HashSet<String>,
}

impl SentenceSplitter {
    pub fn new<I, S>(abbreviations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: HashSet<String> = abbreviations.into_iter().map(Into::into).collect();
        set.extend(NON_TERMINAL.iter().map(|s| s.to_string()));
        Self { abbreviations: set }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let detected = match detector().map(|d| d.detect_sentences_borrowed(text)) {
            Some(Ok(sentences)) => sentences.iter().map(|s| s.normalize()).collect(),
            Some(Err(e)) => {
                log::warn!("Sentence detection failed, keeping paragraph whole: {:?}", e);
                vec![text.to_string()]
            }
            None => vec![text.to_string()],
        };

        self.rejoin_abbreviations(detected)
    }

    /// Merge each piece that ends in a known abbreviation with the piece after it.
    fn rejoin_abbreviations(&self, pieces: Vec<String>) -> Vec<String> {
        let mut sentences: Vec<String> = Vec::with_capacity(pieces.len());

        for piece in pieces {
            let piece = piece.trim();
            if piece.is_empty() {
                continue;
            }
            match sentences.last_mut() {
                Some(previous) if self.ends_with_abbreviation(previous) => {
                    previous.push(' ');
                    previous.push_str(piece);
                }
                _ => sentences.push(piece.to_string()),
            }
        }

        sentences
    }

    fn ends_with_abbreviation(&self, sentence: &str) -> bool {
        let Some(stem) = sentence.strip_suffix('.') else {
            return false;
        };
        let word = stem
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or("")
            .trim_start_matches(['"', '\'', '(', '[']);
        self.abbreviations.contains(word)
    }
}
