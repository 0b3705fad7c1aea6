//! Turns extracted page text into sentence and pause segments.

use super::cleaner::{
    collapse_period_runs, normalize_punctuation, repair_hyphenation, split_paragraphs,
};
use super::sentences::SentenceSplitter;
use super::{PauseWeight, Segment};
use crate::config::NormalizerConfig;
use regex::Regex;

/// Characters that end a sentence, possibly followed by closing quotes.
const TERMINATORS: &[char] = &['.', '!', '?'];

/// Per-page text normalizer.
pub struct Normalizer {
    config: NormalizerConfig,
    splitter: SentenceSplitter,
    /// `None` when abbreviation expansion is disabled or the table is empty
    abbreviation_pattern: Option<Regex>,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        let splitter = SentenceSplitter::new(config.abbreviations.keys().cloned());
        let abbreviation_pattern = if config.expand_abbreviations {
            abbreviation_regex(config.abbreviations.keys())
        } else {
            None
        };

        Self {
            config,
            splitter,
            abbreviation_pattern,
        }
    }

    /// Expand table abbreviations that are followed by a capitalized word.
    pub fn expand_abbreviations(&self, text: &str) -> String {
        let Some(pattern) = &self.abbreviation_pattern else {
            return text.to_string();
        };

        pattern
            .replace_all(text, |caps: &regex::Captures| {
                let expansion = self
                    .config
                    .abbreviations
                    .get(&caps[1])
                    .map(String::as_str)
                    .unwrap_or(&caps[1]);
                format!("{}{}", expansion, &caps[2])
            })
            .into_owned()
    }

    /// Paragraphs of one page, each as its list of sentences.
    pub fn page_paragraphs(&self, text: &str) -> Vec<Vec<String>> {
        let text = normalize_punctuation(text);
        let text = repair_hyphenation(&text, &self.config.short_words);

        split_paragraphs(&text)
            .into_iter()
            .map(|paragraph| {
                let paragraph = self.expand_abbreviations(&collapse_period_runs(&paragraph));
                let mut sentences: Vec<String> = self
                    .splitter
                    .split(&paragraph)
                    .into_iter()
                    .filter(|s| s.chars().any(char::is_alphanumeric))
                    .collect();
                if let Some(last) = sentences.last_mut() {
                    terminate(last);
                }
                sentences
            })
            .filter(|sentences| !sentences.is_empty())
            .collect()
    }

    /// Segments for one page: sentences with paragraph markers between paragraphs.
    pub fn normalize_page(&self, page: usize, text: &str) -> Vec<Segment> {
        let mut segments = Vec::new();

        for (i, paragraph) in self.page_paragraphs(text).into_iter().enumerate() {
            if i > 0 {
                segments.push(Segment::pause(page, PauseWeight::Paragraph));
            }
            segments.extend(paragraph.into_iter().map(|s| Segment::sentence(page, s)));
        }

        segments
    }

    /// Segments for a whole document, given `(page_index, text)` pairs in page order.
    ///
    /// A page marker precedes the content of every page after the first page
    /// that produced text. Pages without text produce nothing.
    pub fn normalize<'a, I>(&self, pages: I) -> Vec<Segment>
    where
        I: IntoIterator<Item = (usize, &'a str)>,
    {
        let mut segments = Vec::new();

        for (page, text) in pages {
            let page_segments = self.normalize_page(page, text);
            if page_segments.is_empty() {
                log::debug!("Page {} produced no sentences", page + 1);
                continue;
            }
            if !segments.is_empty() {
                segments.push(Segment::pause(page, PauseWeight::Page));
            }
            segments.extend(page_segments);
        }

        segments
    }
}

/// `\b(Dr|Mr|...)\.(\s+\p{Lu})`, longest keys first.
fn abbreviation_regex<'a>(keys: impl Iterator<Item = &'a String>) -> Option<Regex> {
    let mut keys: Vec<&String> = keys.collect();
    if keys.is_empty() {
        return None;
    }
    keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

    let alternation = keys
        .iter()
        .map(|k| regex::escape(k))
        .collect::<Vec<_>>()
        .join("|");

    match Regex::new(&format!(r"\b({})\.(\s+\p{{Lu}})", alternation)) {
        Ok(re) => Some(re),
        Err(e) => {
            log::warn!("Invalid abbreviation table, expansion disabled: {}", e);
            None
        }
    }
}

/// Make sure a paragraph-final sentence ends with terminal punctuation,
/// replacing a dangling `,;:-` if there is one.
fn terminate(sentence: &mut String) {
    if is_terminated(sentence) {
        return;
    }
    let kept = sentence.trim_end_matches([',', ';', ':', '-', ' ']).len();
    sentence.truncate(kept);
    if !is_terminated(sentence) {
        sentence.push('.');
    }
}

fn is_terminated(sentence: &str) -> bool {
    sentence
        .trim_end_matches(['"', '\'', ')', ']'])
        .ends_with(TERMINATORS)
}
