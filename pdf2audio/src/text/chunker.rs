//! Packs normalized segments into synthesis chunks.

use super::{PauseWeight, Segment};
use crate::config::ChunkingConfig;

/// A bounded unit of text submitted to the speech engine in one call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisChunk {
    /// Contiguous from zero
    pub index: usize,
    /// Sentences, with any paragraph markers that fell inside the chunk
    pub segments: Vec<Segment>,
    pub first_page: usize,
    pub last_page: usize,
    /// Boundary pause before this chunk; always `None` for the first chunk
    pub leading_pause: PauseWeight,
}

impl SynthesisChunk {
    pub fn sentences(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(Segment::text)
    }

    /// Text sent to the speech engine.
    pub fn text(&self) -> String {
        self.sentences().collect::<Vec<_>>().join(" ")
    }

    /// Length of `text()` in characters.
    pub fn char_len(&self) -> usize {
        let (count, chars) = self
            .sentences()
            .fold((0usize, 0usize), |(n, len), s| (n + 1, len + s.chars().count()));
        chars + count.saturating_sub(1)
    }
}

/// Accumulates segments into the current chunk.
struct ChunkBuilder {
    max_chars: usize,
    chunks: Vec<SynthesisChunk>,
    current: Vec<Segment>,
    current_len: usize,
    pages: Option<(usize, usize)>,
    leading: PauseWeight,
    /// Boundary seen since the last sentence: its weight and page
    pending: Option<(PauseWeight, usize)>,
}

impl ChunkBuilder {
    fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
            chunks: Vec::new(),
            current: Vec::new(),
            current_len: 0,
            pages: None,
            leading: PauseWeight::None,
            pending: None,
        }
    }

    fn mark(&mut self, weight: PauseWeight, page: usize) {
        self.pending = match self.pending {
            Some((existing, p)) if existing >= weight => Some((existing, p)),
            _ => Some((weight, page)),
        };
    }

    fn push_sentence(&mut self, page: usize, text: &str) {
        let len = text.chars().count();

        if !self.current.is_empty() && self.current_len + 1 + len > self.max_chars {
            self.close();
        }

        if self.current.is_empty() {
            if !self.chunks.is_empty() {
                self.leading = self.pending.map_or(PauseWeight::None, |(w, _)| w);
            }
        } else {
            if let Some((weight, marker_page)) = self.pending {
                self.current.push(Segment::pause(marker_page, weight));
            }
            self.current_len += 1;
        }
        self.pending = None;

        self.current.push(Segment::sentence(page, text));
        self.current_len += len;
        self.pages = Some(match self.pages {
            Some((first, last)) => (first.min(page), last.max(page)),
            None => (page, page),
        });

        // An oversize sentence stands alone
        if len > self.max_chars {
            self.close();
        }
    }

    fn close(&mut self) {
        let Some((first_page, last_page)) = self.pages.take() else {
            return;
        };

        self.chunks.push(SynthesisChunk {
            index: self.chunks.len(),
            segments: std::mem::take(&mut self.current),
            first_page,
            last_page,
            leading_pause: std::mem::take(&mut self.leading),
        });
        self.current_len = 0;
    }

    fn finish(mut self) -> Vec<SynthesisChunk> {
        self.close();
        self.chunks
    }
}

/// Split segments into chunks of at most `max_chunk_chars` characters.
///
/// Sentences are never split. A page marker closes the current chunk when
/// `chapter_per_page` is set; otherwise it is treated as a paragraph break.
/// A paragraph marker closes the chunk only if the budget is already spent,
/// and otherwise becomes the next chunk's leading pause or stays inside the
/// current chunk.
pub fn segment(segments: &[Segment], config: &ChunkingConfig) -> Vec<SynthesisChunk> {
    let mut builder = ChunkBuilder::new(config.max_chunk_chars);

    for seg in segments {
        match seg {
            Segment::Sentence { page, text } => builder.push_sentence(*page, text),
            Segment::Pause {
                page,
                weight: PauseWeight::Page,
            } if config.chapter_per_page => {
                builder.close();
                builder.mark(PauseWeight::Page, *page);
            }
            Segment::Pause { page, weight } => {
                if builder.current_len >= builder.max_chars {
                    builder.close();
                }
                let weight = if *weight == PauseWeight::Page {
                    PauseWeight::Paragraph
                } else {
                    *weight
                };
                if weight != PauseWeight::None {
                    builder.mark(weight, *page);
                }
            }
        }
    }

    let chunks = builder.finish();
    log::debug!(
        "Segmented {} segments into {} chunks",
        segments.len(),
        chunks.len()
    );
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::text::SentenceSplitter;
    use proptest::prelude::*;

    fn config(max_chunk_chars: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_chunk_chars,
            chapter_per_page: true,
        }
    }

    fn s(page: usize, text: &str) -> Segment {
        Segment::sentence(page, text)
    }

    #[test]
    fn test_two_page_scenario() {
        let segments = vec![
            s(0, "Dr. Smith went home."),
            s(0, "He was tired."),
            Segment::pause(1, PauseWeight::Page),
            s(1, "The End."),
        ];
        let chunks = segment(&segments, &config(10_000));

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text(), "Dr. Smith went home. He was tired.");
        assert_eq!((chunks[0].first_page, chunks[0].last_page), (0, 0));
        assert_eq!(chunks[0].leading_pause, PauseWeight::None);
        assert_eq!(chunks[1].text(), "The End.");
        assert_eq!((chunks[1].first_page, chunks[1].last_page), (1, 1));
        assert_eq!(chunks[1].leading_pause, PauseWeight::Page);
    }

    #[test]
    fn test_budget_closes_chunk() {
        let segments = vec![s(0, "Aaaa bbbb."), s(0, "Cccc dddd."), s(0, "Eeee ffff.")];
        // Two sentences plus a space is 21 chars
        let chunks = segment(&segments, &config(21));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].text(), "Aaaa bbbb. Cccc dddd.");
        assert_eq!(chunks[0].char_len(), 21);
        assert_eq!(chunks[1].text(), "Eeee ffff.");
        assert_eq!(chunks[1].leading_pause, PauseWeight::None);
    }

    #[test]
    fn test_oversize_sentence_stands_alone() {
        let long = "This sentence is far longer than the configured budget allows.";
        let segments = vec![s(0, "Short one."), s(0, long), s(0, "Short two.")];
        let chunks = segment(&segments, &config(20));

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[1].text(), long);
        assert_eq!(chunks.iter().map(|c| c.index).collect::<Vec<_>>(), vec![0, 1, 2]);
    }

    #[test]
    fn test_paragraph_marker_kept_inside_chunk() {
        let segments = vec![
            s(0, "One."),
            Segment::pause(0, PauseWeight::Paragraph),
            s(0, "Two."),
        ];
        let chunks = segment(&segments, &config(100));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].segments[1], Segment::pause(0, PauseWeight::Paragraph));
        assert_eq!(chunks[0].text(), "One. Two.");
    }

    #[test]
    fn test_paragraph_marker_becomes_leading_pause() {
        let segments = vec![
            s(0, "First sentence."),
            Segment::pause(0, PauseWeight::Paragraph),
            s(0, "Second sentence."),
        ];
        let chunks = segment(&segments, &config(20));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].leading_pause, PauseWeight::Paragraph);
        assert!(chunks.iter().all(|c| c.segments.iter().all(|s| s.text().is_some())));
    }

    #[test]
    fn test_pages_merge_without_chapter_split() {
        let segments = vec![
            s(0, "One."),
            Segment::pause(1, PauseWeight::Page),
            s(1, "Two."),
        ];
        let chunks = segment(
            &segments,
            &ChunkingConfig {
                max_chunk_chars: 100,
                chapter_per_page: false,
            },
        );
        assert_eq!(chunks.len(), 1);
        assert_eq!((chunks[0].first_page, chunks[0].last_page), (0, 1));
        assert_eq!(chunks[0].segments[1], Segment::pause(1, PauseWeight::Paragraph));
    }

    #[test]
    fn test_empty_input() {
        assert!(segment(&[], &config(100)).is_empty());
        let only_markers = vec![Segment::pause(1, PauseWeight::Page)];
        assert!(segment(&only_markers, &config(100)).is_empty());
    }

    fn sentence_strategy() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{3,8}( [a-z]{3,8}){1,6}[.!?]"
    }

    fn segments_strategy() -> impl Strategy<Value = Vec<Segment>> {
        prop::collection::vec(
            prop::collection::vec(prop::collection::vec(sentence_strategy(), 1..4), 1..4),
            1..5,
        )
        .prop_map(|pages| {
            let mut segments = Vec::new();
            for (page, paragraphs) in pages.into_iter().enumerate() {
                if page > 0 {
                    segments.push(Segment::pause(page, PauseWeight::Page));
                }
                for (i, sentences) in paragraphs.into_iter().enumerate() {
                    if i > 0 {
                        segments.push(Segment::pause(page, PauseWeight::Paragraph));
                    }
                    segments.extend(sentences.into_iter().map(|t| Segment::sentence(page, t)));
                }
            }
            segments
        })
    }

    proptest! {
        #[test]
        fn prop_chunks_round_trip_sentences(
            segments in segments_strategy(),
            max in 10usize..200,
        ) {
            let chunks = segment(&segments, &config(max));
            let expected: Vec<&str> = segments.iter().filter_map(Segment::text).collect();

            let joined = chunks.iter().map(SynthesisChunk::text).collect::<Vec<_>>().join(" ");
            let resplit = SentenceSplitter::new(Vec::<String>::new()).split(&joined);
            prop_assert_eq!(resplit, expected);
        }

        #[test]
        fn prop_chunks_respect_budget_and_pages(
            segments in segments_strategy(),
            max in 10usize..200,
        ) {
            let chunks = segment(&segments, &config(max));

            for (i, chunk) in chunks.iter().enumerate() {
                prop_assert_eq!(chunk.index, i);
                prop_assert!(chunk.char_len() <= max || chunk.sentences().count() == 1);
                prop_assert_eq!(chunk.char_len(), chunk.text().chars().count());
                // Every page boundary starts a new chunk
                prop_assert_eq!(chunk.first_page, chunk.last_page);
            }
            for pair in chunks.windows(2) {
                prop_assert!(pair[0].last_page <= pair[1].first_page);
                if pair[0].last_page != pair[1].first_page {
                    prop_assert_eq!(pair[1].leading_pause, PauseWeight::Page);
                }
            }
        }
    }
}
