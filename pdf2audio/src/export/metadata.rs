//! FFMETADATA1 generation for container chapters and tags.

use crate::audio::AssembledAudio;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

/// Render the FFMETADATA1 document for an assembled book.
///
/// Chapter bounds use `TIMEBASE=1/<sample_rate>` so they land on the exact
/// sample offsets the assembler computed.
pub fn render_ffmetadata(audio: &AssembledAudio) -> String {
    let meta = &audio.metadata;
    let mut out = String::new();

    let _ = writeln!(out, ";FFMETADATA1");
    let _ = writeln!(out, "title={}", escape_metadata_value(&meta.title));
    let _ = writeln!(out, "artist={}", escape_metadata_value(&meta.author));
    let _ = writeln!(out, "album={}", escape_metadata_value(&meta.title));
    let _ = writeln!(out, "genre={}", escape_metadata_value(&meta.genre));
    let _ = writeln!(out, "comment={}", escape_metadata_value(&meta.source_file));
    let _ = writeln!(out);

    for chapter in &audio.chapters {
        let _ = writeln!(out, "[CHAPTER]");
        let _ = writeln!(out, "TIMEBASE=1/{}", audio.sample_rate);
        let _ = writeln!(out, "START={}", chapter.start_sample);
        let _ = writeln!(out, "END={}", chapter.end_sample);
        let _ = writeln!(out, "title={}", escape_metadata_value(&chapter.title));
        let _ = writeln!(out);
    }

    out
}

pub fn write_ffmetadata(audio: &AssembledAudio, path: &Path) -> io::Result<()> {
    fs::write(path, render_ffmetadata(audio))
}

/// Escape `= ; # \` and newlines for FFMETADATA values.
fn escape_metadata_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\\n"),
            '\r' => {}
            _ => escaped.push(c),
        }
    }

    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BookMetadata, ChapterMarker};
    use tempfile::TempDir;

    fn marker(index: usize, start: u64, end: u64, title: &str) -> ChapterMarker {
        ChapterMarker {
            index,
            title: title.into(),
            first_page: index,
            last_page: index,
            start_sample: start,
            end_sample: end,
            start_ms: start * 1000 / 22050,
            end_ms: end * 1000 / 22050,
        }
    }

    fn book() -> AssembledAudio {
        AssembledAudio {
            samples: vec![0; 44100],
            sample_rate: 22050,
            chapters: vec![marker(0, 0, 30000, "Page 1"), marker(1, 30000, 44100, "Page 2")],
            metadata: BookMetadata {
                title: "War; and = Peace".into(),
                author: "Leo Tolstoy".into(),
                source_file: "war_and_peace.pdf".into(),
                genre: "Audiobook".into(),
            },
        }
    }

    #[test]
    fn test_escape_metadata_value() {
        assert_eq!(escape_metadata_value("Simple"), "Simple");
        assert_eq!(escape_metadata_value("A=B;C#D\\E"), "A\\=B\\;C\\#D\\\\E");
        assert_eq!(escape_metadata_value("Line1\r\nLine2"), "Line1\\\nLine2");
    }

    #[test]
    fn test_render_header_and_tags() {
        let text = render_ffmetadata(&book());
        assert!(text.starts_with(";FFMETADATA1\n"));
        assert!(text.contains("title=War\\; and \\= Peace\n"));
        assert!(text.contains("artist=Leo Tolstoy\n"));
        assert!(text.contains("album=War\\; and \\= Peace\n"));
        assert!(text.contains("genre=Audiobook\n"));
        assert!(text.contains("comment=war_and_peace.pdf\n"));
    }

    #[test]
    fn test_render_chapters_in_sample_timebase() {
        let text = render_ffmetadata(&book());
        assert_eq!(text.matches("[CHAPTER]").count(), 2);
        assert_eq!(text.matches("TIMEBASE=1/22050").count(), 2);
        assert!(text.contains("START=0\nEND=30000\ntitle=Page 1\n"));
        assert!(text.contains("START=30000\nEND=44100\ntitle=Page 2\n"));
    }

    #[test]
    fn test_write_ffmetadata() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("metadata.txt");
        write_ffmetadata(&book(), &path).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[CHAPTER]"));
    }
}
