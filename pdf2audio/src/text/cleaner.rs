//! Page-level cleanup steps. Each step is a standalone function over raw page text.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters the speech engine mispronounces, and their replacements.
const PROSODY_CHARS: &[(char, &str)] = &[
    ('\u{2018}', "'"),     // Left single quote
    ('\u{2019}', "'"),     // Right single quote
    ('\u{201a}', "'"),     // Low single quote
    ('\u{201c}', "\""),    // Left double quote
    ('\u{201d}', "\""),    // Right double quote
    ('\u{201e}', "\""),    // Low double quote
    ('\u{00ab}', "\""),    // Left guillemet
    ('\u{00bb}', "\""),    // Right guillemet
    ('\u{2032}', "'"),     // Prime
    ('\u{2033}', "\""),    // Double prime
    ('\u{2013}', "-"),     // En dash
    ('\u{2011}', "-"),     // Non-breaking hyphen
    ('\u{2012}', "-"),     // Figure dash
    ('\u{2014}', " - "),   // Em dash
    ('\u{2015}', " - "),   // Horizontal bar
    ('\u{2026}', "..."),   // Ellipsis
    ('\u{00a0}', " "),     // Non-breaking space
    ('\u{00ad}', ""),      // Soft hyphen
    ('\u{200b}', ""),      // Zero-width space
    ('\u{200c}', ""),      // Zero-width non-joiner
    ('\u{200d}', ""),      // Zero-width joiner
    ('\u{feff}', ""),      // BOM
    ('\u{fb01}', "fi"),    // Ligatures left behind by PDF fonts
    ('\u{fb02}', "fl"),
    ('\u{fb00}', "ff"),
];

/// Spaced-out ellipsis (`. . .`) or a run of two or more periods on one line.
static PERIOD_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.(?:[ \t]*\.)+").unwrap());

/// A word, a hyphen, and a line break, followed by the rest of the word.
static BROKEN_HYPHEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\w+)-[ \t]*\r?\n[ \t]*(\w+)").unwrap());

/// Map quotes, dashes, and ellipses onto a small fixed set and drop control characters.
pub fn normalize_punctuation(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for c in text.chars() {
        if let Some((_, replacement)) = PROSODY_CHARS.iter().find(|(ch, _)| *ch == c) {
            result.push_str(replacement);
        } else if c == '\n' || c == '\t' || !c.is_control() {
            result.push(c);
        }
    }

    result
}

/// A run of three or more periods becomes `...`; a doubled period becomes `.`.
///
/// Runs never span a line break, so a paragraph ending in a period stays
/// separate from a next paragraph that opens with an ellipsis.
pub fn collapse_period_runs(text: &str) -> String {
    PERIOD_RUN
        .replace_all(text, |caps: &regex::Captures| {
            let periods = caps[0].chars().filter(|&c| c == '.').count();
            if periods >= 3 { "..." } else { "." }
        })
        .into_owned()
}

/// Rejoin words hyphenated across a line break.
///
/// When the fragment before the hyphen is itself a word on `short_words`
/// (e.g. "well-" in "well-known") the hyphen is kept and only the break is removed.
pub fn repair_hyphenation(text: &str, short_words: &[String]) -> String {
    BROKEN_HYPHEN
        .replace_all(text, |caps: &regex::Captures| {
            let prefix = &caps[1];
            let lower = prefix.to_lowercase();
            if short_words.iter().any(|w| *w == lower) {
                format!("{}-{}", prefix, &caps[2])
            } else {
                format!("{}{}", prefix, &caps[2])
            }
        })
        .into_owned()
}

/// Split page text into paragraphs.
///
/// A paragraph ends at a blank line, or where a line is indented further than
/// the page's usual left margin after a line that was not.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let indent = |line: &str| line.len() - line.trim_start().len();
    let margin = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(indent)
        .min()
        .unwrap_or(0);

    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut previous_indented = false;

    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
            previous_indented = false;
            continue;
        }

        let indented = indent(line) >= margin + 2;
        if indented && !previous_indented {
            flush_paragraph(&mut current, &mut paragraphs);
        }
        previous_indented = indented;
        current.push(line);
    }
    flush_paragraph(&mut current, &mut paragraphs);

    paragraphs
}

fn flush_paragraph(lines: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let paragraph = collapse_whitespace(&lines.join("\n"));
    if !paragraph.is_empty() {
        paragraphs.push(paragraph);
    }
    lines.clear();
}

/// Collapse every run of whitespace (line breaks included) to a single space.
pub fn collapse_whitespace(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut prev_was_space = false;

    for c in text.trim().chars() {
        if c.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
                prev_was_space = true;
            }
        } else {
            prev_was_space = false;
            result.push(c);
        }
    }

    result
}
