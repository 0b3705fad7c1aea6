//! Fast backend: in-process text extraction with lopdf.

use super::{DocumentInfo, PageText, TextBackend};
use crate::error::ExtractError;
use lopdf::{Dictionary, Document, Object};
use std::path::Path;

/// Pure-Rust backend reading content streams directly.
pub struct LopdfBackend;

impl LopdfBackend {
    fn load(path: &Path) -> Result<Document, ExtractError> {
        Document::load(path).map_err(|e| ExtractError::Open {
            backend: "lopdf".to_string(),
            message: e.to_string(),
        })
    }
}

impl TextBackend for LopdfBackend {
    fn name(&self) -> &'static str {
        "lopdf"
    }

    fn page_texts(&self, path: &Path) -> Result<Vec<PageText>, ExtractError> {
        let doc = Self::load(path)?;

        // get_pages is keyed by 1-based page number in document order
        let texts = doc
            .get_pages()
            .keys()
            .map(|&number| doc.extract_text(&[number]).map_err(|e| e.to_string()))
            .collect();

        Ok(texts)
    }

    fn document_info(&self, path: &Path) -> DocumentInfo {
        let Ok(doc) = Self::load(path) else {
            return DocumentInfo::default();
        };
        let Some(info) = info_dictionary(&doc) else {
            return DocumentInfo::default();
        };

        DocumentInfo {
            title: info_string(info, b"Title"),
            author: info_string(info, b"Author"),
        }
    }
}

/// Resolve the trailer's /Info dictionary.
fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn info_string(info: &Dictionary, key: &[u8]) -> Option<String> {
    match info.get(key).ok()? {
        Object::String(bytes, _) => decode_pdf_string(bytes),
        _ => None,
    }
}

/// Decode a PDF text string (UTF-16BE with BOM, otherwise PDFDocEncoding).
fn decode_pdf_string(bytes: &[u8]) -> Option<String> {
    let text = if let Some(utf16) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = utf16
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        // PDFDocEncoding matches Latin-1 for printable text
        bytes.iter().map(|&b| b as char).collect()
    };

    let text = text.trim().to_string();
    if text.is_empty() { None } else { Some(text) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_latin1() {
        assert_eq!(decode_pdf_string(b"Moby Dick"), Some("Moby Dick".to_string()));
        assert_eq!(decode_pdf_string(b"Caf\xe9"), Some("Café".to_string()));
    }

    #[test]
    fn test_decode_utf16() {
        let bytes = [0xFE, 0xFF, 0x00, 0x48, 0x00, 0x69];
        assert_eq!(decode_pdf_string(&bytes), Some("Hi".to_string()));
    }

    #[test]
    fn test_decode_blank() {
        assert_eq!(decode_pdf_string(b"   "), None);
    }

    #[test]
    fn test_info_string_from_dictionary() {
        let mut info = Dictionary::new();
        info.set("Title", Object::string_literal("The Book"));
        info.set("Pages", Object::Integer(3));
        assert_eq!(info_string(&info, b"Title"), Some("The Book".to_string()));
        assert_eq!(info_string(&info, b"Pages"), None);
        assert_eq!(info_string(&info, b"Author"), None);
    }

    #[test]
    fn test_open_failure_is_error() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), b"not a pdf").unwrap();
        let err = LopdfBackend.page_texts(file.path()).unwrap_err();
        assert!(matches!(err, ExtractError::Open { .. }));
        assert_eq!(LopdfBackend.document_info(file.path()), DocumentInfo::default());
    }
}
