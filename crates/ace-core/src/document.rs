//! Document text extraction.
//!
//! Uploaded files arrive as bytes. A [`TextExtractor`] turns them into
//! normalized text; PDF and other binary formats plug in behind the same
//! trait.

use thiserror::Error;

const BOM: char = '\u{feff}';

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DocumentError {
    #[error("{file_name} contains no text")]
    Empty { file_name: String },

    #[error("{file_name} is not valid UTF-8 (at byte {valid_up_to})")]
    InvalidUtf8 { file_name: String, valid_up_to: usize },
}

/// Converts an uploaded file into plain text.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, DocumentError>;
}

/// Accepts UTF-8 text files.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, file_name: &str, bytes: &[u8]) -> Result<String, DocumentError> {
        let text = std::str::from_utf8(bytes).map_err(|e| DocumentError::InvalidUtf8 {
            file_name: file_name.to_string(),
            valid_up_to: e.valid_up_to(),
        })?;

        let text = normalize(text.strip_prefix(BOM).unwrap_or(text));
        if text.trim().is_empty() {
            return Err(DocumentError::Empty {
                file_name: file_name.to_string(),
            });
        }
        Ok(text)
    }
}

/// Unify line endings to `\n` and drop trailing whitespace.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize("a\r\nb\rc\n\n  \t"), "a\nb\nc");
        assert_eq!(normalize("  leading kept"), "  leading kept");
    }

    #[test]
    fn test_plain_text_strips_bom() {
        let bytes = "\u{feff}Week 1: Sets\r\n".as_bytes();
        let text = PlainTextExtractor.extract("syllabus.txt", bytes).unwrap();
        assert_eq!(text, "Week 1: Sets");
    }

    #[test]
    fn test_plain_text_rejects_empty() {
        let err = PlainTextExtractor.extract("blank.txt", b" \r\n\t").unwrap_err();
        assert_eq!(
            err,
            DocumentError::Empty {
                file_name: "blank.txt".to_string()
            }
        );
    }

    #[test]
    fn test_plain_text_rejects_binary() {
        let err = PlainTextExtractor
            .extract("scan.pdf", &[b'%', b'P', 0xff, 0xfe])
            .unwrap_err();
        assert_eq!(
            err,
            DocumentError::InvalidUtf8 {
                file_name: "scan.pdf".to_string(),
                valid_up_to: 2
            }
        );
    }
}
