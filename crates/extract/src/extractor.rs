use crate::error::{ExtractError, Result};
use crate::fingerprint::fingerprint_file;
use crate::kind::{classify, FileKind};
use std::path::Path;

/// Result of running the extraction pipeline over one file.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub kind: FileKind,
    /// Normalized text; empty for binary files.
    pub text: String,
    /// Hex SHA-256 of the raw bytes.
    pub fingerprint: String,
    pub size_bytes: u64,
    /// Long enough to vectorize. Short or empty files are still
    /// fingerprinted so exact-duplicate detection keeps working.
    pub comparable: bool,
}

/// Fingerprint a file and extract its normalized text.
///
/// The fingerprint is computed first and from raw bytes only; a parser
/// failure after that point surfaces as `CorruptDocument` / `UnsupportedFormat`
/// while the caller may already have consumed the digest. Binary files
/// succeed with empty text and `comparable = false`.
pub fn extract(path: &Path, min_content_length: usize) -> Result<Extraction> {
    let kind = classify(path);
    let (fingerprint, size_bytes) = fingerprint_file(path)?;

    let text = match kind {
        FileKind::Binary => String::new(),
        _ => extract_text(path, kind)?,
    };

    let comparable = text.trim().chars().count() >= min_content_length;
    Ok(Extraction {
        kind,
        text,
        fingerprint,
        size_bytes,
        comparable,
    })
}

/// Extract normalized text for a known file kind.
///
/// Container formats concatenate their textual parts in document order:
/// cells in sheet/row order, slides in slide order, pages in page order.
pub fn extract_text(path: &Path, kind: FileKind) -> Result<String> {
    match kind {
        FileKind::PlainText => read_plain_text(path),
        FileKind::WordDocument => extract_docx(path),
        FileKind::Spreadsheet => extract_spreadsheet(path),
        FileKind::Presentation => extract_pptx(path),
        FileKind::PageDescribed => extract_pdf(path),
        FileKind::Binary => Ok(String::new()),
        FileKind::Unsupported => Err(ExtractError::UnsupportedFormat(
            path.display().to_string(),
        )),
    }
}

fn read_plain_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn extract_docx(path: &Path) -> Result<String> {
    docx_lite::extract_text(path).map_err(|e| ExtractError::corrupt(path.display().to_string(), e))
}

fn extract_spreadsheet(path: &Path) -> Result<String> {
    use calamine::{open_workbook_auto, Data, Reader};

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| ExtractError::corrupt(path.display().to_string(), e))?;

    let mut all_text = String::new();
    for sheet_name in workbook.sheet_names().to_vec() {
        let Ok(range) = workbook.worksheet_range(&sheet_name) else {
            continue;
        };
        for row in range.rows() {
            for cell in row {
                let cell_text = match cell {
                    Data::Empty => continue,
                    Data::String(s) => s.clone(),
                    Data::Float(f) => f.to_string(),
                    Data::Int(i) => i.to_string(),
                    Data::Bool(b) => b.to_string(),
                    Data::Error(e) => format!("{e:?}"),
                    Data::DateTime(dt) => dt.to_string(),
                    Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
                };
                if !cell_text.is_empty() {
                    all_text.push_str(&cell_text);
                    all_text.push('\n');
                }
            }
        }
    }
    Ok(all_text)
}

fn extract_pptx(path: &Path) -> Result<String> {
    use pptx_to_md::{ParserConfig, PptxContainer};

    let config = ParserConfig::builder()
        .extract_images(false)
        .include_slide_comment(false)
        .build();

    let mut container = PptxContainer::open(path, config)
        .map_err(|e| ExtractError::corrupt(path.display().to_string(), e))?;
    let slides = container
        .parse_all()
        .map_err(|e| ExtractError::corrupt(path.display().to_string(), e))?;

    let mut all_text = String::new();
    for slide in slides {
        if let Some(md) = slide.convert_to_md() {
            all_text.push_str(&md);
            all_text.push('\n');
        }
    }
    Ok(all_text)
}

fn extract_pdf(path: &Path) -> Result<String> {
    let text = pdf_extract::extract_text(path)
        .map_err(|e| ExtractError::corrupt(path.display().to_string(), e))?;
    log::debug!("pdf extracted: {} chars from {}", text.len(), path.display());
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_text_is_read_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, "hello extraction pipeline").unwrap();

        let out = extract(&path, 5).unwrap();
        assert_eq!(out.kind, FileKind::PlainText);
        assert_eq!(out.text, "hello extraction pipeline");
        assert_eq!(out.size_bytes, 25);
        assert!(out.comparable);
    }

    #[test]
    fn short_text_is_fingerprinted_but_not_comparable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiny.txt");
        std::fs::write(&path, "hi").unwrap();

        let out = extract(&path, 50).unwrap();
        assert!(!out.comparable);
        assert_eq!(out.fingerprint.len(), 64);
    }

    #[test]
    fn binary_file_yields_empty_text_with_fingerprint() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blob.bin");
        std::fs::write(&path, [0u8, 255, 1, 2, 0, 9]).unwrap();

        let out = extract(&path, 10).unwrap();
        assert_eq!(out.kind, FileKind::Binary);
        assert_eq!(out.text, "");
        assert!(!out.comparable);
        assert_eq!(out.fingerprint.len(), 64);
    }

    #[test]
    fn unsupported_format_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.doc");
        std::fs::write(&path, b"\xd0\xcf\x11\xe0old word").unwrap();

        let err = extract(&path, 10).unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn corrupt_container_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.xlsx");
        std::fs::write(&path, b"this is not a zip archive").unwrap();

        let err = extract(&path, 10).unwrap_err();
        assert!(matches!(err, ExtractError::CorruptDocument { .. }));
    }
}
