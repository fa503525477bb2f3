//! Document loading and text extraction.
//!
//! Turns a file on disk into plain UTF-8 text ready for chunking. Supported
//! formats: `.txt`, `.md` (read as-is), `.pdf` (pdf-extract), `.docx`
//! (ZIP + `w:t` element walk). Extraction never panics: a missing file is
//! `DocumentNotFound`, anything unreadable is `DocumentFormat`, and batch
//! indexing skips the document either way.

use std::io::Read;
use std::path::Path;

use crate::error::{RagError, Result};

/// File extensions the indexer will pick up during a directory walk.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["txt", "md", "pdf", "docx"];

/// Maximum decompressed bytes to read from a single ZIP entry
/// (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Whether the indexer should attempt this path at all.
pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Load a document and extract its plain text.
pub fn load_document(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(RagError::DocumentNotFound(path.to_path_buf()));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "txt" | "md" => std::fs::read_to_string(path).map_err(|e| RagError::DocumentFormat {
            path: path.to_path_buf(),
            reason: format!("not valid UTF-8 text: {}", e),
        }),
        "pdf" => extract_pdf(path),
        "docx" => {
            let bytes = std::fs::read(path).map_err(|e| RagError::DocumentFormat {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
            extract_docx(path, &bytes)
        }
        other => Err(RagError::DocumentFormat {
            path: path.to_path_buf(),
            reason: format!("unsupported file type: .{}", other),
        }),
    }
}

/// Normalize extracted text before chunking: collapse runs of whitespace
/// into single spaces and trim.
pub fn clean_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_space = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

fn extract_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| RagError::DocumentFormat {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    pdf_extract::extract_text_from_mem(&bytes).map_err(|e| RagError::DocumentFormat {
        path: path.to_path_buf(),
        reason: format!("PDF extraction failed: {}", e),
    })
}

fn extract_docx(path: &Path, bytes: &[u8]) -> Result<String> {
    let ooxml_err = |reason: String| RagError::DocumentFormat {
        path: path.to_path_buf(),
        reason,
    };

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ooxml_err(e.to_string()))?;

    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive.by_index(i).map_err(|e| ooxml_err(e.to_string()))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| ooxml_err(e.to_string()))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(ooxml_err("word/document.xml exceeds size limit".to_string()));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(ooxml_err("word/document.xml not found".to_string()));
    }

    extract_w_t_elements(&doc_xml).map_err(ooxml_err)
}

/// Collect the text of every `w:t` element, separating paragraphs with
/// newlines so downstream cleaning sees word boundaries.
fn extract_w_t_elements(xml: &[u8]) -> std::result::Result<String, String> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                } else if name.as_ref() == b"p" && !out.is_empty() {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(e.to_string()),
            _ => {}
        }
        buf.clear();
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_file_is_not_found() {
        let err = load_document(Path::new("/nonexistent/doc.txt")).unwrap_err();
        assert!(matches!(err, RagError::DocumentNotFound(_)));
    }

    #[test]
    fn unsupported_extension_is_format_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("image.png");
        std::fs::write(&path, b"\x89PNG").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(matches!(err, RagError::DocumentFormat { .. }));
    }

    #[test]
    fn plain_text_loads() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        std::fs::write(&path, "# Notes\n\nsome words").unwrap();
        let text = load_document(&path).unwrap();
        assert!(text.contains("some words"));
    }

    #[test]
    fn invalid_docx_is_format_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("broken.docx");
        std::fs::write(&path, b"not a zip archive").unwrap();
        let err = load_document(&path).unwrap_err();
        assert!(matches!(err, RagError::DocumentFormat { .. }));
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  a\n\nb\t c  "), "a b c");
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("   \n "), "");
    }

    #[test]
    fn supported_extension_check() {
        assert!(is_supported(&PathBuf::from("a/b/doc.PDF")));
        assert!(is_supported(&PathBuf::from("doc.md")));
        assert!(!is_supported(&PathBuf::from("doc.py")));
        assert!(!is_supported(&PathBuf::from("Makefile")));
    }
}
