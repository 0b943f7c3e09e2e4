//! File processing for document ingestion.
//!
//! This module handles:
//! - Multi-format text extraction (PDF, DOCX, CSV/TSV, JSON, TXT, MD)
//! - Splitting files into (text, source-metadata) records: one per PDF page,
//!   one per delimited data row, one per file otherwise
//! - File type detection and directory expansion

use crate::error::ChatError;
use crate::protocol::{DocumentFormat, LoadedDocument, SourceMetadata};
use std::path::{Path, PathBuf};

/// Map a file extension to the format it is loaded as
pub fn detect_document_format(path: &Path) -> Option<DocumentFormat> {
    let ext = path.extension().and_then(|e| e.to_str())?.to_lowercase();
    match ext.as_str() {
        "txt" => Some(DocumentFormat::PlainText),
        "md" | "markdown" => Some(DocumentFormat::Markdown),
        "json" => Some(DocumentFormat::Json),
        "csv" | "tsv" => Some(DocumentFormat::Delimited),
        "pdf" => Some(DocumentFormat::Pdf),
        "docx" => Some(DocumentFormat::Docx),
        _ => None,
    }
}

/// Check if a file is a supported document type
pub fn is_supported_file_type(path: &Path) -> bool {
    detect_document_format(path).is_some()
}

/// Records loaded from a set of paths, plus directory entries that were left out
#[derive(Debug, Default)]
pub struct LoadedPaths {
    pub documents: Vec<LoadedDocument>,
    /// Unsupported files found while expanding directories
    pub skipped: Vec<PathBuf>,
}

/// Load every path. Files with unsupported extensions are rejected; directories
/// are expanded recursively to the supported files they contain, and the
/// unsupported ones are reported back in `skipped`.
pub fn load_paths(paths: &[PathBuf]) -> Result<LoadedPaths, ChatError> {
    let mut loaded = LoadedPaths::default();
    for path in paths {
        if path.is_dir() {
            let listing = collect_supported_files(path)?;
            for file in &listing.files {
                loaded.documents.extend(load_document(file)?);
            }
            loaded.skipped.extend(listing.skipped);
        } else {
            loaded.documents.extend(load_document(path)?);
        }
    }
    tracing::info!(
        paths = paths.len(),
        records = loaded.documents.len(),
        skipped = loaded.skipped.len(),
        "Loaded documents"
    );
    Ok(loaded)
}

/// Files under a directory, split by whether they can be loaded
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DirectoryListing {
    pub files: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Walk a directory, returning supported and unsupported files in sorted order
pub fn collect_supported_files(dir: &Path) -> Result<DirectoryListing, ChatError> {
    let mut listing = DirectoryListing::default();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let entries = std::fs::read_dir(&current)
            .map_err(|e| ChatError::document(&current, format!("Failed to list directory: {}", e)))?;
        for entry in entries {
            let path = entry
                .map_err(|e| ChatError::document(&current, e.to_string()))?
                .path();
            if path.is_dir() {
                pending.push(path);
            } else if is_supported_file_type(&path) {
                listing.files.push(path);
            } else {
                tracing::warn!(path = %path.display(), "Skipping unsupported file in directory");
                listing.skipped.push(path);
            }
        }
    }
    listing.files.sort();
    listing.skipped.sort();
    Ok(listing)
}

/// Load one file into one or more records based on its type
pub fn load_document(path: &Path) -> Result<Vec<LoadedDocument>, ChatError> {
    let format = detect_document_format(path).ok_or_else(|| ChatError::UnsupportedFormat {
        path: path.to_path_buf(),
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase(),
    })?;

    let record = |text: String, page: Option<usize>, row: Option<usize>| LoadedDocument {
        text,
        metadata: SourceMetadata {
            path: path.to_path_buf(),
            format,
            page,
            row,
        },
    };

    let documents = match format {
        DocumentFormat::PlainText | DocumentFormat::Markdown => {
            vec![record(read_text_file(path)?, None, None)]
        }
        DocumentFormat::Json => vec![record(parse_json_to_text(&read_text_file(path)?), None, None)],
        DocumentFormat::Delimited => {
            let delimiter = if path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("tsv"))
                .unwrap_or(false)
            {
                b'\t'
            } else {
                b','
            };
            parse_delimited_rows(&read_text_file(path)?, delimiter)
                .map_err(|e| ChatError::document(path, e))?
                .into_iter()
                .map(|(row, text)| record(text, None, Some(row)))
                .collect()
        }
        DocumentFormat::Pdf => extract_pdf_pages(path)?
            .into_iter()
            .enumerate()
            .filter(|(_, text)| !text.trim().is_empty())
            .map(|(i, text)| record(text, Some(i + 1), None))
            .collect(),
        DocumentFormat::Docx => vec![record(
            extract_docx_text_content(path).map_err(|e| ChatError::document(path, e))?,
            None,
            None,
        )],
    };

    tracing::debug!(
        path = %path.display(),
        format = ?format,
        records = documents.len(),
        "Extracted document"
    );
    Ok(documents)
}

fn read_text_file(path: &Path) -> Result<String, ChatError> {
    let bytes = std::fs::read(path).map_err(|e| ChatError::document(path, e.to_string()))?;
    Ok(String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Extract PDF text page by page, falling back to lopdf when pdf-extract fails
pub fn extract_pdf_pages(file_path: &Path) -> Result<Vec<String>, ChatError> {
    // pdf-extract has better font encoding handling than raw lopdf, but it can panic
    let pages_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_by_pages(file_path)
    }));

    let failure = match pages_result {
        Ok(Ok(pages)) => return Ok(pages),
        Ok(Err(e)) => e.to_string(),
        Err(panic_payload) => {
            if let Some(s) = panic_payload.downcast_ref::<&str>() {
                s.to_string()
            } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "Unknown panic".to_string()
            }
        }
    };

    tracing::warn!(
        path = %file_path.display(),
        error = %failure,
        "pdf-extract failed, trying lopdf fallback"
    );
    match extract_pdf_pages_via_lopdf(file_path) {
        Ok(pages) => {
            tracing::info!(pages = pages.len(), "lopdf fallback succeeded");
            Ok(pages)
        }
        Err(fallback_err) => {
            tracing::debug!(error = %fallback_err, "lopdf fallback failed");
            Err(ChatError::document(
                file_path,
                "This PDF has an incompatible format. Try re-exporting it from its source application.",
            ))
        }
    }
}

/// Fallback PDF text extraction using lopdf.
/// Less accurate for complex fonts but more tolerant of malformed PDFs.
pub fn extract_pdf_pages_via_lopdf(file_path: &Path) -> Result<Vec<String>, String> {
    use lopdf::{Document, Object};

    let doc = Document::load(file_path).map_err(|e| format!("Failed to load PDF: {}", e))?;
    let decode = |bytes: &Vec<u8>| {
        // UTF-8 first, then Latin-1
        String::from_utf8(bytes.clone()).unwrap_or_else(|_| bytes.iter().map(|&b| b as char).collect())
    };

    let mut pages = Vec::new();
    for (_page_num, page_id) in doc.get_pages() {
        let mut page_text = String::new();
        if let Ok(content) = doc.get_page_content(page_id) {
            let operations = lopdf::content::Content::decode(&content)
                .map(|c| c.operations)
                .unwrap_or_default();

            for op in operations {
                match op.operator.as_str() {
                    "Tj" => {
                        if let Some(Object::String(bytes, _)) = op.operands.first() {
                            page_text.push_str(&decode(bytes));
                        }
                    }
                    // Text array with kerning offsets
                    "TJ" => {
                        if let Some(Object::Array(arr)) = op.operands.first() {
                            for item in arr {
                                if let Object::String(bytes, _) = item {
                                    page_text.push_str(&decode(bytes));
                                }
                            }
                        }
                    }
                    "Td" | "TD" | "T*" | "'" | "\"" => {
                        if !page_text.ends_with('\n') && !page_text.ends_with(' ') {
                            page_text.push(' ');
                        }
                    }
                    "ET" => {
                        if !page_text.ends_with('\n') {
                            page_text.push('\n');
                        }
                    }
                    _ => {}
                }
            }
        }
        pages.push(page_text);
    }

    Ok(pages)
}

/// Extract text content from a DOCX file
pub fn extract_docx_text_content(file_path: &Path) -> Result<String, String> {
    use std::io::Read;

    let file =
        std::fs::File::open(file_path).map_err(|e| format!("Failed to open DOCX: {}", e))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| format!("Invalid DOCX archive: {}", e))?;

    let mut doc_xml = archive
        .by_name("word/document.xml")
        .map_err(|_| "No document.xml found in DOCX".to_string())?;

    let mut xml_content = String::new();
    doc_xml
        .read_to_string(&mut xml_content)
        .map_err(|e| format!("Failed to read document.xml: {}", e))?;

    Ok(extract_plaintext_from_docx_xml(&xml_content))
}

/// Parse delimited text into `(row_number, "header: value, ...")` records.
/// Row numbers are 1-based over data rows; blank rows are dropped.
pub fn parse_delimited_rows(content: &str, delimiter: u8) -> Result<Vec<(usize, String)>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let header: Vec<String> = reader
        .headers()
        .map_err(|e| format!("Invalid header row: {}", e))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| format!("Invalid row {}: {}", i + 1, e))?;
        let row_text = record
            .iter()
            .enumerate()
            .filter(|(col, value)| *col < header.len() && !value.trim().is_empty())
            .map(|(col, value)| format!("{}: {}", header[col], value.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        if !row_text.is_empty() {
            rows.push((i + 1, row_text));
        }
    }
    Ok(rows)
}

/// Parse JSON content to readable text; invalid JSON is kept verbatim
pub fn parse_json_to_text(content: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(content) {
        Ok(value) => convert_json_value_to_text(&value, ""),
        Err(_) => content.to_string(),
    }
}

/// Convert a JSON value to `path: value` lines
pub fn convert_json_value_to_text(value: &serde_json::Value, prefix: &str) -> String {
    match value {
        serde_json::Value::Object(map) => map
            .iter()
            .map(|(key, val)| {
                let new_prefix = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", prefix, key)
                };
                convert_json_value_to_text(val, &new_prefix)
            })
            .collect(),
        serde_json::Value::Array(arr) => arr
            .iter()
            .enumerate()
            .map(|(i, val)| convert_json_value_to_text(val, &format!("{}[{}]", prefix, i)))
            .collect(),
        serde_json::Value::String(s) => format!("{}: {}\n", prefix, s),
        serde_json::Value::Number(n) => format!("{}: {}\n", prefix, n),
        serde_json::Value::Bool(b) => format!("{}: {}\n", prefix, b),
        serde_json::Value::Null => String::new(),
    }
}

/// Extract text content from DOCX XML (word/document.xml)
pub fn extract_plaintext_from_docx_xml(xml: &str) -> String {
    let mut result = String::new();
    let mut in_text = false;
    let mut chars = xml.chars();

    while let Some(c) = chars.next() {
        if c == '<' {
            let tag: String = chars.by_ref().take_while(|&tc| tc != '>').collect();
            let is_open = |name: &str| {
                tag.starts_with(name)
                    && !tag.ends_with('/')
                    && tag[name.len()..]
                        .chars()
                        .next()
                        .map_or(true, |next| next == ' ' || next == '>')
            };

            if is_open("w:t") {
                in_text = true;
            } else if tag == "/w:t" {
                in_text = false;
            } else if is_open("w:p") && !result.is_empty() && !result.ends_with('\n') {
                result.push('\n');
            }
        } else if in_text {
            result.push(c);
        }
    }

    result
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
