//! Upload validation: file name sanitization and type checks.
//!
//! Content types are sniffed from magic bytes with `infer`.

use crate::defaults;
use crate::error::{Error, Result};

const MAX_FILENAME_BYTES: usize = 255;

const PDF_MIME: &str = "application/pdf";
const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const ZIP_MIME: &str = "application/zip";

/// Strip path components and unsafe characters from a client-supplied name.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);

    let cleaned: String = base
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim().trim_start_matches('.');
    if cleaned.is_empty() {
        return "unnamed_file".to_string();
    }
    if cleaned.len() <= MAX_FILENAME_BYTES {
        return cleaned.to_string();
    }

    // Keep the extension; cut the stem on a char boundary.
    let (stem, ext) = match cleaned.rfind('.') {
        Some(pos) if cleaned.len() - pos < 16 => (&cleaned[..pos], &cleaned[pos..]),
        _ => (cleaned, ""),
    };
    let mut limit = MAX_FILENAME_BYTES - ext.len();
    while !stem.is_char_boundary(limit) {
        limit -= 1;
    }
    format!("{}{}", &stem[..limit], ext)
}

/// Whether the file name ends in one of the accepted resume extensions.
pub fn is_allowed_extension(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| {
            let ext = ext.to_ascii_lowercase();
            defaults::ALLOWED_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Reject uploads that are empty, oversized, or of an unsupported type.
pub fn validate_upload(filename: &str, data: &[u8], max_size_bytes: usize) -> Result<()> {
    if data.is_empty() {
        return Err(Error::InvalidInput(format!("File '{}' is empty", filename)));
    }
    if data.len() > max_size_bytes {
        return Err(Error::InvalidInput(format!(
            "File '{}' exceeds the {} byte limit",
            filename, max_size_bytes
        )));
    }
    if !is_allowed_extension(filename) {
        return Err(Error::InvalidInput(format!(
            "File type not allowed: '{}' (accepted: {})",
            filename,
            defaults::ALLOWED_EXTENSIONS.join(", ")
        )));
    }
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    let detected = detect_content_type(data);
    if !content_matches_extension(&ext, detected.as_ref()) {
        return Err(Error::InvalidInput(format!(
            "File '{}' content ({}) does not match its extension",
            filename,
            detected.map(|kind| kind.mime_type()).unwrap_or("unknown")
        )));
    }
    Ok(())
}

/// Detect a file's type from its magic bytes.
pub fn detect_content_type(data: &[u8]) -> Option<infer::Type> {
    infer::get(data)
}

/// Whether the sniffed content agrees with the claimed extension.
///
/// Text formats have no magic bytes, so they pass unless the content sniffs
/// as a binary format.
fn content_matches_extension(ext: &str, detected: Option<&infer::Type>) -> bool {
    match (ext, detected) {
        ("pdf", Some(kind)) => kind.mime_type() == PDF_MIME,
        // Some writers put `word/` after other entries, which sniffs as plain zip.
        ("docx", Some(kind)) => matches!(kind.mime_type(), DOCX_MIME | ZIP_MIME),
        ("txt" | "md", Some(kind)) => kind.matcher_type() == infer::MatcherType::Text,
        ("txt" | "md", None) => true,
        _ => false,
    }
}
