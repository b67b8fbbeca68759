//! Title sanitization and output path construction.
//!
//! Output names follow a fixed scheme:
//! - static modes: `<title>.txt`, `<title>_<n>.jpg`, `<title>.html`
//! - dynamic modes: `Scribd_<id>.pdf`, `Scribd_<id>.html`
//! - dynamic scratch: `temp_<id>/page_NNN.pdf`

use std::path::{Path, PathBuf};

/// Characters replaced one-for-one by `_` in document titles.
const FORBIDDEN_TITLE_CHARS: [char; 10] = [' ', '*', '"', '/', '\\', '<', '>', ':', '|', '?'];

/// Replaces every filesystem-hostile character in `title` with `_`.
///
/// Substitution is one-for-one: runs are not collapsed, other characters are
/// kept, and the character count is preserved. Applying it twice is a no-op.
///
/// ```
/// use scribd_core::sanitize_title;
///
/// assert_eq!(sanitize_title("My/Title: With*Forbidden\"Chars"), "My_Title__With_Forbidden_Chars");
/// ```
#[must_use]
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| {
            if FORBIDDEN_TITLE_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Title used when the markup has no usable `<title>`.
#[must_use]
pub fn fallback_title(document_id: &str) -> String {
    format!("Document_{document_id}")
}

/// Resolves the optional output directory, defaulting to the working directory.
#[must_use]
pub fn resolve_output_dir(output_dir: Option<&Path>) -> PathBuf {
    output_dir.map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

#[must_use]
pub fn text_output_path(dir: &Path, title: &str) -> PathBuf {
    dir.join(format!("{title}.txt"))
}

/// `ordinal` is the 1-based descriptor ordinal.
#[must_use]
pub fn image_output_path(dir: &Path, title: &str, ordinal: usize) -> PathBuf {
    dir.join(format!("{title}_{ordinal}.jpg"))
}

#[must_use]
pub fn html_output_path(dir: &Path, title: &str) -> PathBuf {
    dir.join(format!("{title}.html"))
}

#[must_use]
pub fn dynamic_pdf_path(dir: &Path, document_id: &str) -> PathBuf {
    dir.join(format!("Scribd_{document_id}.pdf"))
}

#[must_use]
pub fn dynamic_html_path(dir: &Path, document_id: &str) -> PathBuf {
    dir.join(format!("Scribd_{document_id}.html"))
}

/// Scratch directory holding per-page PDFs for one dynamic run.
#[must_use]
pub fn scratch_dir(dir: &Path, document_id: &str) -> PathBuf {
    dir.join(format!("temp_{document_id}"))
}

/// Scratch file for the 1-based page `index`.
#[must_use]
pub fn scratch_page_path(scratch: &Path, index: usize) -> PathBuf {
    scratch.join(format!("page_{index:03}.pdf"))
}
