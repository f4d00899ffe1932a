//! Turns an uploaded file into text the model can read.
//!
//! Extraction never fails outward: every problem becomes a diagnostic string
//! that is stored and shown to the model in place of the content.

#[cfg(feature = "office")]
pub mod office;
#[cfg(feature = "pdf")]
pub mod pdf;
#[cfg(feature = "image")]
pub mod raster;
pub mod text;

use crate::config::Capabilities;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Pdf,
    Image,
    WordDocument,
    Spreadsheet,
    SlideDeck,
    Unsupported,
}

const TEXT_LIKE_MIMES: &[&str] = &["application/json", "application/xml", "application/javascript"];

impl FileKind {
    /// Classifies by declared MIME type first, then by extension.
    pub fn classify(file_name: &str, mime: &str) -> Self {
        let ext = extension(file_name);
        let mime = mime.to_ascii_lowercase();

        if mime.starts_with("text/")
            || TEXT_LIKE_MIMES.contains(&mime.as_str())
            || crate::constants::TEXT_EXTENSIONS.contains(&ext.as_str())
        {
            return FileKind::Text;
        }
        if mime == "application/pdf" || ext == "pdf" {
            return FileKind::Pdf;
        }
        if mime.starts_with("image/") || crate::constants::IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return FileKind::Image;
        }
        match ext.as_str() {
            "docx" => FileKind::WordDocument,
            "xlsx" => FileKind::Spreadsheet,
            "pptx" => FileKind::SlideDeck,
            _ if mime.contains("wordprocessingml") => FileKind::WordDocument,
            _ if mime.contains("spreadsheetml") => FileKind::Spreadsheet,
            _ if mime.contains("presentationml") => FileKind::SlideDeck,
            _ => FileKind::Unsupported,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    capabilities: Capabilities,
}

impl Extractor {
    pub fn new(capabilities: Capabilities) -> Self {
        Self { capabilities }
    }

    #[tracing::instrument(name = "extract", skip(self, path), fields(kind = tracing::field::Empty))]
    pub fn extract(&self, path: &Path, file_name: &str, mime: &str) -> String {
        let kind = FileKind::classify(file_name, mime);
        tracing::Span::current().record("kind", tracing::field::debug(kind));

        match kind {
            FileKind::Text => match text::read_text(path) {
                Ok(content) => content,
                Err(e) => format!("Error reading file: {}", e),
            },
            #[cfg(feature = "pdf")]
            FileKind::Pdf if self.capabilities.pdf => match pdf::extract_text(path) {
                Ok(content) if !content.is_empty() => content,
                Ok(_) => "PDF processed but no text could be extracted".to_string(),
                Err(e) => format!("Error reading PDF: {}", e),
            },
            #[cfg(feature = "image")]
            FileKind::Image if self.capabilities.image => match raster::describe(path, file_name) {
                Ok(description) => description,
                Err(e) => format!("Error processing image: {}", e),
            },
            #[cfg(feature = "office")]
            FileKind::WordDocument | FileKind::Spreadsheet | FileKind::SlideDeck if self.capabilities.office => {
                match office::extract_text(path, kind) {
                    Ok(content) if !content.is_empty() => content,
                    Ok(_) => format!("File uploaded: {} (no text found in document)", file_name),
                    Err(e) => format!("Error processing file: {}", e),
                }
            }
            _ => unsupported(file_name),
        }
    }
}

fn unsupported(file_name: &str) -> String {
    format!(
        "File uploaded: {} (content extraction not supported for this file type)",
        file_name
    )
}

fn extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => String::new(),
    }
}

pub fn is_allowed(file_name: &str, capabilities: &Capabilities) -> bool {
    let ext = extension(file_name);
    !ext.is_empty() && capabilities.allowed_extensions().contains(ext.as_str())
}

/// Reduces an uploaded name to something safe to use as a path component.
pub fn secure_filename(name: &str) -> String {
    // Browsers on Windows may send the full client path.
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}

pub fn guess_mime(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}
