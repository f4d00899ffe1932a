use lopdf::Document;
use std::path::Path;

/// Text of every page in order, one page per line block, trimmed.
pub fn extract_text(path: &Path) -> Result<String, lopdf::Error> {
    let doc = Document::load(path)?;
    let mut text = String::new();

    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                tracing::debug!("Skipping PDF page {}: {}", page_number, e);
            }
        }
    }

    Ok(text.trim().to_string())
}
