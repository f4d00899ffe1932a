//! Plain text out of OOXML packages (`.docx`, `.xlsx`, `.pptx`).

use super::FileKind;
use crate::constants::MAX_OFFICE_ENTRY_SIZE;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use zip::ZipArchive;

#[derive(Debug, thiserror::Error)]
pub enum OfficeError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("invalid XML: {0}")]
    Xml(#[from] quick_xml::Error),
    #[error("not an office document")]
    WrongKind,
    #[error("{name} expands to more than {limit} bytes")]
    TooLarge { name: String, limit: u64 },
}

pub fn extract_text(path: &Path, kind: FileKind) -> Result<String, OfficeError> {
    let mut archive = ZipArchive::new(File::open(path)?)?;
    match kind {
        FileKind::WordDocument => docx_text(&mut archive),
        FileKind::Spreadsheet => xlsx_text(&mut archive),
        FileKind::SlideDeck => pptx_text(&mut archive),
        _ => Err(OfficeError::WrongKind),
    }
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<String, OfficeError> {
    read_entry_limited(archive, name, MAX_OFFICE_ENTRY_SIZE)
}

/// The declared size is checked first, then the stream is cut one byte past
/// `limit` in case the header lies.
fn read_entry_limited<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
    limit: u64,
) -> Result<String, OfficeError> {
    let too_large = || OfficeError::TooLarge {
        name: name.to_string(),
        limit,
    };
    let entry = archive.by_name(name)?;
    if entry.size() > limit {
        return Err(too_large());
    }
    let mut xml = String::new();
    entry.take(limit + 1).read_to_string(&mut xml)?;
    if xml.len() as u64 > limit {
        return Err(too_large());
    }
    Ok(xml)
}

/// Collects the text under every `<p>` element, one line per paragraph. Word
/// and PowerPoint both keep their runs in `<t>` elements inside paragraphs.
fn paragraph_lines(xml: &str) -> Result<Vec<String>, OfficeError> {
    let mut reader = Reader::from_str(xml);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"t" => in_text = true,
                b"p" => current.clear(),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"tab" => current.push('\t'),
                b"br" => current.push('\n'),
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => {
                    let line = current.trim();
                    if !line.is_empty() {
                        lines.push(line.to_string());
                    }
                    current.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(lines)
}

fn docx_text<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, OfficeError> {
    let xml = read_entry(archive, "word/document.xml")?;
    Ok(paragraph_lines(&xml)?.join("\n"))
}

/// Entries such as `ppt/slides/slide10.xml` sorted by their number.
fn numbered_entries<R: Read + Seek>(archive: &ZipArchive<R>, prefix: &str) -> Vec<String> {
    let mut entries: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let n = name.strip_prefix(prefix)?.strip_suffix(".xml")?;
            n.parse::<u32>().ok().map(|n| (n, name.to_string()))
        })
        .collect();
    entries.sort();
    entries.into_iter().map(|(_, name)| name).collect()
}

fn pptx_text<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, OfficeError> {
    let mut sections = Vec::new();
    for (i, name) in numbered_entries(archive, "ppt/slides/slide").into_iter().enumerate() {
        let xml = read_entry(archive, &name)?;
        let lines = paragraph_lines(&xml)?;
        if lines.is_empty() {
            continue;
        }
        sections.push(format!("Slide {}:\n{}", i + 1, lines.join("\n")));
    }
    Ok(sections.join("\n\n"))
}

fn shared_strings<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<Vec<String>, OfficeError> {
    let xml = match read_entry(archive, "xl/sharedStrings.xml") {
        Ok(xml) => xml,
        Err(OfficeError::Zip(zip::result::ZipError::FileNotFound)) => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut reader = Reader::from_str(&xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => current.clear(),
                b"t" => in_text = true,
                _ => {}
            },
            Event::Text(t) if in_text => current.push_str(&t.unescape()?),
            Event::End(e) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"si" => strings.push(std::mem::take(&mut current)),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(strings)
}

#[derive(Default)]
struct Cell {
    shared: bool,
    value: String,
}

fn xlsx_text<R: Read + Seek>(archive: &mut ZipArchive<R>) -> Result<String, OfficeError> {
    let strings = shared_strings(archive)?;
    let mut sections = Vec::new();

    for (i, name) in numbered_entries(archive, "xl/worksheets/sheet").into_iter().enumerate() {
        let xml = read_entry(archive, &name)?;
        let mut reader = Reader::from_str(&xml);
        let mut rows: Vec<String> = Vec::new();
        let mut row: Vec<String> = Vec::new();
        let mut cell = Cell::default();
        let mut in_value = false;

        loop {
            match reader.read_event()? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"c" => {
                        cell = Cell::default();
                        cell.shared = e
                            .attributes()
                            .flatten()
                            .any(|a| a.key.local_name().as_ref() == b"t" && a.value.as_ref() == b"s");
                    }
                    b"v" | b"t" => in_value = true,
                    _ => {}
                },
                Event::Text(t) if in_value => cell.value.push_str(&t.unescape()?),
                Event::End(e) => match e.local_name().as_ref() {
                    b"v" | b"t" => in_value = false,
                    b"c" => {
                        let value = if cell.shared {
                            cell.value
                                .trim()
                                .parse::<usize>()
                                .ok()
                                .and_then(|idx| strings.get(idx).cloned())
                                .unwrap_or_default()
                        } else {
                            std::mem::take(&mut cell.value)
                        };
                        row.push(value);
                    }
                    b"row" => {
                        if row.iter().any(|v| !v.is_empty()) {
                            rows.push(row.join("\t"));
                        }
                        row.clear();
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        if !rows.is_empty() {
            sections.push(format!("Sheet {}:\n{}", i + 1, rows.join("\n")));
        }
    }
    Ok(sections.join("\n\n"))
}
