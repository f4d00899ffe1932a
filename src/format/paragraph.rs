use super::code::is_block_placeholder;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BLANK_LINES: Regex = Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)*").expect("Invalid blank line regex");
    static ref BLOCK_START: Regex =
        Regex::new(r"^<(?:h[1-6]|table|ul|ol|pre)[\s>]").expect("Invalid block start regex");
}

fn is_block_line(line: &str) -> bool {
    BLOCK_START.is_match(line) || is_block_placeholder(line)
}

/// Blank lines separate paragraphs and single newlines become `<br>`. Lines
/// holding a block element (heading, table, list, code block) are emitted as-is
/// and never wrapped in `<p>`.
pub fn assemble_paragraphs(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 32);
    for segment in BLANK_LINES.split(text) {
        let mut pending: Vec<&str> = Vec::new();
        for line in segment.split('\n') {
            let trimmed = line.trim();
            if is_block_line(trimmed) {
                flush_paragraph(&mut out, &mut pending);
                out.push_str(trimmed);
            } else {
                pending.push(line);
            }
        }
        flush_paragraph(&mut out, &mut pending);
    }
    out
}

fn flush_paragraph(out: &mut String, pending: &mut Vec<&str>) {
    while pending.last().is_some_and(|l| l.trim().is_empty()) {
        pending.pop();
    }
    let start = pending
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(pending.len());
    if start < pending.len() {
        out.push_str("<p>");
        out.push_str(&pending[start..].join("<br>"));
        out.push_str("</p>");
    }
    pending.clear();
}
