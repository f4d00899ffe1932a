//! Fenced blocks and inline code spans are lifted out of the text before any
//! line-structured stage runs and put back after paragraph assembly, so no
//! table, heading, emphasis or list rule can rewrite code.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

const STASH_OPEN: char = '\u{E000}';
const STASH_CLOSE: char = '\u{E001}';

lazy_static! {
    static ref FENCED_CODE: Regex =
        Regex::new(r"(?s)```([A-Za-z0-9_+#.\-]*)[ \t]*\n(.*?)\n```").expect("Invalid fenced code regex");
    static ref INLINE_CODE: Regex = Regex::new(r"`([^`\n]+)`").expect("Invalid inline code regex");
    static ref PLACEHOLDER: Regex =
        Regex::new(r"\x{E000}([BI])(\d+)\x{E001}").expect("Invalid placeholder regex");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StashKind {
    Block,
    Inline,
}

impl StashKind {
    fn tag(self) -> char {
        match self {
            StashKind::Block => 'B',
            StashKind::Inline => 'I',
        }
    }
}

#[derive(Debug, Default)]
pub struct CodeStash {
    entries: Vec<String>,
}

impl CodeStash {
    /// Replaces code in already-escaped text with placeholders. Fenced blocks
    /// always end up on a line of their own.
    pub fn protect(escaped: &str) -> (String, CodeStash) {
        let mut stash = CodeStash::default();
        // The placeholder delimiters are reserved; they never survive from input.
        let text: String = escaped
            .chars()
            .map(|c| {
                if c == STASH_OPEN || c == STASH_CLOSE {
                    '\u{FFFD}'
                } else {
                    c
                }
            })
            .collect();

        let mut blocks_done = String::with_capacity(text.len());
        let mut last = 0;
        for caps in FENCED_CODE.captures_iter(&text) {
            let Some(whole) = caps.get(0) else { continue };
            let before = &text[last..whole.start()];
            blocks_done.push_str(before);
            if !(blocks_done.is_empty() || blocks_done.ends_with('\n')) {
                blocks_done.push('\n');
            }
            let html = render_fenced(&caps);
            blocks_done.push_str(&stash.push(StashKind::Block, html));
            let rest = &text[whole.end()..];
            if !(rest.is_empty() || rest.starts_with('\n')) {
                blocks_done.push('\n');
            }
            last = whole.end();
        }
        blocks_done.push_str(&text[last..]);

        let protected = INLINE_CODE
            .replace_all(&blocks_done, |caps: &Captures| {
                stash.push(StashKind::Inline, format!("<code>{}</code>", &caps[1]))
            })
            .into_owned();

        (protected, stash)
    }

    fn push(&mut self, kind: StashKind, html: String) -> String {
        let token = format!("{}{}{}{}", STASH_OPEN, kind.tag(), self.entries.len(), STASH_CLOSE);
        self.entries.push(html);
        token
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn restore(&self, text: &str) -> String {
        if self.entries.is_empty() {
            return text.to_string();
        }
        PLACEHOLDER
            .replace_all(text, |caps: &Captures| {
                caps[2]
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| self.entries.get(idx))
                    .cloned()
                    .unwrap_or_default()
            })
            .into_owned()
    }
}

/// True when the line holds a stashed fenced block.
pub fn is_block_placeholder(line: &str) -> bool {
    let mut chars = line.chars();
    chars.next() == Some(STASH_OPEN) && chars.next() == Some(StashKind::Block.tag())
}

fn render_fenced(caps: &Captures) -> String {
    let lang = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let body = caps.get(2).map(|m| m.as_str()).unwrap_or("");
    if lang.is_empty() {
        format!("<pre><code>{}</code></pre>", body)
    } else {
        format!("<pre><code class=\"language-{}\">{}</code></pre>", lang, body)
    }
}
