//! Turns raw model output into the HTML stored next to it.
//!
//! With a markdown engine available the text is delegated to it. Otherwise the
//! from-scratch pipeline runs, in this order:
//!
//! 1. escape HTML-significant characters
//! 2. lift fenced blocks and inline code out of the text
//! 3. pipe tables
//! 4. `#`..`####` headings
//! 5. inline rules (see [`inline::INLINE_RULES`])
//! 6. bulleted / numbered lists
//! 7. paragraphs and line breaks
//! 8. put code back
//!
//! Tables and headings run before inline rules because they are recognised
//! from line starts and pipes, which inline substitution would disturb. Both
//! paths end with [`normalize_block_spacing`].

pub mod block;
pub mod code;
pub mod engine;
pub mod escape;
pub mod inline;
pub mod list;
pub mod paragraph;
pub mod table;

use crate::config::Capabilities;
use engine::MarkdownEngine;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref BLOCK_CLOSE: Regex =
        Regex::new(r"</(h[1-6]|p|ul|ol|table|pre|blockquote)>\n?").expect("Invalid block close regex");
}

pub struct ResponseFormatter {
    engine: Option<Box<dyn MarkdownEngine>>,
}

impl ResponseFormatter {
    pub fn new(capabilities: &Capabilities) -> Self {
        let engine = if capabilities.markdown {
            engine::default_engine()
        } else {
            None
        };
        Self { engine }
    }

    pub fn with_engine(engine: Box<dyn MarkdownEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    pub fn engine_name(&self) -> &'static str {
        match &self.engine {
            Some(engine) => engine.name(),
            None => "basic",
        }
    }

    pub fn format(&self, raw: &str) -> String {
        let html = match &self.engine {
            Some(engine) => match engine.render(raw) {
                Ok(html) => html,
                Err(e) => {
                    tracing::warn!(
                        "Markdown engine {} failed, using basic formatting: {}",
                        engine.name(),
                        e
                    );
                    render_basic(raw)
                }
            },
            None => render_basic(raw),
        };
        normalize_block_spacing(&html)
    }
}

pub fn render_basic(raw: &str) -> String {
    let text = raw.replace("\r\n", "\n");
    let escaped = escape::escape_html(&text);
    let (protected, stash) = code::CodeStash::protect(&escaped);
    let tables = table::convert_tables(&protected);
    let headings = block::convert_headings(&tables);
    let spans = inline::apply_inline_rules(&headings);
    let lists = list::convert_lists(&spans);
    let paragraphs = paragraph::assemble_paragraphs(&lists);
    stash.restore(&paragraphs)
}

/// Puts exactly one newline after each closing block tag so stored HTML stays readable.
pub fn normalize_block_spacing(html: &str) -> String {
    BLOCK_CLOSE.replace_all(html, "</${1}>\n").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatError, Result};

    struct BrokenEngine;

    impl MarkdownEngine for BrokenEngine {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn render(&self, _text: &str) -> Result<String> {
            Err(ChatError::Format("unbalanced input".into()).into())
        }
    }

    #[test]
    fn test_failing_engine_falls_back_to_basic() {
        let formatter = ResponseFormatter::with_engine(Box::new(BrokenEngine));
        assert_eq!(formatter.engine_name(), "broken");
        assert_eq!(formatter.format("**hi**"), "<p><strong>hi</strong></p>\n");
    }

    #[test]
    fn test_basic_capabilities_select_basic_pipeline() {
        let formatter = ResponseFormatter::new(&Capabilities::basic());
        assert_eq!(formatter.engine_name(), "basic");
    }

    #[test]
    fn test_block_spacing_is_not_doubled() {
        assert_eq!(
            normalize_block_spacing("<h1>a</h1>\n<p>b</p><ul><li>c</li></ul>"),
            "<h1>a</h1>\n<p>b</p>\n<ul><li>c</li></ul>\n"
        );
    }

    #[test]
    fn test_heading_then_list_then_paragraph() {
        let html = render_basic("# Plan\n- one\n- two\n\nDone.");
        assert_eq!(
            html,
            "<h1>Plan</h1><ul><li>one</li><li>two</li></ul><p>Done.</p>"
        );
    }

    #[test]
    fn test_code_block_survives_line_stages() {
        let html = render_basic("```python\n# comment\na | b | c\n- item\n```");
        assert_eq!(
            html,
            "<pre><code class=\"language-python\"># comment\na | b | c\n- item</code></pre>"
        );
    }

    #[test]
    fn test_crlf_input() {
        assert_eq!(render_basic("a\r\n\r\nb"), "<p>a</p><p>b</p>");
    }
}
