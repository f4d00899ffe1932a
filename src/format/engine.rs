use crate::types::Result;

/// A full markdown implementation the coordinator may delegate to.
pub trait MarkdownEngine: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(&self, text: &str) -> Result<String>;
}

/// CommonMark with tables; fenced code is part of the base syntax. Raw HTML in
/// the source is rendered as text, never passed through. Links and images only
/// keep targets that pass [`is_safe_link`]; others degrade to their text.
#[cfg(feature = "markdown")]
pub struct CommonMarkEngine;

#[cfg(feature = "markdown")]
impl MarkdownEngine for CommonMarkEngine {
    fn name(&self) -> &'static str {
        "pulldown-cmark"
    }

    fn render(&self, text: &str) -> Result<String> {
        use super::escape::escape_html;
        use super::inline::is_safe_link;
        use pulldown_cmark::{html, CowStr, Event, Options, Parser, Tag, TagEnd};

        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);

        // Links cannot nest, so one flag per kind is enough.
        let mut dropped_link = false;
        let mut dropped_image = false;
        let parser = Parser::new_ext(text, options).filter_map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Some(Event::Text(raw)),
            Event::Start(Tag::Link { dest_url, .. }) => {
                if is_safe_link(&dest_url) {
                    Some(Event::InlineHtml(CowStr::from(format!(
                        "<a href=\"{}\" target=\"_blank\" rel=\"noopener noreferrer\">",
                        escape_html(&dest_url)
                    ))))
                } else {
                    dropped_link = true;
                    None
                }
            }
            Event::End(TagEnd::Link) => {
                if dropped_link {
                    dropped_link = false;
                    None
                } else {
                    Some(Event::InlineHtml(CowStr::Borrowed("</a>")))
                }
            }
            Event::Start(Tag::Image { ref dest_url, .. }) if !is_safe_link(dest_url) => {
                dropped_image = true;
                None
            }
            Event::End(TagEnd::Image) if dropped_image => {
                dropped_image = false;
                None
            }
            other => Some(other),
        });

        let mut html_output = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut html_output, parser);
        Ok(html_output)
    }
}

pub fn default_engine() -> Option<Box<dyn MarkdownEngine>> {
    #[cfg(feature = "markdown")]
    {
        Some(Box::new(CommonMarkEngine))
    }
    #[cfg(not(feature = "markdown"))]
    {
        None
    }
}
