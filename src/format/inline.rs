use lazy_static::lazy_static;
use regex::Regex;

/// One inline substitution. Rules run in a fixed order, each over the output of
/// the previous one; longer delimiters come before their own prefixes.
pub struct InlineRule {
    pub name: &'static str,
    pattern: Regex,
    replacement: &'static str,
}

impl InlineRule {
    fn new(name: &'static str, pattern: &str, replacement: &'static str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("Invalid inline rule regex"),
            replacement,
        }
    }

    pub fn apply(&self, text: &str) -> String {
        self.pattern.replace_all(text, self.replacement).into_owned()
    }
}

// Span bodies may not start or end with whitespace and may not contain `<` or
// `>`; the text is escaped, so those only appear in tags added by earlier rules.
lazy_static! {
    pub static ref INLINE_RULES: Vec<InlineRule> = vec![
        InlineRule::new(
            "bold_italic",
            r"\*\*\*([^\s*<>](?:[^<>\n]*?[^\s*<>])?)\*\*\*",
            "<strong><em>${1}</em></strong>",
        ),
        InlineRule::new(
            "bold",
            r"\*\*([^\s*<>](?:[^<>\n]*?[^\s*<>])?)\*\*",
            "<strong>${1}</strong>",
        ),
        InlineRule::new(
            "italic",
            r"\*([^\s*<>](?:[^*<>\n]*?[^\s*<>])?)\*",
            "<em>${1}</em>",
        ),
        InlineRule::new(
            "underline",
            r"__([^\s<>](?:[^<>\n]*?[^\s<>])?)__",
            "<u>${1}</u>",
        ),
        InlineRule::new(
            "strikethrough",
            r"~~([^\s<>](?:[^<>\n]*?[^\s<>])?)~~",
            "<del>${1}</del>",
        ),
        InlineRule::new(
            "link",
            r"\[([^\[\]<>\n]+)\]\(((?:https?://|mailto:|/|#)[^\s()<>]*)\)",
            r#"<a href="${2}" target="_blank" rel="noopener noreferrer">${1}</a>"#,
        ),
    ];
}

/// Link targets allowed to become anchors, on either formatting path.
pub const SAFE_LINK_PREFIXES: &[&str] = &["https://", "http://", "mailto:", "/", "#"];

pub fn is_safe_link(url: &str) -> bool {
    SAFE_LINK_PREFIXES.iter().any(|prefix| url.starts_with(prefix))
}

/// Applies the emphasis, underline, strikethrough and link rules. Code spans
/// were already lifted out by `CodeStash::protect`.
pub fn apply_inline_rules(text: &str) -> String {
    INLINE_RULES
        .iter()
        .fold(text.to_string(), |acc, rule| rule.apply(&acc))
}
