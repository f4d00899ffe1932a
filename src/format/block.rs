use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    // `#{1,4}` followed by a space only matches when the whole marker run is
    // four or fewer, so `##### x` is left alone.
    static ref HEADING: Regex = Regex::new(r"(?m)^(#{1,4}) (.+)$").expect("Invalid heading regex");
}

/// `# ` through `#### ` at the start of a line become `<h1>`..`<h4>`.
pub fn convert_headings(text: &str) -> String {
    HEADING
        .replace_all(text, |caps: &Captures| {
            let level = caps[1].len();
            format!("<h{level}>{}</h{level}>", caps[2].trim())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_levels() {
        assert_eq!(
            convert_headings("# One\n## Two\n### Three\n#### Four"),
            "<h1>One</h1>\n<h2>Two</h2>\n<h3>Three</h3>\n<h4>Four</h4>"
        );
    }

    #[test]
    fn test_hash_not_at_line_start_is_ignored() {
        assert_eq!(convert_headings("issue # 42"), "issue # 42");
        assert_eq!(convert_headings(" # indented"), " # indented");
    }

    #[test]
    fn test_deeper_and_unspaced_markers_are_ignored() {
        assert_eq!(convert_headings("##### five"), "##### five");
        assert_eq!(convert_headings("#hashtag"), "#hashtag");
    }
}
